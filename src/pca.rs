// src/pca.rs

//! Exact principal component analysis.
//!
//! This is the upstream step that produces a component matrix. Any other
//! producer works too: [`crate::ComponentCatalog::new`] accepts a matrix from
//! anywhere.

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Eigh, UPLO};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::ExplainError;

/// Standard deviations at or below this are treated as constant columns and scaled by 1.0.
const SCALE_SANITIZATION_THRESHOLD: f64 = 1e-9;
/// Axes with a norm below this are considered degenerate and dropped.
const NORMALIZATION_THRESHOLD: f64 = 1e-9;

fn sanitize_scale(std_dev: f64) -> f64 {
    if std_dev.is_finite() && std_dev > SCALE_SANITIZATION_THRESHOLD {
        std_dev
    } else {
        1.0
    }
}

/// Principal component analysis model.
///
/// Holds the mean, scale and rotation learned by [`Pca::fit`] (or supplied
/// through [`Pca::with_model`]) and projects new data into component space.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Pca {
    /// Principal axes as columns.
    /// Shape: (n_features, k_components)
    rotation: Option<Array2<f64>>,
    /// Shape: (n_features)
    mean: Option<Array1<f64>>,
    /// Sanitized standard deviations; always strictly positive.
    /// Shape: (n_features)
    scale: Option<Array1<f64>>,
    /// Eigenvalues of the covariance of the scaled data, largest first.
    /// Shape: (k_components)
    explained_variance: Option<Array1<f64>>,
    /// Trace of the covariance of the scaled data, over all components.
    total_variance: Option<f64>,
}

impl Default for Pca {
    fn default() -> Self {
        Self::new()
    }
}

impl Pca {
    /// Creates an empty, unfitted model.
    ///
    /// ```
    /// use pca_explain::Pca;
    /// let pca = Pca::new();
    /// assert!(pca.rotation().is_none());
    /// ```
    pub fn new() -> Self {
        Self {
            rotation: None,
            mean: None,
            scale: None,
            explained_variance: None,
            total_variance: None,
        }
    }

    /// Creates a model from externally computed parts.
    ///
    /// * `rotation` - Shape (n_features, k_components).
    /// * `mean` - Shape (n_features).
    /// * `raw_standard_deviations` - Shape (n_features). Values `<= 1e-9` are
    ///   replaced by `1.0`. Pass ones if the data was only centered.
    ///
    /// # Errors
    /// `DimensionMismatch` when the feature dimensions disagree, `InvalidArgument`
    /// when a standard deviation is NaN or infinite.
    pub fn with_model(
        rotation: Array2<f64>,
        mean: Array1<f64>,
        raw_standard_deviations: Array1<f64>,
    ) -> Result<Self, ExplainError> {
        let n_features = rotation.nrows();
        if mean.len() != n_features {
            return Err(ExplainError::DimensionMismatch {
                context: "mean vector vs. rotation rows",
                expected: n_features,
                found: mean.len(),
            });
        }
        if raw_standard_deviations.len() != n_features {
            return Err(ExplainError::DimensionMismatch {
                context: "standard deviations vs. rotation rows",
                expected: n_features,
                found: raw_standard_deviations.len(),
            });
        }
        if raw_standard_deviations.iter().any(|v| !v.is_finite()) {
            return Err(ExplainError::InvalidArgument(
                "raw_standard_deviations contains non-finite (NaN or infinity) values.".into(),
            ));
        }

        Ok(Self {
            rotation: Some(rotation),
            mean: Some(mean),
            scale: Some(raw_standard_deviations.mapv(sanitize_scale)),
            explained_variance: None,
            total_variance: None,
        })
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }

    /// The rotation matrix, shape (n_features, k_components).
    pub fn rotation(&self) -> Option<&Array2<f64>> {
        self.rotation.as_ref()
    }

    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    /// Total variance of the scaled training data, including dropped components.
    pub fn total_variance(&self) -> Option<f64> {
        self.total_variance
    }

    /// Number of retained components, or 0 for an unfitted model.
    pub fn n_components(&self) -> usize {
        self.rotation.as_ref().map_or(0, |r| r.ncols())
    }

    /// Fraction of the total data variance carried by each retained component.
    ///
    /// The ratios sum to less than 1 when `fit` dropped components. Returns
    /// `None` when the variances are unknown or the total is zero.
    pub fn explained_variance_ratio(&self) -> Option<Array1<f64>> {
        let variances = self.explained_variance.as_ref()?;
        let total = self.total_variance?;
        if total > 0.0 {
            Some(variances / total)
        } else {
            None
        }
    }

    /// Fits the model with an exact eigendecomposition.
    ///
    /// Columns are centered and scaled to unit variance. The covariance matrix
    /// is decomposed when `n_features <= n_samples`; otherwise the smaller
    /// Gram matrix is decomposed and its eigenvectors are mapped back to
    /// feature space. Axes are normalized to unit length. Centered data has
    /// rank at most `n_samples - 1`, so no more components than that are kept.
    ///
    /// * `data_matrix` - Shape (n_samples, n_features).
    /// * `tolerance` - Keep components whose eigenvalue exceeds
    ///   `tolerance * largest_eigenvalue` (clamped to `[0, 1]`). `None` keeps
    ///   every component up to the rank bound.
    ///
    /// # Errors
    /// `InvalidArgument` for empty input or fewer than 2 samples, `Linalg` if
    /// the eigendecomposition fails.
    ///
    /// ```
    /// use ndarray::array;
    /// use pca_explain::Pca;
    ///
    /// let data = array![[1.0, 2.0], [3.0, 3.5], [5.0, 7.0], [7.0, 8.0]];
    /// let mut pca = Pca::new();
    /// pca.fit(data, None).unwrap();
    /// assert_eq!(pca.n_components(), 2);
    /// ```
    pub fn fit(
        &mut self,
        mut data_matrix: Array2<f64>,
        tolerance: Option<f64>,
    ) -> Result<(), ExplainError> {
        let (n_samples, n_features) = data_matrix.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(ExplainError::InvalidArgument(
                "Input data_matrix has zero samples or zero features.".into(),
            ));
        }
        if n_samples < 2 {
            return Err(ExplainError::InvalidArgument(
                "Input matrix must have at least 2 samples.".into(),
            ));
        }
        info!(
            "Fitting exact PCA on {} samples x {} features.",
            n_samples, n_features
        );

        let mean_vector = data_matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| ExplainError::InvalidArgument("Failed to compute column means.".into()))?;
        data_matrix -= &mean_vector;

        let scale_vector = data_matrix
            .map_axis(Axis(0), |column| column.std(0.0))
            .mapv(sanitize_scale);
        data_matrix /= &scale_vector;

        let denominator = (n_samples - 1) as f64;
        let total_variance = data_matrix.iter().map(|v| v * v).sum::<f64>() / denominator;
        let gram_path = n_features > n_samples;
        let eig_pairs = if gram_path {
            debug!("Using Gram matrix ({} x {}).", n_samples, n_samples);
            let gram = data_matrix.dot(&data_matrix.t()) / denominator;
            sorted_eigenpairs(&gram, "Gram matrix")?
        } else {
            debug!("Using covariance matrix ({} x {}).", n_features, n_features);
            let covariance = data_matrix.t().dot(&data_matrix) / denominator;
            sorted_eigenpairs(&covariance, "covariance matrix")?
        };

        let rank_bound = n_features.min(n_samples - 1);
        let candidates = retained_rank(&eig_pairs, tolerance).min(rank_bound);
        let mut axes: Vec<Array1<f64>> = Vec::with_capacity(candidates);
        let mut kept_variances: Vec<f64> = Vec::with_capacity(candidates);
        for (eigenvalue, eigenvector) in eig_pairs.into_iter().take(candidates) {
            let mut axis = if gram_path {
                data_matrix.t().dot(&eigenvector)
            } else {
                eigenvector
            };
            let norm = axis.dot(&axis).sqrt();
            if norm <= NORMALIZATION_THRESHOLD {
                warn!(
                    "Dropping degenerate component (eigenvalue {:.3e}, axis norm {:.3e}).",
                    eigenvalue, norm
                );
                continue;
            }
            axis /= norm;
            axes.push(axis);
            kept_variances.push(eigenvalue.max(0.0));
        }

        let rank = axes.len();
        let mut rotation = Array2::<f64>::zeros((n_features, rank));
        for (mut column, axis) in rotation.columns_mut().into_iter().zip(axes.iter()) {
            column.assign(axis);
        }
        let variances = Array1::from(kept_variances);

        if rank == 0 {
            warn!("PCA fit retained zero components.");
        }
        info!("PCA fit retained {} of {} possible components.", rank, rank_bound);

        self.mean = Some(mean_vector);
        self.scale = Some(scale_vector);
        self.rotation = Some(rotation);
        self.explained_variance = Some(variances);
        self.total_variance = Some(total_variance);
        Ok(())
    }

    /// Projects data into component space using the learned mean, scale and rotation.
    ///
    /// * `x` - Shape (m_samples, n_features); consumed and modified in place.
    ///
    /// Returns scores of shape (m_samples, k_components).
    pub fn transform(&self, mut x: Array2<f64>) -> Result<Array2<f64>, ExplainError> {
        let rotation = self.rotation.as_ref().ok_or(ExplainError::NotFitted("rotation matrix"))?;
        let mean = self.mean.as_ref().ok_or(ExplainError::NotFitted("mean vector"))?;
        let scale = self.scale.as_ref().ok_or(ExplainError::NotFitted("scale vector"))?;

        if x.ncols() != mean.len() {
            return Err(ExplainError::DimensionMismatch {
                context: "input features vs. model features",
                expected: mean.len(),
                found: x.ncols(),
            });
        }
        if x.nrows() == 0 {
            return Ok(Array2::zeros((0, rotation.ncols())));
        }

        x -= mean;
        x /= scale;
        Ok(x.dot(rotation))
    }

    /// Saves the model with bincode.
    ///
    /// Rotation, mean and scale must be present; explained variance is optional.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), ExplainError> {
        if self.rotation.is_none() {
            return Err(ExplainError::NotFitted("rotation matrix"));
        }
        if self.mean.is_none() {
            return Err(ExplainError::NotFitted("mean vector"));
        }
        if self.scale.is_none() {
            return Err(ExplainError::NotFitted("scale vector"));
        }
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        debug!("Saved PCA model to {:?}.", path.as_ref());
        Ok(())
    }

    /// Loads a model written by [`Pca::save_model`] and checks it for consistency.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, ExplainError> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let model: Pca =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;

        let rotation = model.rotation.as_ref().ok_or(ExplainError::NotFitted("rotation matrix"))?;
        let mean = model.mean.as_ref().ok_or(ExplainError::NotFitted("mean vector"))?;
        let scale = model.scale.as_ref().ok_or(ExplainError::NotFitted("scale vector"))?;

        if mean.len() != rotation.nrows() {
            return Err(ExplainError::DimensionMismatch {
                context: "loaded mean vector vs. rotation rows",
                expected: rotation.nrows(),
                found: mean.len(),
            });
        }
        if scale.len() != rotation.nrows() {
            return Err(ExplainError::DimensionMismatch {
                context: "loaded scale vector vs. rotation rows",
                expected: rotation.nrows(),
                found: scale.len(),
            });
        }
        if scale.iter().any(|&v| !v.is_finite() || v <= 0.0) {
            return Err(ExplainError::InvalidArgument(
                "Loaded scale vector contains non-finite, zero, or negative values.".into(),
            ));
        }
        if let Some(total) = model.total_variance {
            if !total.is_finite() || total < 0.0 {
                return Err(ExplainError::InvalidArgument(
                    "Loaded total variance is non-finite or negative.".into(),
                ));
            }
        }
        if let Some(variances) = model.explained_variance.as_ref() {
            if variances.len() != rotation.ncols() {
                return Err(ExplainError::DimensionMismatch {
                    context: "loaded explained variance vs. rotation columns",
                    expected: rotation.ncols(),
                    found: variances.len(),
                });
            }
            if variances.iter().any(|&v| !v.is_finite() || v < 0.0) {
                return Err(ExplainError::InvalidArgument(
                    "Loaded explained variance contains non-finite or negative values.".into(),
                ));
            }
        }
        debug!("Loaded PCA model from {:?}.", path.as_ref());
        Ok(model)
    }
}

/// Eigendecomposition of a symmetric matrix, pairs sorted by descending eigenvalue.
fn sorted_eigenpairs(
    matrix: &Array2<f64>,
    what: &str,
) -> Result<Vec<(f64, Array1<f64>)>, ExplainError> {
    let (values, vectors) = matrix
        .eigh(UPLO::Upper)
        .map_err(|e| ExplainError::Linalg(format!("Eigen decomposition of {} failed: {}", what, e)))?;
    let mut pairs: Vec<(f64, Array1<f64>)> = values
        .into_iter()
        .zip(vectors.columns().into_iter().map(|col| col.to_owned()))
        .collect();
    pairs.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    Ok(pairs)
}

fn retained_rank(eig_pairs: &[(f64, Array1<f64>)], tolerance: Option<f64>) -> usize {
    let Some(tolerance) = tolerance else {
        return eig_pairs.len();
    };
    let largest = eig_pairs.first().map_or(0.0, |(v, _)| *v);
    if largest <= SCALE_SANITIZATION_THRESHOLD {
        return 0;
    }
    let threshold = largest * tolerance.clamp(0.0, 1.0);
    eig_pairs.iter().take_while(|(v, _)| *v > threshold).count()
}
