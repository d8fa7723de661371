// src/explain.rs

//! Closed-form SHAP values for generalized linear models.
//!
//! For a linear margin `f(x) = b + Σ w_j x_j` and independent features, the
//! Shapley value of feature `j` is `w_j (x_j - E[x_j])`, and the base value is
//! `f(E[x])`. Attributions are expressed in margin space (log-odds for a
//! logistic model), where they are exactly additive.

use std::fmt;

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::attribution::rank_descending;
use crate::components::component_label;
use crate::error::ExplainError;

/// Inverse link applied by [`LinearModel::predict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Link {
    /// Prediction equals the margin.
    #[default]
    Identity,
    /// Prediction is `1 / (1 + exp(-margin))`.
    Logit,
}

/// A fitted generalized linear model over the component space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    coefficients: Array1<f64>,
    intercept: f64,
    link: Link,
}

impl LinearModel {
    /// # Errors
    /// `InvalidArgument` if there are no coefficients or any parameter is not finite.
    pub fn new(coefficients: Array1<f64>, intercept: f64, link: Link) -> Result<Self, ExplainError> {
        if coefficients.is_empty() {
            return Err(ExplainError::InvalidArgument(
                "Linear model needs at least one coefficient.".into(),
            ));
        }
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ExplainError::InvalidArgument(
                "Linear model parameters must be finite.".into(),
            ));
        }
        Ok(Self {
            coefficients,
            intercept,
            link,
        })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn link(&self) -> Link {
        self.link
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn check_width(&self, found: usize, context: &'static str) -> Result<(), ExplainError> {
        if found != self.n_features() {
            return Err(ExplainError::DimensionMismatch {
                context,
                expected: self.n_features(),
                found,
            });
        }
        Ok(())
    }

    /// Margin `b + X w` for each row of `x`.
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ExplainError> {
        self.check_width(x.ncols(), "input columns vs. model coefficients")?;
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    /// Prediction on the response scale (margin passed through the inverse link).
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ExplainError> {
        let margin = self.decision_function(x)?;
        Ok(match self.link {
            Link::Identity => margin,
            Link::Logit => margin.mapv(|m| 1.0 / (1.0 + (-m).exp())),
        })
    }
}

/// Exact SHAP explainer for a [`LinearModel`].
#[derive(Debug, Clone)]
pub struct LinearExplainer<'a> {
    model: &'a LinearModel,
    /// Reference (background) mean of each feature.
    background_mean: Array1<f64>,
}

impl<'a> LinearExplainer<'a> {
    /// Uses the column means of `background` as the reference point.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty background, `DimensionMismatch` if its
    /// width differs from the model's.
    pub fn new(model: &'a LinearModel, background: ArrayView2<'_, f64>) -> Result<Self, ExplainError> {
        model.check_width(background.ncols(), "background columns vs. model coefficients")?;
        let background_mean = background.mean_axis(Axis(0)).ok_or_else(|| {
            ExplainError::InvalidArgument("Background data must contain at least one row.".into())
        })?;
        debug!(
            "Linear explainer background: {} rows x {} features.",
            background.nrows(),
            background.ncols()
        );
        Ok(Self {
            model,
            background_mean,
        })
    }

    /// Uses explicitly supplied feature means as the reference point.
    pub fn with_means(model: &'a LinearModel, means: Array1<f64>) -> Result<Self, ExplainError> {
        model.check_width(means.len(), "feature means vs. model coefficients")?;
        Ok(Self {
            model,
            background_mean: means,
        })
    }

    pub fn background_mean(&self) -> &Array1<f64> {
        &self.background_mean
    }

    /// Expected margin over the background, `b + Σ w_j E[x_j]`.
    pub fn expected_value(&self) -> f64 {
        self.model.intercept + self.model.coefficients.dot(&self.background_mean)
    }

    /// SHAP values `w_j (x_ij - E[x_j])` for each row of `data`.
    pub fn shap_values(&self, data: ArrayView2<'_, f64>) -> Result<ShapValues, ExplainError> {
        self.model
            .check_width(data.ncols(), "explained data columns vs. model coefficients")?;
        let mut values = data.to_owned();
        values -= &self.background_mean;
        values *= &self.model.coefficients;
        info!(
            "Computed linear SHAP values for {} samples over {} features.",
            values.nrows(),
            values.ncols()
        );
        Ok(ShapValues {
            values,
            data: data.to_owned(),
            base_value: self.expected_value(),
        })
    }
}

/// Per-sample, per-feature attributions together with the explained rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapValues {
    /// Shape: (n_samples, n_features)
    values: Array2<f64>,
    /// The explained inputs, same shape as `values`.
    data: Array2<f64>,
    base_value: f64,
}

impl ShapValues {
    /// Wraps attributions produced elsewhere.
    ///
    /// # Errors
    /// `DimensionMismatch` if `values` and `data` differ in shape.
    pub fn new(values: Array2<f64>, data: Array2<f64>, base_value: f64) -> Result<Self, ExplainError> {
        if values.nrows() != data.nrows() {
            return Err(ExplainError::DimensionMismatch {
                context: "SHAP rows vs. data rows",
                expected: values.nrows(),
                found: data.nrows(),
            });
        }
        if values.ncols() != data.ncols() {
            return Err(ExplainError::DimensionMismatch {
                context: "SHAP columns vs. data columns",
                expected: values.ncols(),
                found: data.ncols(),
            });
        }
        Ok(Self {
            values,
            data,
            base_value,
        })
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Mean absolute attribution of each feature across samples.
    ///
    /// All zeros when there are no samples.
    pub fn mean_abs(&self) -> Array1<f64> {
        self.values
            .mapv(f64::abs)
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_features()))
    }

    /// Feature indices ordered by descending mean absolute attribution.
    ///
    /// This is the ordering of a SHAP summary plot. Ties keep index order.
    pub fn ranked_components(&self) -> Vec<usize> {
        rank_descending(self.mean_abs().view())
    }

    /// Waterfall view of one sample.
    pub fn instance(&self, sample: usize) -> Result<InstanceExplanation, ExplainError> {
        if sample >= self.n_samples() {
            return Err(ExplainError::IndexOutOfRange {
                index: sample,
                len: self.n_samples(),
            });
        }
        let row = self.values.row(sample);
        let contributions = rank_descending(row.mapv(f64::abs).view())
            .into_iter()
            .map(|feature_index| Contribution {
                feature_index,
                shap_value: row[feature_index],
                feature_value: self.data[[sample, feature_index]],
            })
            .collect();
        Ok(InstanceExplanation {
            sample,
            base_value: self.base_value,
            contributions,
        })
    }
}

/// One feature's share of a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature_index: usize,
    pub shap_value: f64,
    /// The input value of the feature for this sample.
    pub feature_value: f64,
}

/// Contributions of every feature to one sample, largest magnitude first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceExplanation {
    pub sample: usize,
    pub base_value: f64,
    pub contributions: Vec<Contribution>,
}

impl InstanceExplanation {
    /// Base value plus all contributions; equals the model margin for this sample.
    pub fn output_value(&self) -> f64 {
        self.base_value + self.contributions.iter().map(|c| c.shap_value).sum::<f64>()
    }
}

impl fmt::Display for InstanceExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sample {}: f(x) = {:.6}", self.sample, self.output_value())?;
        for c in &self.contributions {
            writeln!(
                f,
                "{:<6} {:>+12.6}  (x = {:.6})",
                component_label(c.feature_index),
                c.shap_value,
                c.feature_value
            )?;
        }
        writeln!(f, "E[f(X)] = {:.6}", self.base_value)
    }
}
