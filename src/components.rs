// src/components.rs

use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::attribution::{top_loadings, top_loadings_many, LoadingRanking};
use crate::error::ExplainError;
use crate::pca::Pca;

/// Returns the conventional label of a zero-based component index (`0 -> "PC1"`).
pub fn component_label(component_index: usize) -> String {
    format!("PC{}", component_index + 1)
}

/// Parses a `PC<n>` label (with `n >= 1`) into a zero-based component index.
///
/// The prefix is matched case-insensitively and surrounding whitespace is ignored.
pub fn parse_component_label(label: &str) -> Result<usize, ExplainError> {
    let trimmed = label.trim();
    let number = trimmed
        .get(..2)
        .filter(|prefix| prefix.eq_ignore_ascii_case("pc"))
        .and_then(|_| trimmed.get(2..))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<usize>().ok())
        .filter(|&n| n >= 1)
        .ok_or_else(|| ExplainError::UnknownComponentLabel(label.to_owned()))?;
    Ok(number - 1)
}

/// A component matrix bundled with the names of the features it loads on.
///
/// Row `i` of the matrix is principal component `i`; column `j` is the original
/// feature `feature_names[j]`. The two are checked for agreement once, at
/// construction (deserialization included), so rankings never fail on a
/// width mismatch afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CatalogParts")]
pub struct ComponentCatalog {
    /// Shape: (n_components, n_features)
    components: Array2<f64>,
    feature_names: Vec<String>,
}

/// Unchecked wire form of a [`ComponentCatalog`].
#[derive(Deserialize)]
struct CatalogParts {
    components: Array2<f64>,
    feature_names: Vec<String>,
}

impl TryFrom<CatalogParts> for ComponentCatalog {
    type Error = ExplainError;

    fn try_from(parts: CatalogParts) -> Result<Self, Self::Error> {
        Self::new(parts.components, parts.feature_names)
    }
}

impl ComponentCatalog {
    /// Bundles a component matrix with its feature names.
    ///
    /// # Errors
    /// `DimensionMismatch` if the number of names differs from the column count,
    /// `InvalidArgument` if the matrix has no components or no features.
    pub fn new<S: Into<String>>(
        components: Array2<f64>,
        feature_names: Vec<S>,
    ) -> Result<Self, ExplainError> {
        if components.nrows() == 0 || components.ncols() == 0 {
            return Err(ExplainError::InvalidArgument(format!(
                "Component matrix must be non-empty, got shape ({}, {}).",
                components.nrows(),
                components.ncols()
            )));
        }
        if feature_names.len() != components.ncols() {
            return Err(ExplainError::DimensionMismatch {
                context: "feature names vs. component matrix columns",
                expected: components.ncols(),
                found: feature_names.len(),
            });
        }
        Ok(Self {
            components,
            feature_names: feature_names.into_iter().map(Into::into).collect(),
        })
    }

    /// Builds a catalog from a fitted [`Pca`].
    ///
    /// The PCA rotation is stored feature-major, (n_features, k); the catalog
    /// transposes it so that each row is a component.
    pub fn from_pca<S: Into<String>>(
        pca: &Pca,
        feature_names: Vec<S>,
    ) -> Result<Self, ExplainError> {
        let rotation = pca.rotation().ok_or(ExplainError::NotFitted("rotation matrix"))?;
        debug!(
            "Building component catalog from PCA rotation of shape {:?}.",
            rotation.dim()
        );
        Self::new(rotation.t().to_owned(), feature_names)
    }

    pub fn num_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.components.ncols()
    }

    pub fn components(&self) -> ArrayView2<'_, f64> {
        self.components.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Labels `PC1..PCn` for every component.
    pub fn labels(&self) -> Vec<String> {
        (0..self.num_components()).map(component_label).collect()
    }

    /// The raw loadings of one component.
    pub fn loadings_of(&self, component_index: usize) -> Result<ArrayView1<'_, f64>, ExplainError> {
        if component_index >= self.num_components() {
            return Err(ExplainError::IndexOutOfRange {
                index: component_index,
                len: self.num_components(),
            });
        }
        Ok(self.components.row(component_index))
    }

    /// See [`top_loadings`].
    pub fn top_loadings(
        &self,
        component_index: usize,
        k: usize,
    ) -> Result<LoadingRanking, ExplainError> {
        top_loadings(self.components.view(), &self.feature_names, component_index, k)
    }

    /// Ranks a component addressed by its `PC<n>` label.
    pub fn top_loadings_by_label(
        &self,
        label: &str,
        k: usize,
    ) -> Result<LoadingRanking, ExplainError> {
        let component_index = parse_component_label(label)?;
        if component_index >= self.num_components() {
            return Err(ExplainError::UnknownComponentLabel(label.to_owned()));
        }
        self.top_loadings(component_index, k)
    }

    /// See [`top_loadings_many`].
    pub fn top_loadings_many(
        &self,
        component_indices: &[usize],
        k: usize,
    ) -> Result<Vec<LoadingRanking>, ExplainError> {
        top_loadings_many(
            self.components.view(),
            &self.feature_names,
            component_indices,
            k,
        )
    }
}
