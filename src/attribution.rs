// src/attribution.rs

//! Ranking of original features by their loading on a principal component.
//!
//! A SHAP explanation computed over PCA scores says *which component* moved a
//! prediction. The loadings of that component say *which original features*
//! the component is made of. This module answers the second question.

use std::cmp::Ordering;
use std::fmt;

use log::{debug, trace};
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::component_label;
use crate::error::ExplainError;

/// One original feature and its signed loading on a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLoading {
    /// Column of the feature in the component matrix.
    pub feature_index: usize,
    pub feature_name: String,
    /// Signed coefficient; the sign gives the direction of the contribution.
    pub loading: f64,
}

/// Features of one component, ordered by descending absolute loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingRanking {
    component_index: usize,
    entries: Vec<FeatureLoading>,
}

impl LoadingRanking {
    /// Zero-based index of the ranked component.
    pub fn component_index(&self) -> usize {
        self.component_index
    }

    /// `PC{i+1}` label of the ranked component.
    pub fn label(&self) -> String {
        component_label(self.component_index)
    }

    pub fn entries(&self) -> &[FeatureLoading] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeatureLoading> {
        self.entries.iter()
    }

    /// The ranking as `(feature_name, loading)` pairs.
    pub fn pairs(&self) -> Vec<(&str, f64)> {
        self.entries
            .iter()
            .map(|entry| (entry.feature_name.as_str(), entry.loading))
            .collect()
    }
}

impl<'a> IntoIterator for &'a LoadingRanking {
    type Item = &'a FeatureLoading;
    type IntoIter = std::slice::Iter<'a, FeatureLoading>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for LoadingRanking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Top {} most important variables for {}:",
            self.entries.len(),
            self.label()
        )?;
        let name_width = self
            .entries
            .iter()
            .map(|entry| entry.feature_name.chars().count())
            .max()
            .unwrap_or(0);
        for entry in &self.entries {
            writeln!(
                f,
                "{:<width$}  {:>10.6}",
                entry.feature_name,
                entry.loading,
                width = name_width
            )?;
        }
        Ok(())
    }
}

/// Indices of `scores` in stable descending order. NaN scores go last.
pub(crate) fn rank_descending(scores: ArrayView1<'_, f64>) -> Vec<usize> {
    let key = |i: usize| {
        let score = scores[i];
        if score.is_nan() {
            f64::NEG_INFINITY
        } else {
            score
        }
    };
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // `sort_by` is stable, so equal scores keep their index order.
    order.sort_by(|&a, &b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    order
}

fn check_feature_names<S: AsRef<str>>(
    component_matrix: &ArrayView2<'_, f64>,
    feature_names: &[S],
) -> Result<(), ExplainError> {
    if feature_names.len() != component_matrix.ncols() {
        return Err(ExplainError::DimensionMismatch {
            context: "feature names vs. component matrix columns",
            expected: component_matrix.ncols(),
            found: feature_names.len(),
        });
    }
    Ok(())
}

fn check_component_index(
    component_matrix: &ArrayView2<'_, f64>,
    component_index: usize,
) -> Result<(), ExplainError> {
    if component_index >= component_matrix.nrows() {
        return Err(ExplainError::IndexOutOfRange {
            index: component_index,
            len: component_matrix.nrows(),
        });
    }
    Ok(())
}

fn check_k(k: usize) -> Result<(), ExplainError> {
    if k == 0 {
        return Err(ExplainError::InvalidArgument(
            "Number of top loadings (k) must be greater than 0.".into(),
        ));
    }
    Ok(())
}

/// Ranks a single row of loadings. Inputs are assumed validated.
fn rank_row<S: AsRef<str>>(
    row: ArrayView1<'_, f64>,
    feature_names: &[S],
    component_index: usize,
    k: usize,
) -> LoadingRanking {
    let mut order = rank_descending(row.mapv(f64::abs).view());
    order.truncate(k);

    let entries = order
        .into_iter()
        .map(|feature_index| FeatureLoading {
            feature_index,
            feature_name: feature_names[feature_index].as_ref().to_owned(),
            loading: row[feature_index],
        })
        .collect::<Vec<_>>();
    trace!(
        "Ranked {} of {} loadings for {}.",
        entries.len(),
        row.len(),
        component_label(component_index)
    );

    LoadingRanking {
        component_index,
        entries,
    }
}

/// Returns the `k` original features with the largest absolute loading on a component.
///
/// * `component_matrix` - Shape (n_components, n_features); row `i` is component `i`.
/// * `feature_names` - One name per column of `component_matrix`.
/// * `component_index` - Zero-based row to rank.
/// * `k` - Number of entries to return. Values above `n_features` return every feature.
///
/// The result holds exactly `min(k, n_features)` entries sorted by descending
/// `|loading|`, each keeping the loading's original sign. Equal magnitudes keep
/// column order.
///
/// # Errors
/// Checks run in this order and the first failure is returned:
/// - `DimensionMismatch` if `feature_names.len()` differs from the column count.
/// - `IndexOutOfRange` if `component_index >= n_components`.
/// - `InvalidArgument` if `k == 0`.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use pca_explain::top_loadings;
///
/// let components = array![[0.1, -0.9, 0.3], [0.5, 0.2, -0.8]];
/// let ranking = top_loadings(components.view(), &["a", "b", "c"], 0, 2).unwrap();
/// assert_eq!(ranking.pairs(), vec![("b", -0.9), ("c", 0.3)]);
/// ```
pub fn top_loadings<S: AsRef<str>>(
    component_matrix: ArrayView2<'_, f64>,
    feature_names: &[S],
    component_index: usize,
    k: usize,
) -> Result<LoadingRanking, ExplainError> {
    check_feature_names(&component_matrix, feature_names)?;
    check_component_index(&component_matrix, component_index)?;
    check_k(k)?;

    Ok(rank_row(
        component_matrix.row(component_index),
        feature_names,
        component_index,
        k,
    ))
}

/// Ranks several components at once, returning one ranking per requested index
/// in request order.
///
/// Every index is validated before any work starts, so an invalid request
/// yields the error for the first bad index and no rankings. Rankings are
/// computed in parallel.
pub fn top_loadings_many<S: AsRef<str> + Sync>(
    component_matrix: ArrayView2<'_, f64>,
    feature_names: &[S],
    component_indices: &[usize],
    k: usize,
) -> Result<Vec<LoadingRanking>, ExplainError> {
    check_feature_names(&component_matrix, feature_names)?;
    for &component_index in component_indices {
        check_component_index(&component_matrix, component_index)?;
    }
    check_k(k)?;

    debug!(
        "Ranking top {} loadings for {} components over {} features.",
        k,
        component_indices.len(),
        component_matrix.ncols()
    );

    Ok(component_indices
        .par_iter()
        .map(|&component_index| {
            rank_row(
                component_matrix.row(component_index),
                feature_names,
                component_index,
                k,
            )
        })
        .collect())
}
