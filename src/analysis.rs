// src/analysis.rs

//! Composes SHAP ranking and loading attribution into component summaries.
//!
//! The flow is explicit: the caller supplies SHAP values computed over
//! component scores and a [`ComponentCatalog`] describing the components.
//! Components are ranked by SHAP impact, and each selected component is
//! attributed to its dominant original features.

use log::{debug, info};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::attribution::{rank_descending, LoadingRanking};
use crate::components::{component_label, ComponentCatalog};
use crate::error::ExplainError;
use crate::explain::ShapValues;

/// Configuration for component summaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of components to summarize, taken from the top of the SHAP ranking.
    pub top_components: usize,
    /// Number of original features listed per component.
    pub top_features: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            top_components: 8,
            top_features: 10,
        }
    }
}

impl AnalysisConfig {
    /// Both counts must be greater than 0.
    pub fn validate(&self) -> Result<(), ExplainError> {
        if self.top_components == 0 {
            return Err(ExplainError::InvalidArgument(
                "top_components must be greater than 0.".into(),
            ));
        }
        if self.top_features == 0 {
            return Err(ExplainError::InvalidArgument(
                "top_features must be greater than 0.".into(),
            ));
        }
        Ok(())
    }
}

/// One component selected by SHAP impact, with its dominant original features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub component_index: usize,
    pub label: String,
    /// Mean |SHAP| for global summaries, |SHAP| of the sample for instance summaries.
    pub impact: f64,
    /// Signed SHAP value for instance summaries; `None` for global summaries.
    pub shap_value: Option<f64>,
    pub loadings: LoadingRanking,
}

fn check_widths(shap: &ShapValues, catalog: &ComponentCatalog) -> Result<(), ExplainError> {
    if shap.n_features() != catalog.num_components() {
        return Err(ExplainError::DimensionMismatch {
            context: "SHAP columns vs. catalog components",
            expected: catalog.num_components(),
            found: shap.n_features(),
        });
    }
    Ok(())
}

fn summarize_ranked(
    catalog: &ComponentCatalog,
    impacts: ArrayView1<'_, f64>,
    signed: Option<ArrayView1<'_, f64>>,
    config: &AnalysisConfig,
) -> Result<Vec<ComponentSummary>, ExplainError> {
    let mut selected = rank_descending(impacts);
    selected.truncate(config.top_components);

    let rankings = catalog.top_loadings_many(&selected, config.top_features)?;
    Ok(selected
        .into_iter()
        .zip(rankings)
        .map(|(component_index, loadings)| ComponentSummary {
            component_index,
            label: component_label(component_index),
            impact: impacts[component_index],
            shap_value: signed.map(|row| row[component_index]),
            loadings,
        })
        .collect())
}

/// Summarizes the components with the largest mean absolute SHAP value.
///
/// The order matches a SHAP summary plot. At most `config.top_components`
/// summaries are returned, each carrying `config.top_features` loadings.
///
/// # Errors
/// `InvalidArgument` for an invalid config, `DimensionMismatch` when the SHAP
/// width differs from the catalog's component count.
pub fn summarize_components(
    shap: &ShapValues,
    catalog: &ComponentCatalog,
    config: &AnalysisConfig,
) -> Result<Vec<ComponentSummary>, ExplainError> {
    config.validate()?;
    check_widths(shap, catalog)?;

    let importance: Array1<f64> = shap.mean_abs();
    let summaries = summarize_ranked(catalog, importance.view(), None, config)?;
    info!(
        "Summarized {} of {} components by mean |SHAP| over {} samples.",
        summaries.len(),
        catalog.num_components(),
        shap.n_samples()
    );
    Ok(summaries)
}

/// Summarizes the components that moved one sample's prediction the most.
///
/// This is the attribution counterpart of a waterfall plot.
///
/// # Errors
/// As [`summarize_components`], plus `IndexOutOfRange` for a missing sample.
pub fn explain_instance(
    shap: &ShapValues,
    catalog: &ComponentCatalog,
    sample: usize,
    config: &AnalysisConfig,
) -> Result<Vec<ComponentSummary>, ExplainError> {
    config.validate()?;
    check_widths(shap, catalog)?;
    if sample >= shap.n_samples() {
        return Err(ExplainError::IndexOutOfRange {
            index: sample,
            len: shap.n_samples(),
        });
    }

    let values = shap.values();
    let row = values.row(sample);
    let magnitudes = row.mapv(f64::abs);
    debug!("Explaining sample {} across {} components.", sample, row.len());
    summarize_ranked(catalog, magnitudes.view(), Some(row), config)
}
