// Attribution of principal components to original features

#![doc = include_str!("../README.md")]

pub mod analysis;
pub mod attribution;
pub mod components;
pub mod error;
pub mod explain;
pub mod pca;


pub use analysis::{explain_instance, summarize_components, AnalysisConfig, ComponentSummary};
pub use attribution::{top_loadings, top_loadings_many, FeatureLoading, LoadingRanking};
pub use components::{component_label, parse_component_label, ComponentCatalog};
pub use error::ExplainError;
pub use explain::{Contribution, InstanceExplanation, LinearExplainer, LinearModel, Link, ShapValues};
pub use pca::Pca;
