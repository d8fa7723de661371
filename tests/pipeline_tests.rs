// In tests/pipeline_tests.rs

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, Axis};
use pca_explain::{
    explain_instance, summarize_components, AnalysisConfig, ComponentCatalog, LinearExplainer,
    LinearModel, Link, Pca,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const FEATURES: [&str; 6] = [
    "ext_source_1",
    "ext_source_2",
    "commonarea_avg",
    "commonarea_mode",
    "years_build_medi",
    "amt_goods_price",
];

/// Two latent factors drive correlated feature pairs; the last two columns are noise.
/// The external pair is far more tightly correlated, so its component comes first.
fn generate_correlated_data(n_samples: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Array2::<f64>::zeros((n_samples, FEATURES.len()));
    for mut row in data.axis_iter_mut(Axis(0)) {
        let external: f64 = rng.gen_range(-3.0..3.0);
        let area: f64 = rng.gen_range(-2.0..2.0);
        row[0] = external + rng.gen_range(-0.05..0.05);
        row[1] = external + rng.gen_range(-0.05..0.05);
        row[2] = area + rng.gen_range(-1.5..1.5);
        row[3] = area + rng.gen_range(-1.5..1.5);
        row[4] = rng.gen_range(-0.5..0.5);
        row[5] = rng.gen_range(-0.5..0.5);
    }
    data
}

struct Fixture {
    catalog: ComponentCatalog,
    model: LinearModel,
    scores: Array2<f64>,
}

fn fixture() -> Fixture {
    let train = generate_correlated_data(2000, 2024);
    let mut pca = Pca::new();
    pca.fit(train.clone(), None).unwrap();
    let scores = pca.transform(train).unwrap();
    let catalog = ComponentCatalog::from_pca(&pca, FEATURES.to_vec()).unwrap();

    // The model leans almost entirely on the second component.
    let mut coefficients = Array1::<f64>::from_elem(pca.n_components(), 0.01);
    coefficients[1] = 2.0;
    let model = LinearModel::new(coefficients, -1.0, Link::Logit).unwrap();

    Fixture {
        catalog,
        model,
        scores,
    }
}

#[test]
fn leading_components_load_on_correlated_pairs() {
    let Fixture { catalog, .. } = fixture();

    let mut pairs: Vec<Vec<String>> = (0..2)
        .map(|i| {
            let mut top: Vec<String> = catalog
                .top_loadings(i, 2)
                .unwrap()
                .iter()
                .map(|e| e.feature_name.clone())
                .collect();
            top.sort();
            top
        })
        .collect();
    pairs.sort();

    assert_eq!(
        pairs,
        vec![
            vec!["commonarea_avg".to_string(), "commonarea_mode".to_string()],
            vec!["ext_source_1".to_string(), "ext_source_2".to_string()],
        ]
    );
}

#[test]
fn global_summary_puts_dominant_component_first() {
    let Fixture {
        catalog,
        model,
        scores,
    } = fixture();
    let explainer = LinearExplainer::new(&model, scores.view()).unwrap();
    let shap = explainer.shap_values(scores.view()).unwrap();

    // Scores are centered, so the base value is the intercept.
    assert_abs_diff_eq!(shap.base_value(), -1.0, epsilon = 1e-9);

    let config = AnalysisConfig {
        top_components: 3,
        top_features: 2,
    };
    let summaries = summarize_components(&shap, &catalog, &config).unwrap();
    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].label, "PC2");
    assert_eq!(summaries[0].loadings, catalog.top_loadings(1, 2).unwrap());
    for pair in summaries.windows(2) {
        assert!(pair[0].impact >= pair[1].impact);
    }
}

#[test]
fn instance_summary_is_additive_and_signed() {
    let Fixture {
        catalog,
        model,
        scores,
    } = fixture();
    let explainer = LinearExplainer::new(&model, scores.view()).unwrap();
    let sample_rows = scores.slice(ndarray::s![0..5, ..]);
    let shap = explainer.shap_values(sample_rows).unwrap();
    let margins = model.decision_function(sample_rows).unwrap();

    for sample in 0..shap.n_samples() {
        let waterfall = shap.instance(sample).unwrap();
        assert_abs_diff_eq!(waterfall.output_value(), margins[sample], epsilon = 1e-9);

        let summaries =
            explain_instance(&shap, &catalog, sample, &AnalysisConfig::default()).unwrap();
        assert_eq!(summaries.len(), catalog.num_components());
        for (summary, contribution) in summaries.iter().zip(waterfall.contributions.iter()) {
            assert_eq!(summary.component_index, contribution.feature_index);
            assert_eq!(summary.shap_value, Some(contribution.shap_value));
        }
    }
}

#[test]
fn reloaded_model_gives_same_attribution() {
    let train = generate_correlated_data(50, 8);
    let mut pca = Pca::new();
    pca.fit(train, None).unwrap();

    let file = tempfile::NamedTempFile::new().unwrap();
    pca.save_model(file.path()).unwrap();
    let reloaded = Pca::load_model(file.path()).unwrap();

    let before = ComponentCatalog::from_pca(&pca, FEATURES.to_vec()).unwrap();
    let after = ComponentCatalog::from_pca(&reloaded, FEATURES.to_vec()).unwrap();
    for i in 0..before.num_components() {
        assert_eq!(
            before.top_loadings(i, 3).unwrap(),
            after.top_loadings(i, 3).unwrap()
        );
    }
}
