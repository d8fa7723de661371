// In tests/attribution_tests.rs

use ndarray::{array, Array2};
use pca_explain::{top_loadings, top_loadings_many, ComponentCatalog, ExplainError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_components(n_components: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_components, n_features), |_| rng.gen_range(-1.0..1.0))
}

fn names(n_features: usize) -> Vec<String> {
    (0..n_features).map(|j| format!("f{}", j)).collect()
}

#[test]
fn worked_examples() {
    let components = array![[0.1, -0.9, 0.3], [0.5, 0.2, -0.8]];
    let names = ["a", "b", "c"];

    let first = top_loadings(components.view(), &names, 0, 2).unwrap();
    assert_eq!(first.pairs(), vec![("b", -0.9), ("c", 0.3)]);

    let second = top_loadings(components.view(), &names, 1, 1).unwrap();
    assert_eq!(second.pairs(), vec![("c", -0.8)]);

    assert!(matches!(
        top_loadings(components.view(), &names, 5, 2),
        Err(ExplainError::IndexOutOfRange { index: 5, len: 2 })
    ));
}

#[test]
fn ranking_properties_hold_on_random_matrices() {
    for seed in 0..20u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(1000 + seed);
        let n_components = rng.gen_range(1..8);
        let n_features = rng.gen_range(1..40);
        let components = random_components(n_components, n_features, seed);
        let names = names(n_features);
        let snapshot = components.clone();

        for component_index in 0..n_components {
            let k = rng.gen_range(1..n_features + 5);
            let ranking = top_loadings(components.view(), &names, component_index, k).unwrap();
            let row = components.row(component_index);

            // Length is min(k, n_features).
            assert_eq!(ranking.len(), k.min(n_features), "seed {}", seed);

            // Magnitudes are non-increasing.
            for pair in ranking.entries().windows(2) {
                assert!(pair[0].loading.abs() >= pair[1].loading.abs());
            }

            // Signs and values come straight from the row.
            for entry in ranking.iter() {
                assert_eq!(entry.loading, row[entry.feature_index]);
                assert_eq!(entry.feature_name, names[entry.feature_index]);
            }

            // Magnitudes equal the exhaustive top-k of the row.
            let mut all: Vec<f64> = row.iter().map(|v| v.abs()).collect();
            all.sort_by(|a, b| b.partial_cmp(a).unwrap());
            let returned: Vec<f64> = ranking.iter().map(|e| e.loading.abs()).collect();
            assert_eq!(returned, all[..ranking.len()].to_vec());
        }

        assert_eq!(components, snapshot, "input must not be mutated");
    }
}

#[test]
fn oversized_k_is_a_permutation_of_the_row() {
    let components = random_components(3, 12, 99);
    let names = names(12);
    let ranking = top_loadings(components.view(), &names, 2, 1_000).unwrap();
    let mut seen: Vec<usize> = ranking.iter().map(|e| e.feature_index).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..12).collect::<Vec<_>>());
}

#[test]
fn repeated_calls_are_identical() {
    let components = array![[0.5, -0.5, 0.5, -0.5, 0.1]];
    let names = ["p", "q", "r", "s", "t"];
    let first = top_loadings(components.view(), &names, 0, 3).unwrap();
    for _ in 0..10 {
        assert_eq!(top_loadings(components.view(), &names, 0, 3).unwrap(), first);
    }
    assert_eq!(first.pairs(), vec![("p", 0.5), ("q", -0.5), ("r", 0.5)]);
}

#[test]
fn mismatched_names_return_no_result() {
    let components = random_components(4, 6, 5);
    let short = names(5);
    let result = top_loadings(components.view(), &short, 0, 3);
    assert!(matches!(
        result,
        Err(ExplainError::DimensionMismatch { expected: 6, found: 5, .. })
    ));
    assert!(top_loadings_many(components.view(), &short, &[0, 1], 3).is_err());
}

#[test]
fn batch_matches_single_calls() {
    let components = random_components(10, 25, 17);
    let names = names(25);
    let catalog = ComponentCatalog::new(components.clone(), names.clone()).unwrap();
    let indices = [9, 3, 0, 3];
    let batch = catalog.top_loadings_many(&indices, 4).unwrap();
    for (ranking, &index) in batch.iter().zip(indices.iter()) {
        assert_eq!(ranking, &top_loadings(components.view(), &names, index, 4).unwrap());
    }
}

#[test]
fn rankings_serialize_for_reporting() {
    let components = array![[0.1, -0.9, 0.3]];
    let ranking = top_loadings(components.view(), &["a", "b", "c"], 0, 2).unwrap();
    let encoded = bincode::serde::encode_to_vec(&ranking, bincode::config::standard()).unwrap();
    let (decoded, _): (pca_explain::LoadingRanking, usize) =
        bincode::serde::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
    assert_eq!(decoded, ranking);
}

#[test]
fn batch_rejects_zero_k() {
    let components = random_components(3, 5, 4);
    let names = names(5);
    assert!(matches!(
        top_loadings_many(components.view(), &names, &[0, 2], 0),
        Err(ExplainError::InvalidArgument(_))
    ));
    // k is checked even when there is nothing to rank.
    assert!(matches!(
        top_loadings_many(components.view(), &names, &[], 0),
        Err(ExplainError::InvalidArgument(_))
    ));
}

#[test]
fn batch_of_no_components_is_empty() {
    let components = random_components(3, 5, 4);
    let names = names(5);
    let rankings = top_loadings_many(components.view(), &names, &[], 2).unwrap();
    assert!(rankings.is_empty());

    let catalog = ComponentCatalog::new(components, names).unwrap();
    assert!(catalog.top_loadings_many(&[], 2).unwrap().is_empty());
}
