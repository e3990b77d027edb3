//! Tests for accuracy and the entropy decomposition

use super::*;
use approx::assert_abs_diff_eq;
use ndarray::{array, Array3};
use proptest::prelude::*;

fn two_member_batch() -> Array3<f32> {
    // Example 0: members agree on class 1; example 1: members disagree
    array![
        [[0.1, 0.9], [0.2, 0.8]],
        [[0.9, 0.1], [0.1, 0.9]],
    ]
}

#[test]
fn test_accuracy_uses_sample_mean() {
    let dist = two_member_batch();
    // Example 1 averages to [0.5, 0.5]; ties resolve to class 0
    assert_abs_diff_eq!(accuracy(&[1, 0], &dist), 1.0);
    assert_abs_diff_eq!(accuracy(&[1, 1], &dist), 0.5);
    assert_abs_diff_eq!(accuracy(&[0, 1], &dist), 0.0);
}

#[test]
fn test_registered_metric_evaluates() {
    let metric = Metric::accuracy();
    assert_eq!(metric.name, "Acc");
    assert_abs_diff_eq!(metric.evaluate(&[1, 0], &two_member_batch()), 1.0);

    let custom = Metric::new("Mean max prob", |_, dist: &Array3<f32>| {
        sample_mean(dist)
            .rows()
            .into_iter()
            .map(|r| r.fold(0.0f32, |a, &b| a.max(b)))
            .sum::<f32>()
            / dist.shape()[0] as f32
    });
    assert_abs_diff_eq!(custom.evaluate(&[], &two_member_batch()), 0.675, epsilon = 1e-6);
    assert_eq!(format!("{custom:?}"), "Metric { name: \"Mean max prob\" }");
}

#[test]
#[should_panic(expected = "same batch")]
fn test_accuracy_rejects_label_mismatch() {
    accuracy(&[0], &two_member_batch());
}

#[test]
fn test_entropy_edge_cases() {
    assert_abs_diff_eq!(entropy(array![1.0f32, 0.0].view()), 0.0);
    assert_abs_diff_eq!(entropy(array![0.5f32, 0.5].view()), 2.0f64.ln(), epsilon = 1e-9);
}

#[test]
fn test_disagreement_is_epistemic() {
    let split = uncertainty_separation_entropy(&two_member_batch(), None).unwrap();

    // Confident disagreeing members: total near ln 2, mostly epistemic
    assert_abs_diff_eq!(split.total[1], 2.0f32.ln(), epsilon = 1e-6);
    assert!(split.epistemic[1] > split.epistemic[0]);
    assert!(split.epistemic[1] > split.aleatoric[1]);
}

#[test]
fn test_single_sample_has_no_epistemic_uncertainty() {
    let dist = array![[[0.3, 0.7]], [[0.5, 0.5]]];
    let split = uncertainty_separation_entropy(&dist, Some(&[1, 0])).unwrap();
    for i in 0..2 {
        assert_abs_diff_eq!(split.epistemic[i], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(split.total[i], split.aleatoric[i], epsilon = 1e-7);
    }
}

#[test]
fn test_label_length_is_checked() {
    assert!(matches!(
        uncertainty_separation_entropy(&two_member_batch(), Some(&[0])),
        Err(crate::Error::ShapeMismatch { .. })
    ));
}

/// Random `batch x samples x classes` arrays whose rows are probability vectors
fn distributions() -> impl Strategy<Value = Array3<f32>> {
    (1usize..5, 1usize..8, 2usize..6).prop_flat_map(|(b, s, k)| {
        prop::collection::vec(0.01f32..1.0, b * s * k).prop_map(move |raw| {
            let mut dist = Array3::from_shape_vec((b, s, k), raw).unwrap();
            for mut row in dist.lanes_mut(ndarray::Axis(2)) {
                let sum = row.sum();
                row /= sum;
            }
            dist
        })
    })
}

proptest! {
    #[test]
    fn prop_decomposition_identity_and_sign(dist in distributions()) {
        let split = uncertainty_separation_entropy(&dist, None).unwrap();
        let k = dist.shape()[2] as f32;
        for i in 0..dist.shape()[0] {
            prop_assert!((split.total[i] - split.aleatoric[i] - split.epistemic[i]).abs() < 1e-5);
            prop_assert!(split.total[i] >= 0.0);
            prop_assert!(split.aleatoric[i] >= 0.0);
            prop_assert!(split.epistemic[i] >= 0.0);
            prop_assert!(split.total[i] <= k.ln() + 1e-5);
        }
    }

    #[test]
    fn prop_sub_normalized_samples_stay_non_negative(
        dist in distributions(),
        scale in 0.1f32..1.0,
    ) {
        // Vectors summing below one, as produced by the implicit-class transform
        let scaled = dist.mapv(|v| v * scale);
        let split = uncertainty_separation_entropy(&scaled, None).unwrap();
        for i in 0..scaled.shape()[0] {
            prop_assert!(split.epistemic[i] >= 0.0);
            prop_assert!(split.aleatoric[i] >= 0.0);
        }
    }

    #[test]
    fn prop_accuracy_is_a_fraction(dist in distributions(), seed in 0usize..10) {
        let b = dist.shape()[0];
        let k = dist.shape()[2];
        let labels: Vec<usize> = (0..b).map(|i| (i + seed) % k).collect();
        let acc = accuracy(&labels, &dist);
        prop_assert!((0.0..=1.0).contains(&acc));
    }
}
