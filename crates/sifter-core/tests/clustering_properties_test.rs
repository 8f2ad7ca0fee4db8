//! Property tests for semantic clustering.

mod common;

use common::at_angle;
use proptest::prelude::*;
use sifter_core::{
    DuplicateGroup, Embedding, FlatIndex, FlatL2Index, RecordId, SemanticClusterer, VectorIndex,
};

fn cluster(
    index: Box<dyn VectorIndex>,
    threshold: f32,
    vectors: &[(RecordId, Embedding)],
) -> Vec<DuplicateGroup> {
    let mut clusterer = SemanticClusterer::new(index, threshold).unwrap();
    clusterer.insert_batch(vectors).unwrap();
    clusterer.duplicate_groups()
}

/// Angles spaced so no pair sits on a 0.90 or 0.95 boundary
fn arb_angles() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec((0u32..90).prop_map(|step| step as f32 * 4.0 + 0.5), 1..30)
}

#[test]
fn test_scenario_similar_pair_at_090() {
    let cos = 0.95_f32;
    let vectors = vec![
        (RecordId::new(0), Embedding(vec![1.0, 0.0])),
        (RecordId::new(1), Embedding(vec![cos, (1.0 - cos * cos).sqrt()])),
    ];

    for index in [
        Box::new(FlatIndex::new()) as Box<dyn VectorIndex>,
        Box::new(FlatL2Index::new()),
    ] {
        let groups = cluster(index, 0.90, &vectors);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].canonical, RecordId::new(0));
        assert_eq!(groups[0].removed().collect::<Vec<_>>(), vec![&RecordId::new(1)]);
    }
}

#[test]
fn test_unnormalized_vectors_are_compared_by_cosine() {
    // Same direction, very different magnitudes
    let vectors = vec![
        (RecordId::new(0), Embedding(vec![10.0, 0.0])),
        (RecordId::new(1), Embedding(vec![0.01, 0.0])),
    ];
    assert_eq!(cluster(Box::new(FlatL2Index::new()), 0.99, &vectors).len(), 1);
    assert_eq!(cluster(Box::new(FlatIndex::new()), 0.99, &vectors).len(), 1);
}

proptest! {
    #[test]
    fn prop_groups_are_insertion_order_independent(
        (angles, order) in arb_angles().prop_flat_map(|angles| {
            let n = angles.len();
            (Just(angles), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        }),
        threshold in prop::sample::select(vec![0.90_f32, 0.95, 0.99]),
    ) {
        let vectors: Vec<_> = angles
            .iter()
            .enumerate()
            .map(|(i, a)| (RecordId::new(i as u64), at_angle(*a)))
            .collect();
        let shuffled: Vec<_> = order.iter().map(|&i| vectors[i].clone()).collect();

        let forward = cluster(Box::new(FlatIndex::new()), threshold, &vectors);
        let permuted = cluster(Box::new(FlatIndex::new()), threshold, &shuffled);
        prop_assert_eq!(forward, permuted);
    }

    #[test]
    fn prop_inner_product_and_squared_l2_agree(
        angles in arb_angles(),
        threshold in prop::sample::select(vec![0.90_f32, 0.95]),
    ) {
        let vectors: Vec<_> = angles
            .iter()
            .enumerate()
            .map(|(i, a)| (RecordId::new(i as u64), at_angle(*a)))
            .collect();

        let ip = cluster(Box::new(FlatIndex::new()), threshold, &vectors);
        let l2 = cluster(Box::new(FlatL2Index::new()), threshold, &vectors);
        prop_assert_eq!(ip, l2);
    }

    #[test]
    fn prop_canonical_is_group_minimum(angles in arb_angles()) {
        let vectors: Vec<_> = angles
            .iter()
            .enumerate()
            .rev()
            .map(|(i, a)| (RecordId::new(i as u64), at_angle(*a)))
            .collect();

        for group in cluster(Box::new(FlatIndex::new()), 0.90, &vectors) {
            let min = group.members.iter().min().copied().unwrap();
            prop_assert_eq!(group.canonical, min);
        }
    }
}
