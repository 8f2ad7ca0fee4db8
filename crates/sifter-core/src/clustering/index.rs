//! Exact flat-scan vector indexes
//!
//! Both indexes answer the same question, "which stored vectors have cosine
//! similarity of at least `t` to this one", and differ only in the quantity
//! they compute. For unit vectors `‖a − b‖² = 2 − 2·cos(a, b)`, so a cosine
//! threshold `t` is the squared-distance bound `2·(1 − t)`; the distance is
//! never compared against an unsquared bound.

use crate::error::{SifterError, SifterResult};
use crate::traits::{IndexMetric, VectorIndex};
use crate::types::{Embedding, RecordId};

/// Slack on threshold comparisons so that identical vectors always match at
/// `t = 1.0` despite rounding in the dot product
pub const SIMILARITY_EPSILON: f32 = 1e-6;

/// Squared-L2 bound equivalent to cosine threshold `min_similarity`
pub fn squared_l2_bound(min_similarity: f32) -> f32 {
    2.0 * (1.0 - min_similarity) + 2.0 * SIMILARITY_EPSILON
}

/// Inner product
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[derive(Debug, Default)]
struct FlatStore {
    ids: Vec<RecordId>,
    vectors: Vec<Vec<f32>>,
    dimensions: Option<usize>,
}

impl FlatStore {
    fn insert(&mut self, id: RecordId, vector: &Embedding) -> SifterResult<()> {
        self.check_dimensions(vector)?;
        self.dimensions = Some(vector.dimensions());
        self.ids.push(id);
        self.vectors.push(vector.0.clone());
        Ok(())
    }

    fn check_dimensions(&self, vector: &Embedding) -> SifterResult<()> {
        match self.dimensions {
            Some(expected) if expected != vector.dimensions() => Err(SifterError::processing(
                format!(
                    "vector has {} dimensions, index holds {}",
                    vector.dimensions(),
                    expected
                ),
            )
            .with_hint("the embedding model must produce a fixed dimension")),
            _ => Ok(()),
        }
    }

    fn scan(
        &self,
        vector: &Embedding,
        exclude: Option<RecordId>,
        matches: impl Fn(&[f32]) -> bool,
    ) -> SifterResult<Vec<RecordId>> {
        self.check_dimensions(vector)?;
        Ok(self
            .ids
            .iter()
            .zip(&self.vectors)
            .filter(|(id, _)| Some(**id) != exclude)
            .filter(|(_, stored)| matches(stored))
            .map(|(id, _)| *id)
            .collect())
    }
}

/// Exact index scoring by inner product of unit vectors
#[derive(Debug, Default)]
pub struct FlatIndex {
    store: FlatStore,
}

impl FlatIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, id: RecordId, vector: &Embedding) -> SifterResult<()> {
        self.store.insert(id, vector)
    }

    fn query_within(
        &self,
        vector: &Embedding,
        min_similarity: f32,
        exclude: Option<RecordId>,
    ) -> SifterResult<Vec<RecordId>> {
        let query = vector.as_slice();
        self.store.scan(vector, exclude, |stored| {
            dot(query, stored) >= min_similarity - SIMILARITY_EPSILON
        })
    }

    fn len(&self) -> usize {
        self.store.ids.len()
    }

    fn metric(&self) -> IndexMetric {
        IndexMetric::InnerProduct
    }
}

/// Exact index scoring by squared Euclidean distance
#[derive(Debug, Default)]
pub struct FlatL2Index {
    store: FlatStore,
}

impl FlatL2Index {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatL2Index {
    fn insert(&mut self, id: RecordId, vector: &Embedding) -> SifterResult<()> {
        self.store.insert(id, vector)
    }

    fn query_within(
        &self,
        vector: &Embedding,
        min_similarity: f32,
        exclude: Option<RecordId>,
    ) -> SifterResult<Vec<RecordId>> {
        let query = vector.as_slice();
        let bound = squared_l2_bound(min_similarity);
        self.store
            .scan(vector, exclude, |stored| squared_l2(query, stored) <= bound)
    }

    fn len(&self) -> usize {
        self.store.ids.len()
    }

    fn metric(&self) -> IndexMetric {
        IndexMetric::SquaredL2
    }
}
