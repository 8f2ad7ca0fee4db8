//! Online semantic duplicate clustering
//!
//! Every vector is checked against the whole index built so far before it is
//! added, so duplicates that land in different batches are still linked.
//! Links feed a union-find forest; connected components are the duplicate
//! groups and the smallest [`RecordId`] in each is kept.
//!
//! The index and the forest are the only shared mutable state of the semantic
//! stage. [`SharedClusterer`] serializes access to both behind one lock so
//! that a query always sees every vector inserted before it.

pub mod index;
pub mod union_find;

pub use index::{dot, squared_l2, squared_l2_bound, FlatIndex, FlatL2Index, SIMILARITY_EPSILON};
pub use union_find::UnionFind;

use crate::error::{SifterError, SifterResult};
use crate::traits::VectorIndex;
use crate::types::{DuplicateGroup, Embedding, RecordId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts from one [`SemanticClusterer::insert_batch`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Vectors added to the index
    pub inserted: usize,
    /// Vectors skipped because their norm was degenerate
    pub degenerate: usize,
    /// Neighbor links that merged two previously separate groups
    pub merges: usize,
}

/// Incremental clusterer over an injected vector index
pub struct SemanticClusterer {
    index: Box<dyn VectorIndex>,
    sets: UnionFind,
    slots: HashMap<RecordId, usize>,
    ids: Vec<RecordId>,
    threshold: f32,
    degenerate: Vec<RecordId>,
}

impl SemanticClusterer {
    /// Clusterer linking records with cosine similarity `>= threshold`
    pub fn new(index: Box<dyn VectorIndex>, threshold: f32) -> SifterResult<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(SifterError::validation(format!(
                "similarity threshold {threshold} is outside (0, 1]"
            )));
        }
        Ok(Self {
            index,
            sets: UnionFind::default(),
            slots: HashMap::new(),
            ids: Vec::new(),
            threshold,
            degenerate: Vec::new(),
        })
    }

    /// Configured similarity threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Insert one vector. Returns `Ok(false)` if it was degenerate and skipped.
    pub fn insert(&mut self, id: RecordId, embedding: &Embedding) -> SifterResult<bool> {
        Ok(self.insert_inner(id, embedding)?.is_some())
    }

    fn insert_inner(&mut self, id: RecordId, embedding: &Embedding) -> SifterResult<Option<usize>> {
        let Some(unit) = embedding.normalized() else {
            warn!(record = %id, "degenerate embedding, excluded from clustering");
            self.degenerate.push(id);
            return Ok(None);
        };
        if self.slots.contains_key(&id) {
            return Err(SifterError::processing(format!(
                "record {id} was inserted into the vector index twice"
            )));
        }

        let neighbors = self
            .index
            .query_within(&unit, self.threshold, Some(id))?;
        self.index.insert(id, &unit)?;

        let slot = self.sets.push();
        self.slots.insert(id, slot);
        self.ids.push(id);

        let mut merges = 0;
        for neighbor in neighbors {
            // The index only returns ids inserted through this clusterer
            if let Some(&other) = self.slots.get(&neighbor) {
                if self.sets.union(slot, other) {
                    merges += 1;
                }
            }
        }
        Ok(Some(merges))
    }

    /// Insert a batch in order
    pub fn insert_batch(&mut self, batch: &[(RecordId, Embedding)]) -> SifterResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for (id, embedding) in batch {
            match self.insert_inner(*id, embedding)? {
                Some(merges) => {
                    outcome.inserted += 1;
                    outcome.merges += merges;
                }
                None => outcome.degenerate += 1,
            }
        }
        debug!(
            inserted = outcome.inserted,
            degenerate = outcome.degenerate,
            merges = outcome.merges,
            indexed = self.index.len(),
            "clustered batch"
        );
        Ok(outcome)
    }

    /// Number of clustered vectors
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when nothing has been clustered
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Records skipped for degenerate embeddings
    pub fn degenerate(&self) -> &[RecordId] {
        &self.degenerate
    }

    /// Every connected component, singletons included, ordered by canonical
    pub fn components(&self) -> Vec<DuplicateGroup> {
        let mut by_root: BTreeMap<usize, Vec<RecordId>> = BTreeMap::new();
        for (slot, id) in self.ids.iter().enumerate() {
            by_root.entry(self.sets.root(slot)).or_default().push(*id);
        }

        let mut groups: Vec<DuplicateGroup> = by_root
            .into_values()
            .filter_map(DuplicateGroup::from_members)
            .collect();
        groups.sort_by_key(|g| g.canonical);
        groups
    }

    /// Components with at least two members
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        self.components()
            .into_iter()
            .filter(|g| g.len() > 1)
            .collect()
    }

    /// `(removed, canonical)` pairs for every non-canonical member
    pub fn removals(&self) -> Vec<(RecordId, RecordId)> {
        self.duplicate_groups()
            .iter()
            .flat_map(|g| g.removed().map(move |id| (*id, g.canonical)))
            .collect()
    }
}

/// [`SemanticClusterer`] behind the single writer lock of the semantic stage
#[derive(Clone)]
pub struct SharedClusterer {
    inner: Arc<Mutex<SemanticClusterer>>,
}

impl SharedClusterer {
    /// Wrap a clusterer
    pub fn new(clusterer: SemanticClusterer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(clusterer)),
        }
    }

    /// Insert a batch while holding the lock for the whole batch
    pub fn insert_batch(&self, batch: &[(RecordId, Embedding)]) -> SifterResult<BatchOutcome> {
        self.inner.lock().insert_batch(batch)
    }

    /// Run `f` with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut SemanticClusterer) -> R) -> R {
        f(&mut *self.inner.lock())
    }
}
