//! Data model shared by every stage

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Vectors with an L2 norm at or below this are treated as degenerate
pub const DEGENERATE_NORM_EPSILON: f32 = 1e-8;

/// Stable identity of a record through every transformation.
///
/// Ordering is by `original_index` first, then `chunk_seq` (unchunked
/// records sort before any chunk of the same parent). The minimum identity of
/// a duplicate group is its canonical member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Position of the row in the input
    pub original_index: u64,
    /// Sequence number within the parent when the record is a chunk
    pub chunk_seq: Option<u32>,
}

impl RecordId {
    /// Identity of an unchunked input row
    pub fn new(original_index: u64) -> Self {
        Self {
            original_index,
            chunk_seq: None,
        }
    }

    /// Identity of chunk `seq` of this record
    pub fn chunk(self, seq: u32) -> Self {
        Self {
            original_index: self.original_index,
            chunk_seq: Some(seq),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chunk_seq {
            Some(seq) => write!(f, "{}#{}", self.original_index, seq),
            None => write!(f, "{}", self.original_index),
        }
    }
}

/// One input row. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identity
    pub id: RecordId,
    /// Text that is deduplicated
    pub text: String,
    /// Every other column, carried through untouched
    #[serde(default)]
    pub auxiliary: BTreeMap<String, serde_json::Value>,
}

impl Record {
    /// Record with no auxiliary columns
    pub fn new(original_index: u64, text: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(original_index),
            text: text.into(),
            auxiliary: BTreeMap::new(),
        }
    }

    /// Attach auxiliary columns
    pub fn with_auxiliary(mut self, auxiliary: BTreeMap<String, serde_json::Value>) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    /// Index of the input row this record came from
    pub fn original_index(&self) -> u64 {
        self.id.original_index
    }

    /// Text length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Rough in-memory footprint, used by the resource guard
    pub fn approx_size_bytes(&self) -> usize {
        let aux: usize = self
            .auxiliary
            .iter()
            .map(|(k, v)| k.len() + v.to_string().len())
            .sum();
        std::mem::size_of::<Self>() + self.text.len() + aux
    }
}

/// 64-bit non-cryptographic hash of normalized text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub u64);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Fixed-dimension embedding produced by the external embedder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Number of dimensions
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// L2 norm
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// True when the norm is too small (or not finite) to normalize
    pub fn is_degenerate(&self) -> bool {
        let norm = self.norm();
        !norm.is_finite() || norm <= DEGENERATE_NORM_EPSILON
    }

    /// Unit-length copy, or `None` for degenerate vectors
    pub fn normalized(&self) -> Option<Embedding> {
        if self.is_degenerate() {
            return None;
        }
        let norm = self.norm();
        Some(Embedding(self.0.iter().map(|v| v / norm).collect()))
    }

    /// Borrow the components
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Connected component of mutually similar records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Kept member (minimum identity)
    pub canonical: RecordId,
    /// All members in ascending order, canonical first
    pub members: Vec<RecordId>,
}

impl DuplicateGroup {
    /// Build a group from unordered members. Returns `None` when empty.
    pub fn from_members(mut members: Vec<RecordId>) -> Option<Self> {
        members.sort_unstable();
        members.dedup();
        let canonical = *members.first()?;
        Some(Self { canonical, members })
    }

    /// Members flagged for removal
    pub fn removed(&self) -> impl Iterator<Item = &RecordId> {
        self.members.iter().skip(1)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Groups are never empty; kept for API symmetry
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Why a record was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Same normalized text as a kept record
    ExactDuplicate,
    /// Embedding similar to a kept record
    SemanticDuplicate,
    /// Failed quality validation
    Validation,
}

impl RemovalReason {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactDuplicate => "exact_duplicate",
            Self::SemanticDuplicate => "semantic_duplicate",
            Self::Validation => "validation",
        }
    }
}

/// One audit entry per removed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Input row of the removed record
    pub original_index: u64,
    /// Chunk sequence of the removed record, if it was a chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_seq: Option<u32>,
    /// Removal reason
    pub reason: RemovalReason,
    /// Input row of the kept record this one duplicates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_index: Option<u64>,
    /// Free-form explanation
    pub detail: String,
}

impl AuditEvent {
    /// Duplicate of `canonical`
    pub fn duplicate(
        removed: RecordId,
        reason: RemovalReason,
        canonical: RecordId,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            original_index: removed.original_index,
            chunk_seq: removed.chunk_seq,
            reason,
            canonical_index: Some(canonical.original_index),
            detail: detail.into(),
        }
    }

    /// Dropped by validation
    pub fn validation(removed: RecordId, detail: impl Into<String>) -> Self {
        Self {
            original_index: removed.original_index,
            chunk_seq: removed.chunk_seq,
            reason: RemovalReason::Validation,
            canonical_index: None,
            detail: detail.into(),
        }
    }
}

/// A removed record: its audit event plus the characters it carried
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    /// Audit entry describing the removal
    pub event: AuditEvent,
    /// Text length of the removed record in characters
    pub chars: u64,
}

impl Removal {
    /// Pair an event with the removed record's length
    pub fn new(event: AuditEvent, record: &Record) -> Self {
        Self {
            event,
            chars: record.char_len() as u64,
        }
    }

    /// Removal reason
    pub fn reason(&self) -> RemovalReason {
        self.event.reason
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Hash-based exact deduplication
    ExactDedup,
    /// Recursive text chunking
    Chunking,
    /// Embedding-similarity deduplication
    SemanticDedup,
    /// Quality validation
    Validation,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 4] = [
        Stage::ExactDedup,
        Stage::Chunking,
        Stage::SemanticDedup,
        Stage::Validation,
    ];

    /// Stable name used in checkpoint files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactDedup => "exact_dedup",
            Self::Chunking => "chunking",
            Self::SemanticDedup => "semantic_dedup",
            Self::Validation => "validation",
        }
    }

    /// Parse a stage name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
