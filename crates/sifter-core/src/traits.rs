//! Contracts for the capabilities the engine consumes but does not implement
//!
//! - [`RecordSource`]: lazy, forward-only, restartable-by-reopening rows
//! - [`Embedder`]: text to vectors, deterministic for a fixed model
//! - [`VectorIndex`]: cumulative index answering similarity-range queries
//! - [`RecordSink`] / [`AuditSink`]: final survivors and removal events
//!
//! Implementations are injected into the orchestrator as trait objects.

use crate::error::SifterResult;
use crate::hashing::Fingerprint;
use crate::types::{AuditEvent, Embedding, Record, RecordId};
use async_trait::async_trait;

/// Forward-only pass over a source
pub type RecordStream<'a> = Box<dyn Iterator<Item = SifterResult<Record>> + Send + 'a>;

/// What a source knows about its size before being read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSizeHint {
    /// Number of rows, if known
    pub rows: Option<u64>,
    /// Size of the raw input in bytes, if known
    pub total_bytes: Option<u64>,
}

/// Lazy record source.
///
/// The engine never assumes the data fits in memory or supports random
/// access; it only calls [`open`](RecordSource::open) and pulls rows in the
/// batch sizes it chooses. Each call to `open` starts a fresh pass from the
/// first row.
pub trait RecordSource: Send + Sync {
    /// Start a new pass over the rows
    fn open(&self) -> SifterResult<RecordStream<'_>>;

    /// Identity of the input (resolved location plus content hash)
    fn fingerprint(&self) -> SifterResult<Fingerprint>;

    /// Size information for memory estimates
    fn size_hint(&self) -> SourceSizeHint {
        SourceSizeHint::default()
    }

    /// Short description for logs
    fn describe(&self) -> String {
        "record source".to_string()
    }
}

/// Text embedding capability.
///
/// `embed` must return exactly one vector per input, in input order. Errors
/// are fatal to the run and never retried.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name; part of the config fingerprint
    fn model_name(&self) -> &str;

    /// Output dimension, when known before the first call
    fn dimensions(&self) -> Option<usize>;

    /// Embed a batch of texts
    async fn embed(&self, texts: &[String]) -> SifterResult<Vec<Embedding>>;
}

/// Metric a vector index reports for its neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMetric {
    /// Inner product of unit vectors (cosine similarity, higher is closer)
    InnerProduct,
    /// Squared Euclidean distance (lower is closer)
    SquaredL2,
}

/// Cumulative vector index.
///
/// Vectors handed to an index are already L2-normalized. `min_similarity` is
/// always a cosine similarity; an index that measures distance converts the
/// threshold itself (see [`IndexMetric`]).
pub trait VectorIndex: Send {
    /// Add a vector
    fn insert(&mut self, id: RecordId, vector: &Embedding) -> SifterResult<()>;

    /// Ids whose cosine similarity to `vector` is at least `min_similarity`,
    /// excluding `exclude`
    fn query_within(
        &self,
        vector: &Embedding,
        min_similarity: f32,
        exclude: Option<RecordId>,
    ) -> SifterResult<Vec<RecordId>>;

    /// Number of stored vectors
    fn len(&self) -> usize;

    /// True when nothing has been inserted
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metric the index computes internally
    fn metric(&self) -> IndexMetric;
}

/// Writer for the final survivor set. Atomicity is the sink's responsibility.
pub trait RecordSink: Send {
    /// Write every survivor
    fn write_all(&mut self, records: &[Record]) -> SifterResult<()>;
}

/// Receiver for removal events
pub trait AuditSink: Send {
    /// Persist the events of one completed run
    fn write_events(&mut self, events: &[AuditEvent]) -> SifterResult<()>;
}

/// Sink that keeps survivors in memory
#[derive(Debug, Default)]
pub struct VecSink {
    /// Records written so far
    pub records: Vec<Record>,
    /// Number of `write_all` calls
    pub writes: usize,
}

impl RecordSink for VecSink {
    fn write_all(&mut self, records: &[Record]) -> SifterResult<()> {
        self.records.extend_from_slice(records);
        self.writes += 1;
        Ok(())
    }
}

/// Audit sink that keeps events in memory
#[derive(Debug, Default)]
pub struct VecAuditSink {
    /// Events written so far
    pub events: Vec<AuditEvent>,
}

impl AuditSink for VecAuditSink {
    fn write_events(&mut self, events: &[AuditEvent]) -> SifterResult<()> {
        self.events.extend_from_slice(events);
        Ok(())
    }
}

/// Source over an in-memory list of rows.
///
/// The fingerprint is derived from the row contents, so two sources with the
/// same rows are interchangeable for checkpoint purposes.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    records: Vec<Record>,
}

impl VecSource {
    /// Wrap existing records
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Records with sequential indices from plain strings
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Record::new(i as u64, text))
            .collect();
        Self { records }
    }
}

impl RecordSource for VecSource {
    fn open(&self) -> SifterResult<RecordStream<'_>> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }

    fn fingerprint(&self) -> SifterResult<Fingerprint> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"memory:");
        for record in &self.records {
            hasher.update(&record.id.original_index.to_le_bytes());
            hasher.update(&(record.text.len() as u64).to_le_bytes());
            hasher.update(record.text.as_bytes());
        }
        Ok(Fingerprint::from(hasher.finalize()))
    }

    fn size_hint(&self) -> SourceSizeHint {
        SourceSizeHint {
            rows: Some(self.records.len() as u64),
            total_bytes: Some(self.records.iter().map(|r| r.text.len() as u64).sum()),
        }
    }

    fn describe(&self) -> String {
        format!("in-memory source ({} rows)", self.records.len())
    }
}
