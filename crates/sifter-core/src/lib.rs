//! # Sifter Core
//!
//! Building blocks of the hybrid deduplication pipeline. Everything here is
//! synchronous and free of I/O policy except the checkpoint store; the
//! orchestrator in `sifter-pipeline` sequences these pieces.
//!
//! ## Components
//!
//! - **Fingerprinting** ([`hashing`]): normalized-text content hashes and the
//!   linear exact-dedup pass, plus BLAKE3 input/config fingerprints
//! - **Chunker** ([`chunking`]): bounded, overlapping, depth-limited splitting
//! - **Resource guard** ([`guard`]): memory estimates checked before every
//!   materialization
//! - **Vector clustering** ([`clustering`]): online union-find over an
//!   injected [`VectorIndex`]
//! - **Checkpoint store** ([`checkpoint`]): fingerprint-keyed stage snapshots
//!
//! External capabilities (record sources, embedders, sinks) are described by
//! the traits in [`traits`].
//!
//! ## Example
//!
//! ```rust
//! use sifter_core::{exact_dedup, Record};
//!
//! let outcome = exact_dedup(vec![
//!     Record::new(0, "Hello World"),
//!     Record::new(1, "hello   world"),
//!     Record::new(2, "Goodbye"),
//! ]);
//!
//! assert_eq!(outcome.survivors.len(), 2);
//! assert_eq!(outcome.removed[0].event.canonical_index, Some(0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod chunking;
pub mod clustering;
pub mod error;
pub mod guard;
pub mod hashing;
pub mod io;
pub mod stats;
pub mod traits;
pub mod types;

pub use checkpoint::{
    CheckpointMetadata, CheckpointSnapshot, CheckpointStore, CHECKPOINT_FORMAT_VERSION,
};
pub use chunking::Chunker;
pub use clustering::{
    BatchOutcome, FlatIndex, FlatL2Index, SemanticClusterer, SharedClusterer, UnionFind,
};
pub use error::{
    SifterError, SifterResult, EXIT_CANCELLED, EXIT_PROCESSING, EXIT_RESOURCE, EXIT_VALIDATION,
};
pub use guard::{
    estimate_records, estimate_vectors, FixedMemoryProbe, GuardVerdict, MemoryProbe,
    ResourceGuard, SystemMemoryProbe, FALLBACK_EMBEDDING_DIM,
};
pub use hashing::{
    config_fingerprint, exact_dedup, fingerprint, input_fingerprint, normalize_text,
    ExactDedupOutcome, ExactDeduplicator, Fingerprint,
};
pub use io::{write_atomically, RetryConfig};
pub use stats::{estimate_api_savings, PipelineStats};
pub use traits::{
    AuditSink, Embedder, IndexMetric, RecordSink, RecordSource, RecordStream, SourceSizeHint,
    VecAuditSink, VecSink, VecSource, VectorIndex,
};
pub use types::{
    AuditEvent, ContentHash, DuplicateGroup, Embedding, Record, RecordId, Removal, RemovalReason,
    Stage,
};
