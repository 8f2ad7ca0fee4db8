//! # Sifter Pipeline
//!
//! Orchestrates the deduplication stages over an injected record source,
//! embedder, vector index and sinks.
//!
//! ## Stages
//!
//! 1. **Exact dedup**: stream the source in batches and drop normalized-text
//!    duplicates, keeping the lowest row index
//! 2. **Chunking** (optional): split surviving records into bounded,
//!    overlapping chunks
//! 3. **Semantic dedup** (optional): embed in batches, cluster online against
//!    everything embedded so far, keep the lowest identity per cluster
//! 4. **Validation**: drop empty and too-short texts
//!
//! Each stage is preceded by a memory check and followed by a checkpoint, so
//! an interrupted run can resume after the last completed stage.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sifter_pipeline::DedupPipeline;
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = DedupPipeline::new(config).with_embedder(embedder);
//! let report = pipeline
//!     .run(&source, &mut sink, Some(&mut audit), &CancellationToken::new())
//!     .await?;
//! println!("kept {} of {}", report.stats.final_rows, report.stats.input_rows);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod orchestrator;
pub mod validation;

pub use context::{CompletedRun, RunContext, RunState};
pub use orchestrator::{DedupPipeline, IndexFactory, PipelineReport};
pub use validation::validate_records;
