//! # Sifter Configuration
//!
//! Run configuration for the sifter deduplication pipeline.
//!
//! A [`PipelineConfig`] is built exactly once per run, either through
//! [`PipelineConfig::builder`] or from a TOML file via
//! [`PipelineConfigBuilder::from_toml_file`], and every range check happens
//! inside [`PipelineConfigBuilder::build`]. Downstream crates never see an
//! unchecked value.
//!
//! ## Quick Start
//!
//! ```rust
//! use sifter_config::{ChunkingSettings, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .text_column("body")
//!     .dedup_threshold(0.9)
//!     .batch_size(512)
//!     .chunking(ChunkingSettings::with_size(400))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.batch_size(), 512);
//! assert_eq!(config.chunking().unwrap().chunk_size(), 400);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chunking;
mod error;
mod guard;
mod pipeline;

pub use chunking::{ChunkingConfig, ChunkingSettings, DEFAULT_SEPARATORS};
pub use error::{ConfigError, ConfigResult};
pub use guard::{GuardConfig, GuardSettings};
pub use pipeline::{PipelineConfig, PipelineConfigBuilder};
