//! Memory guard consulted before every materialization
//!
//! Estimates are deliberately coarse: they only need to catch requests that
//! are off by a large factor (a 500 MB table on a 100 MB host) before the
//! allocation happens.

use crate::error::{SifterError, SifterResult};
use crate::types::{Record, Stage};
use sifter_config::GuardConfig;
use std::sync::Arc;
use sysinfo::System;
use tracing::{debug, warn};

/// Embedding dimension assumed when the embedder does not report one
pub const FALLBACK_EMBEDDING_DIM: usize = 384;

/// Bookkeeping bytes per materialized record on top of its payload
pub const RECORD_OVERHEAD_BYTES: u64 = std::mem::size_of::<Record>() as u64 + 64;

/// Bytes needed to hold `rows` records averaging `avg_row_bytes` each
pub fn estimate_records(rows: u64, avg_row_bytes: u64) -> u64 {
    rows.saturating_mul(avg_row_bytes.saturating_add(RECORD_OVERHEAD_BYTES))
}

/// Bytes needed to hold `count` vectors of `dimensions` `f32`s
pub fn estimate_vectors(count: u64, dimensions: usize) -> u64 {
    count
        .saturating_mul(dimensions as u64)
        .saturating_mul(std::mem::size_of::<f32>() as u64)
}

/// Outcome of a guard check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardVerdict {
    /// Estimate is within the warning threshold
    Ok,
    /// Estimate exceeds the warning threshold; proceed anyway
    Warn {
        /// Estimate as a fraction of available memory
        ratio: f64,
    },
    /// Estimate exceeds the failure threshold
    Fail {
        /// Estimate as a fraction of available memory
        ratio: f64,
    },
    /// Available memory is unknown; proceed without a check
    Unchecked,
}

/// Classify `estimated_bytes` against `available_bytes`
pub fn check(
    estimated_bytes: u64,
    available_bytes: Option<u64>,
    config: &GuardConfig,
) -> GuardVerdict {
    let available = match available_bytes {
        Some(bytes) if bytes > 0 => bytes,
        _ => return GuardVerdict::Unchecked,
    };

    let ratio = estimated_bytes as f64 / available as f64;
    if ratio > config.fail_ratio() {
        GuardVerdict::Fail { ratio }
    } else if ratio > config.warn_ratio() {
        GuardVerdict::Warn { ratio }
    } else {
        GuardVerdict::Ok
    }
}

/// Source of the available-memory figure
pub trait MemoryProbe: Send + Sync {
    /// Bytes currently available, or `None` when the host cannot tell
    fn available_bytes(&self) -> Option<u64>;
}

/// Host introspection through `sysinfo`
#[derive(Debug, Default)]
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        let mut system = System::new();
        system.refresh_memory();
        match system.available_memory() {
            0 => None,
            bytes => Some(bytes),
        }
    }
}

/// Fixed ceiling, used for `--max-memory-mb` and in tests
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryProbe(pub Option<u64>);

impl FixedMemoryProbe {
    /// Ceiling given in mebibytes
    pub fn megabytes(mb: u64) -> Self {
        Self(Some(mb.saturating_mul(1024 * 1024)))
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        self.0
    }
}

/// Guard bound to a probe and thresholds
#[derive(Clone)]
pub struct ResourceGuard {
    config: GuardConfig,
    probe: Arc<dyn MemoryProbe>,
}

impl ResourceGuard {
    /// Guard with an explicit probe
    pub fn new(config: GuardConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self { config, probe }
    }

    /// Guard using the configured ceiling, or host introspection without one
    pub fn from_config(config: &GuardConfig) -> Self {
        let probe: Arc<dyn MemoryProbe> = match config.available_memory_bytes() {
            Some(bytes) => Arc::new(FixedMemoryProbe(Some(bytes))),
            None => Arc::new(SystemMemoryProbe),
        };
        Self::new(config.clone(), probe)
    }

    /// Check a pending allocation for `stage`.
    ///
    /// Returns a resource error when the estimate exceeds the failure
    /// threshold; logs a warning above the warning threshold.
    pub fn check(&self, stage: Stage, estimated_bytes: u64) -> SifterResult<GuardVerdict> {
        let available = self.probe.available_bytes();
        let verdict = check(estimated_bytes, available, &self.config);

        match verdict {
            GuardVerdict::Ok => {
                debug!(%stage, estimated_bytes, ?available, "memory check passed");
            }
            GuardVerdict::Unchecked => {
                debug!(%stage, estimated_bytes, "available memory unknown, skipping check");
            }
            GuardVerdict::Warn { ratio } => {
                warn!(
                    %stage,
                    estimated_mb = estimated_bytes / (1024 * 1024),
                    ratio = %format!("{:.0}%", ratio * 100.0),
                    "memory usage is high"
                );
            }
            GuardVerdict::Fail { ratio } => {
                return Err(SifterError::resource(
                    stage.as_str(),
                    format!(
                        "estimated {} MB needed, {:.0}% of {} MB available",
                        estimated_bytes / (1024 * 1024),
                        ratio * 100.0,
                        available.unwrap_or_default() / (1024 * 1024),
                    ),
                )
                .with_hint(hint_for(stage)));
            }
        }

        Ok(verdict)
    }
}

fn hint_for(stage: Stage) -> &'static str {
    match stage {
        Stage::SemanticDedup => "reduce --batch-size or --chunk-size, or free up memory",
        Stage::Chunking => "reduce --chunk-size or process the input in smaller files",
        _ => "process the input in smaller files or free up memory",
    }
}
