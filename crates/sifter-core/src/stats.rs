//! Run statistics

use crate::types::{RemovalReason, Stage};
use serde::{Deserialize, Serialize};

/// Embedding API price used for the savings estimate (USD per 1K tokens)
pub const COST_PER_1K_TOKENS_USD: f64 = 0.00013;

/// Characters per token used for the savings estimate
pub const CHARS_PER_TOKEN: f64 = 4.0;

/// Counters accumulated while a run progresses.
///
/// Written only by the orchestrator during a run; callers receive a copy once
/// the run ends. Snapshots are also stored in checkpoint metadata so resumed
/// runs report totals for the stages they skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Rows read from the source
    pub input_rows: u64,
    /// Rows left after exact deduplication
    pub after_exact_dedup_rows: u64,
    /// Rows after chunk expansion (equals the previous count without chunking)
    pub after_chunking_rows: u64,
    /// Rows left after semantic deduplication
    pub after_semantic_rows: u64,
    /// Rows written to the sink
    pub final_rows: u64,

    /// Records removed as exact duplicates
    pub exact_duplicates: u64,
    /// Records removed as semantic duplicates
    pub semantic_duplicates: u64,
    /// Records removed by validation
    pub validation_drops: u64,
    /// Records whose embedding was degenerate and skipped clustering
    pub degenerate_vectors: u64,

    /// Characters removed as exact duplicates
    pub exact_dupes_chars: u64,
    /// Characters removed as semantic duplicates
    pub semantic_dupes_chars: u64,
    /// Characters removed by validation
    pub validation_dropped_chars: u64,

    /// Stage a resumed run restarted after, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<Stage>,
}

impl PipelineStats {
    /// Account for one removed record of `chars` characters
    pub fn record_removal(&mut self, reason: RemovalReason, chars: u64) {
        match reason {
            RemovalReason::ExactDuplicate => {
                self.exact_duplicates += 1;
                self.exact_dupes_chars += chars;
            }
            RemovalReason::SemanticDuplicate => {
                self.semantic_duplicates += 1;
                self.semantic_dupes_chars += chars;
            }
            RemovalReason::Validation => {
                self.validation_drops += 1;
                self.validation_dropped_chars += chars;
            }
        }
    }

    /// Exact plus semantic duplicates
    pub fn duplicates_removed(&self) -> u64 {
        self.exact_duplicates + self.semantic_duplicates
    }

    /// Input rows that did not make it to the output
    pub fn total_dropped(&self) -> u64 {
        self.input_rows.saturating_sub(self.final_rows)
    }

    /// Characters removed across all reasons
    pub fn total_dropped_chars(&self) -> u64 {
        self.exact_dupes_chars + self.semantic_dupes_chars + self.validation_dropped_chars
    }

    /// Estimated embedding-API cost avoided, in USD rounded to cents
    pub fn estimated_api_savings(&self) -> f64 {
        estimate_api_savings(self.total_dropped_chars())
    }
}

/// `(chars / 4) / 1000 * price`, rounded to cents
pub fn estimate_api_savings(dropped_chars: u64) -> f64 {
    let tokens = dropped_chars as f64 / CHARS_PER_TOKEN;
    let cost = tokens / 1000.0 * COST_PER_1K_TOKENS_USD;
    (cost * 100.0).round() / 100.0
}
