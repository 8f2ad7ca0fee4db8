//! Per-run state threaded through the orchestrator

use serde::Serialize;
use sifter_core::{AuditEvent, PipelineStats, Removal, Stage};
use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum RunState {
    /// Nothing has run yet
    Init,
    /// Inside a stage
    Running(Stage),
    /// All stages finished and output was handed to the sink
    Done,
    /// A stage failed
    Failed(Option<Stage>),
    /// Cancellation was observed
    Cancelled(Option<Stage>),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Running(stage) => write!(f, "running {stage}"),
            Self::Done => f.write_str("done"),
            Self::Failed(Some(stage)) => write!(f, "failed in {stage}"),
            Self::Failed(None) => f.write_str("failed"),
            Self::Cancelled(Some(stage)) => write!(f, "cancelled in {stage}"),
            Self::Cancelled(None) => f.write_str("cancelled"),
        }
    }
}

/// Everything one run owns: its id, state, statistics and audit trail.
///
/// Created at the start of [`DedupPipeline::run`](crate::DedupPipeline::run)
/// and consumed by [`RunContext::complete`]. If it is dropped on any other
/// path (error, cancellation, panic) the run is marked failed and the
/// buffered audit events are discarded.
pub struct RunContext {
    run_id: String,
    state: RunState,
    stats: PipelineStats,
    events: Vec<AuditEvent>,
    started: Instant,
}

impl RunContext {
    /// Fresh context
    pub fn new() -> Self {
        let run_id = format!(
            "{}-{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            std::process::id()
        );
        Self {
            run_id,
            state: RunState::Init,
            stats: PipelineStats::default(),
            events: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Run identifier used in logs and reports
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Statistics so far
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Mutable statistics
    pub fn stats_mut(&mut self) -> &mut PipelineStats {
        &mut self.stats
    }

    /// Replace the statistics, when resuming from a snapshot
    pub fn restore_stats(&mut self, stats: PipelineStats) {
        self.stats = stats;
    }

    /// Transition into `stage`
    pub fn enter(&mut self, stage: Stage) {
        debug!(run_id = %self.run_id, from = %self.state, %stage, "stage transition");
        self.state = RunState::Running(stage);
    }

    /// Stage currently running, if any
    pub fn current_stage(&self) -> Option<Stage> {
        match self.state {
            RunState::Running(stage) => Some(stage),
            _ => None,
        }
    }

    /// Account for removed records and buffer their audit events
    pub fn record_removals(&mut self, removals: Vec<Removal>) {
        self.events.reserve(removals.len());
        for removal in removals {
            self.stats.record_removal(removal.reason(), removal.chars);
            self.events.push(removal.event);
        }
    }

    /// Mark the run cancelled
    pub fn cancel(&mut self) {
        self.state = RunState::Cancelled(self.current_stage());
    }

    /// Finish successfully, releasing the statistics and audit trail
    pub fn complete(mut self) -> CompletedRun {
        self.state = RunState::Done;
        CompletedRun {
            run_id: std::mem::take(&mut self.run_id),
            stats: std::mem::take(&mut self.stats),
            events: std::mem::take(&mut self.events),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        match self.state {
            RunState::Done => {}
            RunState::Cancelled(stage) => {
                warn!(run_id = %self.run_id, ?stage, "run cancelled; last saved checkpoint kept");
            }
            RunState::Init | RunState::Running(_) | RunState::Failed(_) => {
                if let RunState::Running(stage) = self.state {
                    self.state = RunState::Failed(Some(stage));
                } else if self.state == RunState::Init {
                    self.state = RunState::Failed(None);
                }
                warn!(
                    run_id = %self.run_id,
                    state = %self.state,
                    discarded_events = self.events.len(),
                    "run did not complete"
                );
            }
        }
    }
}

/// Outputs of a completed run
#[derive(Debug)]
pub struct CompletedRun {
    /// Run identifier
    pub run_id: String,
    /// Final statistics
    pub stats: PipelineStats,
    /// Audit events of the stages that ran
    pub events: Vec<AuditEvent>,
    /// Wall-clock duration
    pub elapsed_ms: u64,
}
