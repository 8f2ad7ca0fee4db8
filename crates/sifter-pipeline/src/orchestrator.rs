//! Stage orchestration
//!
//! ```text
//! Init ─> ExactDedup ─> (Chunking) ─> (SemanticDedup) ─> Validation ─> Done
//!   └──────────┴─────────────┴──────────────┴───────────────┴──> Failed / Cancelled
//! ```
//!
//! Every stage checks the resource guard before it materializes anything,
//! runs, then saves a checkpoint of its survivors. A resumed run probes the
//! checkpoints from the last stage backward and starts right after the first
//! one that validates. The vector index is never checkpointed, so an
//! interrupted semantic stage restarts from the snapshot before it.

use crate::context::RunContext;
use crate::validation::validate_records;
use futures::stream::{FuturesOrdered, StreamExt};
use serde::Serialize;
use sifter_config::PipelineConfig;
use sifter_core::guard::{estimate_records, estimate_vectors, FALLBACK_EMBEDDING_DIM};
use sifter_core::{
    config_fingerprint, AuditEvent, AuditSink, CheckpointSnapshot, CheckpointStore, Chunker,
    Embedder, Embedding, ExactDeduplicator, Fingerprint, FlatIndex, MemoryProbe, PipelineStats,
    Record, RecordId, RecordSink, RecordSource, Removal, RemovalReason, ResourceGuard,
    SemanticClusterer, SharedClusterer, SifterError, SifterResult, SourceSizeHint, Stage,
    VectorIndex,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Builds the vector index for one semantic stage
pub type IndexFactory = Arc<dyn Fn() -> Box<dyn VectorIndex> + Send + Sync>;

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Run identifier
    pub run_id: String,
    /// Final statistics
    pub stats: PipelineStats,
    /// Stages executed by this run, excluding those restored from checkpoints
    pub stages_run: Vec<Stage>,
    /// Whether the sink write was skipped
    pub dry_run: bool,
    /// Audit events handed to the audit sink
    pub audit_events: usize,
    /// Wall-clock duration in milliseconds
    pub elapsed_ms: u64,
}

impl PipelineReport {
    /// Stage the run resumed after, if any
    pub fn resumed_from(&self) -> Option<Stage> {
        self.stats.resumed_from
    }
}

/// The deduplication pipeline.
///
/// Collaborators are injected: the embedder and vector index are external
/// capabilities, the memory probe and checkpoint store default to the host
/// and the configured directory.
pub struct DedupPipeline {
    config: Arc<PipelineConfig>,
    embedder: Option<Arc<dyn Embedder>>,
    index_factory: IndexFactory,
    guard: ResourceGuard,
    checkpoints: CheckpointStore,
}

impl DedupPipeline {
    /// Pipeline with the flat inner-product index and no embedder
    pub fn new(config: PipelineConfig) -> Self {
        let guard = ResourceGuard::from_config(config.guard());
        let checkpoints = CheckpointStore::new(config.checkpoint_dir().map(Path::to_path_buf));
        let index_factory: IndexFactory =
            Arc::new(|| -> Box<dyn VectorIndex> { Box::new(FlatIndex::new()) });

        Self {
            config: Arc::new(config),
            embedder: None,
            index_factory,
            guard,
            checkpoints,
        }
    }

    /// Use `embedder` for the semantic stage
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use a different vector index implementation
    pub fn with_index_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn VectorIndex> + Send + Sync + 'static,
    {
        self.index_factory = Arc::new(factory);
        self
    }

    /// Replace host memory introspection
    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.guard = ResourceGuard::new(self.config.guard().clone(), probe);
        self
    }

    /// Replace the checkpoint store
    pub fn with_checkpoint_store(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = store;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Checkpoint store in use
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Whether `stage` runs under the current configuration
    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::ExactDedup | Stage::Validation => true,
            Stage::Chunking => self.config.chunking().is_some(),
            Stage::SemanticDedup => self.config.semantic_enabled(),
        }
    }

    /// Run every enabled stage over `source` and hand the survivors to `sink`.
    ///
    /// Audit events go to `audit` only once the run has completed. On error
    /// or cancellation nothing is written to either sink, and checkpoints of
    /// the stages that finished stay on disk.
    pub async fn run(
        &self,
        source: &dyn RecordSource,
        sink: &mut dyn RecordSink,
        audit: Option<&mut dyn AuditSink>,
        cancel: &CancellationToken,
    ) -> SifterResult<PipelineReport> {
        let ctx = RunContext::new();
        let span = info_span!("run", run_id = %ctx.run_id());
        self.run_with_context(ctx, source, sink, audit, cancel)
            .instrument(span)
            .await
    }

    async fn run_with_context(
        &self,
        mut ctx: RunContext,
        source: &dyn RecordSource,
        sink: &mut dyn RecordSink,
        audit: Option<&mut dyn AuditSink>,
        cancel: &CancellationToken,
    ) -> SifterResult<PipelineReport> {
        let config = Arc::clone(&self.config);
        self.check_collaborators()?;

        info!(
            source = %source.describe(),
            threshold = config.dedup_threshold(),
            batch_size = config.batch_size(),
            chunking = config.chunking().is_some(),
            semantic = config.semantic_enabled(),
            dry_run = config.dry_run(),
            "starting run"
        );

        let input_fp = source.fingerprint()?;
        let config_fp = config_fingerprint(&config);

        let mut records = Vec::new();
        let mut start = 0;
        if config.resume() {
            if let Some((position, snapshot)) = self.probe_resume(input_fp, config_fp) {
                let stage = Stage::ALL[position];
                info!(%stage, rows = snapshot.records.len(), "resuming after checkpoint");
                ctx.restore_stats(snapshot.metadata.stats);
                ctx.stats_mut().resumed_from = Some(stage);
                records = snapshot.records;
                start = position + 1;
            } else {
                info!("no matching checkpoint, starting from the beginning");
            }
        }

        let mut stages_run = Vec::new();
        for &stage in &Stage::ALL[start..] {
            if !self.is_enabled(stage) {
                debug!(%stage, "stage disabled");
                set_stage_rows(ctx.stats_mut(), stage, records.len() as u64);
                continue;
            }

            ctx.enter(stage);
            check_cancelled(&mut ctx, cancel)?;

            records = match stage {
                Stage::ExactDedup => self.exact_stage(source, &mut ctx, cancel).await?,
                Stage::Chunking => self.chunking_stage(records)?,
                Stage::SemanticDedup => self.semantic_stage(records, &mut ctx, cancel).await?,
                Stage::Validation => self.validation_stage(records, &mut ctx)?,
            };
            set_stage_rows(ctx.stats_mut(), stage, records.len() as u64);

            records = self
                .save_checkpoint(stage, records, input_fp, config_fp, ctx.stats())
                .await?;
            stages_run.push(stage);
        }

        if config.dry_run() {
            info!(rows = records.len(), "dry run, output not written");
        } else {
            sink.write_all(&records)?;
            info!(rows = records.len(), "wrote output");
        }

        // The output is already in place, so a lost audit trail only warns
        let done = ctx.complete();
        if let Some(audit) = audit {
            if let Err(e) = audit.write_events(&done.events) {
                warn!(error = %e, events = done.events.len(), "failed to write audit log");
            }
        }

        if config.cleanup_checkpoints() {
            if let Err(e) = self.checkpoints.cleanup(false) {
                warn!(error = %e, "failed to clean up checkpoints");
            }
        }

        let stats = done.stats;
        info!(
            input_rows = stats.input_rows,
            final_rows = stats.final_rows,
            exact_duplicates = stats.exact_duplicates,
            semantic_duplicates = stats.semantic_duplicates,
            validation_drops = stats.validation_drops,
            elapsed_ms = done.elapsed_ms,
            "run complete"
        );

        Ok(PipelineReport {
            run_id: done.run_id,
            stats,
            stages_run,
            dry_run: config.dry_run(),
            audit_events: done.events.len(),
            elapsed_ms: done.elapsed_ms,
        })
    }

    /// Snapshot `records` off the async runtime; the store's write retries
    /// sleep the calling thread.
    async fn save_checkpoint(
        &self,
        stage: Stage,
        records: Vec<Record>,
        input_fp: Fingerprint,
        config_fp: Fingerprint,
        stats: &PipelineStats,
    ) -> SifterResult<Vec<Record>> {
        if !self.checkpoints.is_enabled() {
            return Ok(records);
        }

        let store = self.checkpoints.clone();
        let stats = stats.clone();
        tokio::task::spawn_blocking(move || -> SifterResult<Vec<Record>> {
            store.save(stage, &records, input_fp, config_fp, &stats)?;
            Ok(records)
        })
        .await
        .map_err(|e| SifterError::processing_with_source("checkpoint task failed", e))?
    }

    fn check_collaborators(&self) -> SifterResult<()> {
        match &self.embedder {
            None if self.config.semantic_enabled() => Err(SifterError::validation(
                "semantic deduplication is enabled but no embedder is configured",
            )
            .with_hint("configure an embedding endpoint or disable semantic deduplication")),
            Some(embedder) if embedder.model_name() != self.config.model_name() => {
                warn!(
                    configured = self.config.model_name(),
                    embedder = embedder.model_name(),
                    "embedder model differs from configured model name"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Position in [`Stage::ALL`] and snapshot of the latest valid checkpoint
    fn probe_resume(
        &self,
        input_fp: Fingerprint,
        config_fp: Fingerprint,
    ) -> Option<(usize, CheckpointSnapshot)> {
        Stage::ALL
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, stage)| self.is_enabled(**stage))
            .find_map(|(position, stage)| {
                self.checkpoints
                    .load_snapshot(*stage, input_fp, config_fp)
                    .map(|snapshot| (position, snapshot))
            })
    }

    async fn exact_stage(
        &self,
        source: &dyn RecordSource,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> SifterResult<Vec<Record>> {
        match source_estimate(source.size_hint()) {
            Some(estimate) => {
                self.guard.check(Stage::ExactDedup, estimate)?;
            }
            None => debug!("source size unknown, skipping memory check"),
        }

        let batch_size = self.config.batch_size();
        let mut stream = source.open()?;
        let mut dedup = ExactDeduplicator::new();

        loop {
            let batch = stream
                .by_ref()
                .take(batch_size)
                .collect::<SifterResult<Vec<Record>>>()?;
            let full = batch.len() == batch_size;
            let rows = batch.len();
            dedup.observe_all(batch);
            debug!(rows, seen = dedup.seen(), "hashed batch");

            if !full {
                break;
            }
            check_cancelled(ctx, cancel)?;
            tokio::task::yield_now().await;
        }

        let input_rows = dedup.seen() as u64;
        if input_rows == 0 {
            return Err(SifterError::validation("Input dataset is empty")
                .with_hint("check the input file and the text column"));
        }

        let outcome = dedup.finish();
        ctx.stats_mut().input_rows = input_rows;
        let removed = outcome.removed.len();
        ctx.record_removals(outcome.removed);

        info!(
            input_rows,
            kept = outcome.survivors.len(),
            removed,
            "exact deduplication complete"
        );
        Ok(outcome.survivors)
    }

    fn chunking_stage(&self, records: Vec<Record>) -> SifterResult<Vec<Record>> {
        let Some(chunking) = self.config.chunking() else {
            return Ok(records);
        };

        // chunk_overlap < chunk_size is a config invariant
        let step = chunking.chunk_size() - chunking.chunk_overlap();
        let expected_chunks: u64 = records
            .iter()
            .map(|r| (r.char_len() / step + 1) as u64)
            .sum();
        self.guard.check(
            Stage::Chunking,
            estimate_records(expected_chunks, chunking.chunk_size() as u64),
        )?;

        let parents = records.len();
        let chunks = Chunker::new(chunking.clone()).chunk_records(records);
        info!(parents, chunks = chunks.len(), "chunking complete");
        Ok(chunks)
    }

    async fn semantic_stage(
        &self,
        records: Vec<Record>,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> SifterResult<Vec<Record>> {
        let Some(embedder) = &self.embedder else {
            return Ok(records);
        };

        let threshold = self.config.dedup_threshold();
        let expected_dims = embedder.dimensions();
        let estimate_dims = expected_dims.unwrap_or(FALLBACK_EMBEDDING_DIM);
        let concurrency = self.config.embed_concurrency();
        let clusterer = SharedClusterer::new(SemanticClusterer::new(
            (self.index_factory)(),
            threshold,
        )?);

        let batches: Vec<&[Record]> = records.chunks(self.config.batch_size()).collect();
        let mut pending = FuturesOrdered::new();
        let mut next_batch = 0;
        let mut reserved_rows = 0u64;

        loop {
            while pending.len() < concurrency && next_batch < batches.len() {
                check_cancelled(ctx, cancel)?;

                let batch = batches[next_batch];
                reserved_rows += batch.len() as u64;
                self.guard.check(
                    Stage::SemanticDedup,
                    estimate_vectors(reserved_rows, estimate_dims),
                )?;

                let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
                let embedder = Arc::clone(embedder);
                let index = next_batch;
                pending.push_back(async move { (index, embedder.embed(&texts).await) });
                next_batch += 1;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    ctx.cancel();
                    return Err(SifterError::cancelled(Stage::SemanticDedup.as_str()));
                }
                next = pending.next() => next,
            };
            let Some((index, result)) = next else {
                break;
            };

            let batch = batches[index];
            let vectors = result?;
            let pairs = pair_vectors(batch, vectors, expected_dims)?;
            clusterer.insert_batch(&pairs)?;
            debug!(batch = index, of = batches.len(), rows = batch.len(), "embedded batch");
        }

        let (removals, degenerate) =
            clusterer.with(|c| (c.removals(), c.degenerate().len() as u64));
        let canonical_of: HashMap<RecordId, RecordId> = removals.into_iter().collect();

        let mut survivors = Vec::with_capacity(records.len() - canonical_of.len());
        let mut removed = Vec::with_capacity(canonical_of.len());
        for record in records {
            match canonical_of.get(&record.id) {
                Some(canonical) => {
                    let event = AuditEvent::duplicate(
                        record.id,
                        RemovalReason::SemanticDuplicate,
                        *canonical,
                        format!("cosine similarity >= {threshold} with row {canonical}"),
                    );
                    removed.push(Removal::new(event, &record));
                }
                None => survivors.push(record),
            }
        }

        if degenerate > 0 {
            warn!(degenerate, "records with degenerate embeddings kept without clustering");
        }
        ctx.stats_mut().degenerate_vectors += degenerate;
        let removed_count = removed.len();
        ctx.record_removals(removed);

        info!(
            kept = survivors.len(),
            removed = removed_count,
            degenerate,
            "semantic deduplication complete"
        );
        Ok(survivors)
    }

    fn validation_stage(
        &self,
        records: Vec<Record>,
        ctx: &mut RunContext,
    ) -> SifterResult<Vec<Record>> {
        self.guard
            .check(Stage::Validation, estimate_records(records.len() as u64, 0))?;

        let (survivors, removed) = validate_records(records, self.config.min_length());
        let dropped = removed.len();
        ctx.record_removals(removed);

        info!(kept = survivors.len(), dropped, "validation complete");
        Ok(survivors)
    }
}

fn check_cancelled(ctx: &mut RunContext, cancel: &CancellationToken) -> SifterResult<()> {
    if !cancel.is_cancelled() {
        return Ok(());
    }
    let stage = ctx
        .current_stage()
        .map(|s| s.as_str())
        .unwrap_or("init");
    ctx.cancel();
    Err(SifterError::cancelled(stage))
}

fn set_stage_rows(stats: &mut PipelineStats, stage: Stage, rows: u64) {
    match stage {
        Stage::ExactDedup => stats.after_exact_dedup_rows = rows,
        Stage::Chunking => stats.after_chunking_rows = rows,
        Stage::SemanticDedup => stats.after_semantic_rows = rows,
        Stage::Validation => stats.final_rows = rows,
    }
}

/// Memory needed to materialize a source, when its size is known
fn source_estimate(hint: SourceSizeHint) -> Option<u64> {
    match (hint.rows, hint.total_bytes) {
        (Some(rows), Some(bytes)) => Some(estimate_records(rows, bytes / rows.max(1))),
        (Some(rows), None) => Some(estimate_records(rows, 0)),
        (None, Some(bytes)) => Some(bytes),
        (None, None) => None,
    }
}

fn pair_vectors(
    batch: &[Record],
    vectors: Vec<Embedding>,
    expected_dims: Option<usize>,
) -> SifterResult<Vec<(RecordId, Embedding)>> {
    if vectors.len() != batch.len() {
        return Err(SifterError::processing(format!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            batch.len()
        )));
    }
    if let Some(expected) = expected_dims {
        if let Some(bad) = vectors.iter().find(|v| v.dimensions() != expected) {
            return Err(SifterError::processing(format!(
                "embedder returned a {}-dimensional vector, expected {expected}",
                bad.dimensions()
            ))
            .with_hint("check that the embedding model matches the configured model name"));
        }
    }
    Ok(batch.iter().map(|r| r.id).zip(vectors).collect())
}
