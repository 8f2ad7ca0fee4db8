//! Common test utilities for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sifter_config::{PipelineConfig, PipelineConfigBuilder};
use sifter_core::{
    AuditEvent, AuditSink, Embedder, Embedding, Fingerprint, Record, RecordSource, RecordStream,
    SifterError, SifterResult, SourceSizeHint, VecSource,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DIMS: usize = 64;
pub const MODEL: &str = "all-MiniLM-L6-v2";

/// Deterministic pseudo-random unit-ish vector for `seed`
fn noise(seed: &str) -> Vec<f32> {
    let mut reader = blake3::Hasher::new().update(seed.as_bytes()).finalize_xof();
    let mut bytes = [0u8; DIMS * 4];
    reader.fill(&mut bytes);
    bytes
        .chunks_exact(4)
        .map(|c| {
            let raw = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            (raw as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

/// Embedder that maps each text to its topic (the part before `:`) plus a
/// small text-specific perturbation. Texts sharing a topic have cosine
/// similarity above 0.99; unrelated topics are nearly orthogonal.
pub struct TopicEmbedder {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    cancel_on_call: Option<(usize, CancellationToken)>,
    wrong_count: bool,
    pub batches: Mutex<Vec<usize>>,
}

impl TopicEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: None,
            cancel_on_call: None,
            wrong_count: false,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Fail with a processing error on call number `call` (1-based)
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new()
        }
    }

    /// Trigger `token` during call number `call` (1-based)
    pub fn cancelling_on(call: usize, token: CancellationToken) -> Self {
        Self {
            cancel_on_call: Some((call, token)),
            ..Self::new()
        }
    }

    /// Return one vector too few
    pub fn dropping_one() -> Self {
        Self {
            wrong_count: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embed_one(text: &str) -> Embedding {
        let topic = text.split(':').next().unwrap_or(text).trim();
        let base = noise(topic);
        let jitter = noise(text);
        Embedding(base.iter().zip(jitter).map(|(b, j)| b + 0.01 * j).collect())
    }
}

#[async_trait]
impl Embedder for TopicEmbedder {
    fn model_name(&self) -> &str {
        MODEL
    }

    fn dimensions(&self) -> Option<usize> {
        Some(DIMS)
    }

    async fn embed(&self, texts: &[String]) -> SifterResult<Vec<Embedding>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.batches.lock().push(texts.len());

        if self.fail_on_call == Some(call) {
            return Err(SifterError::processing("embedding endpoint returned 500"));
        }
        if let Some((on, token)) = &self.cancel_on_call {
            if *on == call {
                token.cancel();
            }
        }

        let mut vectors: Vec<Embedding> = texts.iter().map(|t| Self::embed_one(t)).collect();
        if self.wrong_count {
            vectors.pop();
        }
        Ok(vectors)
    }
}

/// Source that counts how often it is opened
pub struct CountingSource {
    inner: VecSource,
    opens: AtomicUsize,
    hint: Option<SourceSizeHint>,
}

impl CountingSource {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            inner: VecSource::from_texts(texts.iter().copied()),
            opens: AtomicUsize::new(0),
            hint: None,
        }
    }

    /// Report a fixed size instead of the real one
    pub fn with_size_hint(mut self, hint: SourceSizeHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl RecordSource for CountingSource {
    fn open(&self) -> SifterResult<RecordStream<'_>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open()
    }

    fn fingerprint(&self) -> SifterResult<Fingerprint> {
        self.inner.fingerprint()
    }

    fn size_hint(&self) -> SourceSizeHint {
        self.hint.unwrap_or_else(|| self.inner.size_hint())
    }
}

/// Audit sink whose every write fails
#[derive(Debug, Default)]
pub struct FailingAuditSink {
    pub attempts: usize,
}

impl AuditSink for FailingAuditSink {
    fn write_events(&mut self, _events: &[AuditEvent]) -> SifterResult<()> {
        self.attempts += 1;
        Err(SifterError::resource("audit", "disk full"))
    }
}

/// Config with small batches, short minimum length and semantic dedup on
pub fn base_config() -> PipelineConfigBuilder {
    PipelineConfig::builder()
        .dedup_threshold(0.95)
        .batch_size(2)
        .min_length(5)
        .model_name(MODEL)
}

/// Same, checkpointing into `dir`
pub fn checkpointed_config(dir: &Path) -> PipelineConfigBuilder {
    base_config().checkpoint_dir(dir)
}

/// A mix of exact duplicates, topic near-duplicates and short junk
pub fn sample_texts() -> Vec<&'static str> {
    vec![
        "alpha: the quick brown fox jumps over the lazy dog",
        "beta: rust ownership rules explained",
        "Alpha: the quick brown fox jumps over the lazy dog",
        "gamma: notes on union find",
        "alpha: a quick brown fox jumped over a lazy dog",
        "tiny",
        "beta: rust ownership rules, explained again",
        "delta: checkpoint formats",
    ]
}

pub fn embedder(e: TopicEmbedder) -> Arc<dyn Embedder> {
    Arc::new(e)
}

pub fn indices(records: &[Record]) -> Vec<u64> {
    records.iter().map(|r| r.original_index()).collect()
}
