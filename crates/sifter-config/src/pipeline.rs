//! Pipeline run configuration

use crate::{
    ChunkingConfig, ChunkingSettings, ConfigError, ConfigResult, GuardConfig, GuardSettings,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default cosine-similarity threshold for semantic duplicates
pub const DEFAULT_DEDUP_THRESHOLD: f32 = 0.95;

/// Default number of records per embedding batch
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default minimum text length kept by the validation stage
pub const DEFAULT_MIN_LENGTH: usize = 50;

/// Default embedding model name
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Unvalidated pipeline settings
///
/// Every field is optional so that a config file and command-line flags can
/// be layered on top of each other before the single call to [`build`].
///
/// [`build`]: PipelineConfigBuilder::build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfigBuilder {
    /// Name of the text column
    pub text_column: Option<String>,
    /// Columns every input row must carry
    pub required_columns: Option<Vec<String>>,
    /// Cosine-similarity threshold in (0, 1]
    pub dedup_threshold: Option<f32>,
    /// Records per batch
    pub batch_size: Option<usize>,
    /// Chunking settings; absent disables chunking
    pub chunking: Option<ChunkingSettings>,
    /// Minimum trimmed text length kept by validation (0 disables)
    pub min_length: Option<usize>,
    /// Embedding model name
    pub model_name: Option<String>,
    /// Whether semantic deduplication runs
    pub semantic: Option<bool>,
    /// Maximum embedding batches in flight
    pub embed_concurrency: Option<usize>,
    /// Memory guard thresholds
    pub guard: Option<GuardSettings>,
    /// Checkpoint directory; absent disables checkpointing
    pub checkpoint_dir: Option<PathBuf>,
    /// Resume from a matching checkpoint if one exists
    pub resume: Option<bool>,
    /// Delete checkpoints after a successful run
    pub cleanup_checkpoints: Option<bool>,
    /// Run every stage but skip writing output
    pub dry_run: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Parse settings from TOML text
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read settings from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded pipeline config file");
        Self::from_toml_str(&contents)
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win
    pub fn merge(self, overrides: PipelineConfigBuilder) -> Self {
        Self {
            text_column: overrides.text_column.or(self.text_column),
            required_columns: overrides.required_columns.or(self.required_columns),
            dedup_threshold: overrides.dedup_threshold.or(self.dedup_threshold),
            batch_size: overrides.batch_size.or(self.batch_size),
            chunking: overrides.chunking.or(self.chunking),
            min_length: overrides.min_length.or(self.min_length),
            model_name: overrides.model_name.or(self.model_name),
            semantic: overrides.semantic.or(self.semantic),
            embed_concurrency: overrides.embed_concurrency.or(self.embed_concurrency),
            guard: overrides.guard.or(self.guard),
            checkpoint_dir: overrides.checkpoint_dir.or(self.checkpoint_dir),
            resume: overrides.resume.or(self.resume),
            cleanup_checkpoints: overrides.cleanup_checkpoints.or(self.cleanup_checkpoints),
            dry_run: overrides.dry_run.or(self.dry_run),
        }
    }

    /// Set the text column
    pub fn text_column(mut self, column: impl Into<String>) -> Self {
        self.text_column = Some(column.into());
        self
    }

    /// Require `columns` to be present in the input
    pub fn required_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Set the similarity threshold
    pub fn dedup_threshold(mut self, threshold: f32) -> Self {
        self.dedup_threshold = Some(threshold);
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Enable chunking
    pub fn chunking(mut self, settings: ChunkingSettings) -> Self {
        self.chunking = Some(settings);
        self
    }

    /// Set the validation minimum length
    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    /// Set the embedding model name
    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Enable or disable semantic deduplication
    pub fn semantic(mut self, enabled: bool) -> Self {
        self.semantic = Some(enabled);
        self
    }

    /// Set the number of embedding batches allowed in flight
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.embed_concurrency = Some(concurrency);
        self
    }

    /// Set guard thresholds
    pub fn guard(mut self, guard: GuardSettings) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Enable checkpointing into `dir`
    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Request resume from checkpoints
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = Some(resume);
        self
    }

    /// Delete checkpoints after success
    pub fn cleanup_checkpoints(mut self, cleanup: bool) -> Self {
        self.cleanup_checkpoints = Some(cleanup);
        self
    }

    /// Skip the output write
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    /// Range-check every setting and produce the immutable config
    pub fn build(self) -> ConfigResult<PipelineConfig> {
        let text_column = self.text_column.unwrap_or_else(|| "text".to_string());
        if text_column.trim().is_empty() {
            return Err(ConfigError::invalid("text_column", "must not be empty"));
        }

        let required_columns = self.required_columns.unwrap_or_default();
        if required_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "required_columns",
                "column names must not be empty",
            ));
        }

        let dedup_threshold = self.dedup_threshold.unwrap_or(DEFAULT_DEDUP_THRESHOLD);
        if !(dedup_threshold > 0.0 && dedup_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "dedup_threshold",
                format!("{} is outside (0, 1]", dedup_threshold),
            ));
        }

        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be greater than 0"));
        }

        let embed_concurrency = self.embed_concurrency.unwrap_or(1);
        if embed_concurrency == 0 {
            return Err(ConfigError::invalid(
                "embed_concurrency",
                "must be greater than 0",
            ));
        }

        let model_name = self
            .model_name
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
        if model_name.trim().is_empty() {
            return Err(ConfigError::invalid("model_name", "must not be empty"));
        }

        let chunking = self.chunking.map(ChunkingSettings::validate).transpose()?;
        let guard = self.guard.unwrap_or_default().validate()?;

        Ok(PipelineConfig {
            text_column,
            required_columns,
            dedup_threshold,
            batch_size,
            chunking,
            min_length: self.min_length.unwrap_or(DEFAULT_MIN_LENGTH),
            model_name,
            semantic: self.semantic.unwrap_or(true),
            embed_concurrency,
            guard,
            checkpoint_dir: self.checkpoint_dir,
            resume: self.resume.unwrap_or(false),
            cleanup_checkpoints: self.cleanup_checkpoints.unwrap_or(false),
            dry_run: self.dry_run.unwrap_or(false),
        })
    }
}

/// Validated, immutable pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    text_column: String,
    required_columns: Vec<String>,
    dedup_threshold: f32,
    batch_size: usize,
    chunking: Option<ChunkingConfig>,
    min_length: usize,
    model_name: String,
    semantic: bool,
    embed_concurrency: usize,
    guard: GuardConfig,
    checkpoint_dir: Option<PathBuf>,
    resume: bool,
    cleanup_checkpoints: bool,
    dry_run: bool,
}

impl PipelineConfig {
    /// Start building a config
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Name of the text column
    pub fn text_column(&self) -> &str {
        &self.text_column
    }

    /// Columns every input row must carry (empty when unchecked)
    pub fn required_columns(&self) -> &[String] {
        &self.required_columns
    }

    /// Cosine-similarity threshold in (0, 1]
    pub fn dedup_threshold(&self) -> f32 {
        self.dedup_threshold
    }

    /// Records per batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Chunking settings, if chunking is enabled
    pub fn chunking(&self) -> Option<&ChunkingConfig> {
        self.chunking.as_ref()
    }

    /// Minimum trimmed text length kept by validation
    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Embedding model name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Whether semantic deduplication runs
    pub fn semantic_enabled(&self) -> bool {
        self.semantic
    }

    /// Maximum embedding batches in flight
    pub fn embed_concurrency(&self) -> usize {
        self.embed_concurrency
    }

    /// Guard thresholds
    pub fn guard(&self) -> &GuardConfig {
        &self.guard
    }

    /// Checkpoint directory, if checkpointing is enabled
    pub fn checkpoint_dir(&self) -> Option<&Path> {
        self.checkpoint_dir.as_deref()
    }

    /// Whether resume was requested
    pub fn resume(&self) -> bool {
        self.resume
    }

    /// Whether checkpoints are deleted after success
    pub fn cleanup_checkpoints(&self) -> bool {
        self.cleanup_checkpoints
    }

    /// Whether the output write is skipped
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Every parameter that affects pipeline output, as canonical JSON.
    ///
    /// Keys are sorted, so equal configs always serialize to identical bytes.
    /// Operational settings (checkpoint location, resume, dry run, guard
    /// thresholds, concurrency, required columns) are excluded: they never
    /// change the survivors.
    pub fn fingerprint_material(&self) -> serde_json::Value {
        serde_json::json!({
            "batch_size": self.batch_size,
            "chunking": self.chunking,
            "dedup_threshold": self.dedup_threshold,
            "min_length": self.min_length,
            "model_name": self.model_name,
            "semantic": self.semantic,
            "text_column": self.text_column,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.text_column(), "text");
        assert_eq!(config.dedup_threshold(), DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(config.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(config.min_length(), DEFAULT_MIN_LENGTH);
        assert_eq!(config.model_name(), DEFAULT_MODEL_NAME);
        assert!(config.semantic_enabled());
        assert!(config.chunking().is_none());
        assert!(config.checkpoint_dir().is_none());
        assert!(!config.resume());
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-0.5 ; "negative")]
    #[test_case(1.01 ; "above one")]
    #[test_case(f32::NAN ; "nan")]
    fn test_threshold_out_of_range(threshold: f32) {
        let err = PipelineConfig::builder()
            .dedup_threshold(threshold)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("dedup_threshold"));
    }

    #[test]
    fn test_threshold_of_one_is_allowed() {
        assert!(PipelineConfig::builder().dedup_threshold(1.0).build().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = PipelineConfig::builder().batch_size(0).build().unwrap_err();
        assert_eq!(err.field(), Some("batch_size"));
    }

    #[test]
    fn test_invalid_chunking_rejected_at_build() {
        let err = PipelineConfig::builder()
            .chunking(ChunkingSettings::with_size(10).overlap(10))
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("chunk_overlap"));
    }

    #[test]
    fn test_fingerprint_material_ignores_operational_settings() {
        let a = PipelineConfig::builder()
            .checkpoint_dir("/tmp/a")
            .resume(true)
            .dry_run(true)
            .build()
            .unwrap();
        let b = PipelineConfig::builder().build().unwrap();
        assert_eq!(a.fingerprint_material(), b.fingerprint_material());
    }

    #[test]
    fn test_fingerprint_material_tracks_threshold() {
        let a = PipelineConfig::builder().dedup_threshold(0.95).build().unwrap();
        let b = PipelineConfig::builder().dedup_threshold(0.90).build().unwrap();
        assert_ne!(a.fingerprint_material(), b.fingerprint_material());
    }

    #[test]
    fn test_required_columns_default_empty_and_skip_fingerprint() {
        let plain = PipelineConfig::builder().build().unwrap();
        assert!(plain.required_columns().is_empty());

        let strict = PipelineConfig::builder()
            .required_columns(["id", "text"])
            .build()
            .unwrap();
        assert_eq!(strict.required_columns(), &["id", "text"]);
        assert_eq!(plain.fingerprint_material(), strict.fingerprint_material());
    }

    #[test]
    fn test_blank_required_column_rejected() {
        let err = PipelineConfig::builder()
            .required_columns(["id", " "])
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("required_columns"));
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = PipelineConfig::builder().batch_size(10).min_length(5);
        let flags = PipelineConfig::builder().batch_size(20);
        let merged = file.merge(flags).build().unwrap();
        assert_eq!(merged.batch_size(), 20);
        assert_eq!(merged.min_length(), 5);
    }
}
