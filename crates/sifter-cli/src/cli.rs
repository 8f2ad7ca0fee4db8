use clap::{Parser, ValueEnum};
use sifter_config::{ChunkingSettings, GuardSettings, PipelineConfigBuilder};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages (default)
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "sifter")]
#[command(about = "sifter - exact and semantic deduplication for JSONL text datasets")]
#[command(version)]
pub struct Cli {
    /// Input file (JSON Lines, one object per row)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file for surviving rows (JSON Lines)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Name of the text column (auto-detected when omitted)
    #[arg(short = 't', long)]
    pub text_column: Option<String>,

    /// Comma-separated columns every row must carry
    #[arg(long, value_delimiter = ',', value_name = "COLS")]
    pub required_columns: Vec<String>,

    /// Pipeline config file (TOML); flags override its values
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Cosine-similarity threshold for semantic duplicates, in (0, 1]
    #[arg(long)]
    pub dedup_threshold: Option<f32>,

    /// Records per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Split texts into chunks of at most this many characters before embedding
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared between consecutive chunks
    #[arg(long, requires = "chunk_size")]
    pub chunk_overlap: Option<usize>,

    /// Chunk separator in priority order (repeatable; accepts \n and \t escapes)
    #[arg(long = "separator", value_name = "SEP", requires = "chunk_size")]
    pub separators: Vec<String>,

    /// Minimum trimmed text length kept by validation (0 disables)
    #[arg(long)]
    pub min_length: Option<usize>,

    /// Embedding model name
    #[arg(long)]
    pub model_name: Option<String>,

    /// Base URL of an OpenAI-compatible embeddings API (e.g. http://localhost:11434/v1)
    #[arg(long, env = "SIFTER_EMBED_URL")]
    pub embed_url: Option<String>,

    /// API key for the embeddings endpoint
    #[arg(long, env = "SIFTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum embedding requests in flight
    #[arg(long)]
    pub embed_concurrency: Option<usize>,

    /// Skip semantic deduplication even when an embedding endpoint is configured
    #[arg(long)]
    pub no_semantic: bool,

    /// Directory for stage checkpoints
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Resume from the latest matching checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Delete checkpoints after a successful run
    #[arg(long)]
    pub cleanup_checkpoints: bool,

    /// Write removed rows and their reasons to this JSON file
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Run every stage but do not write the output file
    #[arg(long)]
    pub dry_run: bool,

    /// Treat this many megabytes as the available memory instead of asking the host
    #[arg(long)]
    pub max_memory_mb: Option<u64>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Set log level (off, error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Effective log level; `--log-level` wins over `--verbose`
    pub fn level(&self) -> LevelFilter {
        match (self.log_level, self.verbose) {
            (Some(level), _) => level.into(),
            (None, true) => LevelFilter::DEBUG,
            (None, false) => LevelFilter::INFO,
        }
    }

    /// Settings given on the command line, ready to layer over a config file.
    ///
    /// `base` supplies the guard thresholds that `--max-memory-mb` keeps.
    pub fn overrides(&self, base: &PipelineConfigBuilder) -> PipelineConfigBuilder {
        let chunking = self.chunk_size.map(|size| {
            let mut settings = ChunkingSettings::with_size(size);
            if let Some(overlap) = self.chunk_overlap {
                settings = settings.overlap(overlap);
            }
            if !self.separators.is_empty() {
                settings = settings.separators(self.separators.iter().map(|s| unescape(s)));
            }
            settings
        });

        let guard = self.max_memory_mb.map(|mb| GuardSettings {
            available_memory_bytes: Some(mb.saturating_mul(1024 * 1024)),
            ..base.guard.clone().unwrap_or_default()
        });

        PipelineConfigBuilder {
            text_column: self.text_column.clone(),
            required_columns: (!self.required_columns.is_empty()).then(|| {
                self.required_columns
                    .iter()
                    .map(|c| c.trim().to_string())
                    .collect()
            }),
            dedup_threshold: self.dedup_threshold,
            batch_size: self.batch_size,
            chunking,
            min_length: self.min_length,
            model_name: self.model_name.clone(),
            semantic: self.no_semantic.then_some(false),
            embed_concurrency: self.embed_concurrency,
            guard,
            checkpoint_dir: self.checkpoint_dir.clone(),
            resume: self.resume.then_some(true),
            cleanup_checkpoints: self.cleanup_checkpoints.then_some(true),
            dry_run: self.dry_run.then_some(true),
        }
    }
}

/// Expand `\n`, `\t` and `\\` in a separator given on the command line
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
