//! Chunking configuration

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// Separators tried in priority order: paragraph, line, word, then
/// character-level (the empty separator).
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

fn default_chunk_overlap() -> usize {
    50
}

fn default_max_depth() -> usize {
    8
}

/// Raw chunking settings as they appear in a config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Separators in priority order (defaults to [`DEFAULT_SEPARATORS`])
    #[serde(default)]
    pub separators: Option<Vec<String>>,
    /// Number of nested separator splits before character-level splitting
    /// is forced. Separators absent from a piece do not count.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl ChunkingSettings {
    /// Settings with the given chunk size and default overlap/separators
    ///
    /// The default overlap is 50, so sizes of 50 or less fail validation
    /// unless [`overlap`](Self::overlap) is also set.
    pub fn with_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap: default_chunk_overlap(),
            separators: None,
            max_depth: default_max_depth(),
        }
    }

    /// Override the overlap
    pub fn overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Override the separator list
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = Some(separators.into_iter().map(Into::into).collect());
        self
    }

    /// Override the recursion bound
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Range-check and freeze
    pub fn validate(self) -> ConfigResult<ChunkingConfig> {
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size", "must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::invalid(
                "chunk_overlap",
                format!(
                    "overlap {} must be smaller than chunk_size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            ));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::invalid("max_depth", "must be at least 1"));
        }

        let separators = self
            .separators
            .unwrap_or_else(|| DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect());

        Ok(ChunkingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            separators,
            max_depth: self.max_depth,
        })
    }
}

/// Validated chunking configuration
///
/// Invariant: `0 <= chunk_overlap < chunk_size` and `max_depth >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
    max_depth: usize,
}

impl ChunkingConfig {
    /// Build a config with default separators and depth bound
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> ConfigResult<Self> {
        ChunkingSettings::with_size(chunk_size)
            .overlap(chunk_overlap)
            .validate()
    }

    /// Maximum chunk length in characters
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared between consecutive chunks
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Separators in priority order
    pub fn separators(&self) -> &[String] {
        &self.separators
    }

    /// Recursion bound
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
