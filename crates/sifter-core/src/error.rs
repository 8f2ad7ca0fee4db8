//! Error taxonomy for the deduplication engine
//!
//! Three failure classes reach the caller, each with a stable process exit
//! code, plus cancellation:
//!
//! | variant      | raised by                                   | exit code |
//! |--------------|---------------------------------------------|-----------|
//! | `Validation` | empty input, missing columns, bad config    | 2         |
//! | `Resource`   | memory guard, failed output/checkpoint I/O  | 3         |
//! | `Processing` | embedder or vector index failures           | 1         |
//! | `Cancelled`  | cooperative cancellation between batches    | 130       |
//!
//! Checkpoint *load* failures never surface here; the store logs them and
//! reports "no checkpoint".

use sifter_config::ConfigError;
use thiserror::Error;

/// Exit code for processing failures (and any unclassified error)
pub const EXIT_PROCESSING: u8 = 1;

/// Exit code for validation failures
pub const EXIT_VALIDATION: u8 = 2;

/// Exit code for resource failures
pub const EXIT_RESOURCE: u8 = 3;

/// Reserved exit code for a cancelled run
pub const EXIT_CANCELLED: u8 = 130;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum SifterError {
    /// Bad or missing schema, empty input, invalid configuration
    #[error("{message}")]
    Validation {
        /// What is wrong
        message: String,
        /// How to fix it
        hint: Option<String>,
    },

    /// Insufficient memory or disk, or a failed write
    #[error("{stage}: {message}")]
    Resource {
        /// Stage that hit the limit
        stage: String,
        /// What ran out
        message: String,
        /// Suggested remedy
        hint: Option<String>,
    },

    /// Embedder or vector index failure
    #[error("{message}")]
    Processing {
        /// What failed
        message: String,
        /// How to fix it
        hint: Option<String>,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// The run was cancelled between batches
    #[error("run cancelled during {stage}")]
    Cancelled {
        /// Stage that observed the cancellation
        stage: String,
    },
}

/// Result alias for engine operations
pub type SifterResult<T> = Result<T, SifterError>;

impl SifterError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            hint: None,
        }
    }

    /// Create a resource error for `stage`
    pub fn resource(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resource {
            stage: stage.into(),
            message: message.into(),
            hint: None,
        }
    }

    /// Create a processing error
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
            hint: None,
            source: None,
        }
    }

    /// Create a processing error wrapping an underlying cause
    pub fn processing_with_source(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Processing {
            message: message.into(),
            hint: None,
            source: Some(source.into()),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Attach a remedial hint (ignored for cancellation)
    pub fn with_hint(mut self, new_hint: impl Into<String>) -> Self {
        match &mut self {
            Self::Validation { hint, .. }
            | Self::Resource { hint, .. }
            | Self::Processing { hint, .. } => *hint = Some(new_hint.into()),
            Self::Cancelled { .. } => {}
        }
        self
    }

    /// Remedial hint, if any
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Validation { hint, .. }
            | Self::Resource { hint, .. }
            | Self::Processing { hint, .. } => hint.as_deref(),
            Self::Cancelled { .. } => None,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation { .. } => EXIT_VALIDATION,
            Self::Resource { .. } => EXIT_RESOURCE,
            Self::Processing { .. } => EXIT_PROCESSING,
            Self::Cancelled { .. } => EXIT_CANCELLED,
        }
    }

    /// Error category for logs and reports
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Resource { .. } => "resource",
            Self::Processing { .. } => "processing",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether this is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<ConfigError> for SifterError {
    fn from(err: ConfigError) -> Self {
        let hint = err
            .field()
            .map(|field| format!("check the `{field}` setting"));
        Self::Validation {
            message: format!("invalid configuration: {err}"),
            hint,
        }
    }
}
