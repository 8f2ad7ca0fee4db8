//! Atomic file writes with bounded retry
//!
//! Files are written to a temporary file in the destination directory and
//! renamed over the target, so readers see either the old or the new
//! contents. Transient I/O failures are retried with exponential backoff; no
//! other error is ever retried.

use crate::error::{SifterError, SifterResult};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Retry configuration for transient I/O errors
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let millis = self.base_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Whether an I/O error is worth retrying
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

/// Retry `operation` on transient I/O errors
pub fn retry_io<T>(
    config: &RetryConfig,
    mut operation: impl FnMut() -> io::Result<T>,
) -> io::Result<T> {
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt < config.max_attempts => {
                let delay = config.delay_after(attempt);
                warn!(attempt, ?delay, error = %err, "transient I/O error, retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Atomically replace `path` with whatever `write` produces.
///
/// Failures are resource errors attributed to `stage`.
pub fn write_atomically<F>(
    path: &Path,
    stage: &str,
    retry: &RetryConfig,
    mut write: F,
) -> SifterResult<()>
where
    F: FnMut(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let result = retry_io(retry, || {
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write(&mut writer)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    });

    match result {
        Ok(()) => {
            debug!(path = %path.display(), "wrote file atomically");
            Ok(())
        }
        Err(err) => Err(SifterError::resource(
            stage,
            format!("failed to write {}: {err}", path.display()),
        )
        .with_hint("check free disk space and write permissions")),
    }
}
