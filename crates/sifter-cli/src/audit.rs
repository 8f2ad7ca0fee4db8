//! JSON audit log

use sifter_core::{write_atomically, AuditEvent, AuditSink, RetryConfig, SifterResult};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Writes every removal of a completed run as one pretty-printed JSON array
#[derive(Debug)]
pub struct JsonAuditSink {
    path: PathBuf,
    retry: RetryConfig,
}

impl JsonAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry: RetryConfig::default(),
        }
    }
}

impl AuditSink for JsonAuditSink {
    fn write_events(&mut self, events: &[AuditEvent]) -> SifterResult<()> {
        write_atomically(&self.path, "audit", &self.retry, |out: &mut dyn Write| {
            serde_json::to_writer_pretty(&mut *out, events)?;
            out.write_all(b"\n")
        })?;
        info!(path = %self.path.display(), events = events.len(), "wrote audit log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifter_core::{RecordId, RemovalReason};

    #[test]
    fn test_writes_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.json");
        let events = vec![
            AuditEvent::duplicate(
                RecordId::new(1),
                RemovalReason::ExactDuplicate,
                RecordId::new(0),
                "exact duplicate of row 0",
            ),
            AuditEvent::validation(RecordId::new(5), "too_short len=3 (min_length=50)"),
        ];

        JsonAuditSink::new(&path).write_events(&events).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let rows = written.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["reason"], "exact_duplicate");
        assert_eq!(rows[1]["original_index"], 5);
    }

    #[test]
    fn test_empty_run_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        JsonAuditSink::new(&path).write_events(&[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
    }
}
