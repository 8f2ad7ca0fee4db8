//! Stage snapshots for resumable runs
//!
//! Each completed stage is stored as two files in the checkpoint directory:
//!
//! - `<stage>-<digest>.bin`: the surviving records as a columnar table,
//!   encoded with bincode
//! - `<stage>.meta.json`: stage name, input and config fingerprints, row
//!   count, creation time, BLAKE3 digest of the table file and the run
//!   statistics at save time
//!
//! The table is written before the metadata and both writes are atomic, so a
//! crash at any point leaves the previous snapshot of the stage readable.
//! Loading is all-or-nothing: any mismatch or corruption is logged and
//! reported as "no checkpoint", never as an error.

use crate::error::{SifterError, SifterResult};
use crate::hashing::Fingerprint;
use crate::io::{write_atomically, RetryConfig};
use crate::stats::PipelineStats;
use crate::types::{Record, RecordId, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Version of the on-disk snapshot layout
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

const META_SUFFIX: &str = ".meta.json";
const DATA_SUFFIX: &str = ".bin";

/// Metadata stored next to every snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Layout version
    pub format_version: u32,
    /// Stage the snapshot was taken after
    pub stage: Stage,
    /// Fingerprint of the input
    pub input_fingerprint: Fingerprint,
    /// Fingerprint of the output-affecting configuration
    pub config_fingerprint: Fingerprint,
    /// Records in the table
    pub row_count: u64,
    /// Save time
    pub created_at: DateTime<Utc>,
    /// Table file name, relative to the checkpoint directory
    pub data_file: String,
    /// BLAKE3 digest of the table file
    pub data_blake3: Fingerprint,
    /// Run statistics when the snapshot was taken
    #[serde(default)]
    pub stats: PipelineStats,
}

/// A validated snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSnapshot {
    /// Snapshot metadata
    pub metadata: CheckpointMetadata,
    /// Surviving records after the stage
    pub records: Vec<Record>,
}

/// Columnar table; auxiliary columns are stored as JSON text per row
#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointTable {
    original_index: Vec<u64>,
    chunk_seq: Vec<Option<u32>>,
    text: Vec<String>,
    auxiliary: Vec<String>,
}

impl CheckpointTable {
    fn from_records(records: &[Record]) -> SifterResult<Self> {
        let mut table = Self {
            original_index: Vec::with_capacity(records.len()),
            chunk_seq: Vec::with_capacity(records.len()),
            text: Vec::with_capacity(records.len()),
            auxiliary: Vec::with_capacity(records.len()),
        };
        for record in records {
            table.original_index.push(record.id.original_index);
            table.chunk_seq.push(record.id.chunk_seq);
            table.text.push(record.text.clone());
            let aux = serde_json::to_string(&record.auxiliary).map_err(|e| {
                SifterError::processing_with_source("failed to encode auxiliary columns", e)
            })?;
            table.auxiliary.push(aux);
        }
        Ok(table)
    }

    fn into_records(self) -> Result<Vec<Record>, String> {
        let rows = self.original_index.len();
        if self.chunk_seq.len() != rows || self.text.len() != rows || self.auxiliary.len() != rows {
            return Err("column lengths differ".to_string());
        }

        self.original_index
            .into_iter()
            .zip(self.chunk_seq)
            .zip(self.text)
            .zip(self.auxiliary)
            .map(|(((original_index, chunk_seq), text), aux)| {
                let auxiliary: BTreeMap<String, serde_json::Value> =
                    serde_json::from_str(&aux).map_err(|e| format!("bad auxiliary row: {e}"))?;
                Ok(Record {
                    id: RecordId {
                        original_index,
                        chunk_seq,
                    },
                    text,
                    auxiliary,
                })
            })
            .collect()
    }
}

/// Snapshot store rooted at a directory; disabled without one
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: Option<PathBuf>,
    retry: RetryConfig,
}

impl CheckpointStore {
    /// Store rooted at `dir`, or a no-op store for `None`
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            retry: RetryConfig::default(),
        }
    }

    /// Store that never saves and never finds anything
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Override the retry policy for writes
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Whether snapshots are persisted
    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Checkpoint directory, if enabled
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Persist the records surviving `stage`.
    ///
    /// Returns the written metadata, or `None` when the store is disabled.
    /// Write failures are resource errors; the previous snapshot of the stage
    /// stays intact.
    pub fn save(
        &self,
        stage: Stage,
        records: &[Record],
        input_fp: Fingerprint,
        config_fp: Fingerprint,
        stats: &PipelineStats,
    ) -> SifterResult<Option<CheckpointMetadata>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };

        let table = CheckpointTable::from_records(records)?;
        let bytes = bincode::serde::encode_to_vec(&table, bincode::config::standard())
            .map_err(|e| SifterError::processing_with_source("failed to encode checkpoint", e))?;
        let digest = Fingerprint::from(blake3::hash(&bytes));
        let data_file = format!("{}-{}{}", stage, digest.short(), DATA_SUFFIX);

        write_atomically(&dir.join(&data_file), stage.as_str(), &self.retry, |w| {
            w.write_all(&bytes)
        })?;

        let metadata = CheckpointMetadata {
            format_version: CHECKPOINT_FORMAT_VERSION,
            stage,
            input_fingerprint: input_fp,
            config_fingerprint: config_fp,
            row_count: records.len() as u64,
            created_at: Utc::now(),
            data_file: data_file.clone(),
            data_blake3: digest,
            stats: stats.clone(),
        };
        let meta_json = serde_json::to_vec_pretty(&metadata).map_err(|e| {
            SifterError::processing_with_source("failed to encode checkpoint metadata", e)
        })?;
        write_atomically(&meta_path(dir, stage), stage.as_str(), &self.retry, |w| {
            w.write_all(&meta_json)
        })?;

        self.remove_stale_tables(dir, stage, &data_file);
        info!(%stage, rows = records.len(), file = %data_file, "saved checkpoint");
        Ok(Some(metadata))
    }

    /// Records saved after `stage`, if a snapshot exists and both
    /// fingerprints match exactly
    pub fn load(
        &self,
        stage: Stage,
        input_fp: Fingerprint,
        config_fp: Fingerprint,
    ) -> Option<Vec<Record>> {
        self.load_snapshot(stage, input_fp, config_fp)
            .map(|snapshot| snapshot.records)
    }

    /// Like [`load`](Self::load), keeping the metadata
    pub fn load_snapshot(
        &self,
        stage: Stage,
        input_fp: Fingerprint,
        config_fp: Fingerprint,
    ) -> Option<CheckpointSnapshot> {
        let dir = self.dir.as_deref()?;
        match read_snapshot(dir, stage, input_fp, config_fp) {
            Ok(Some(snapshot)) => {
                info!(%stage, rows = snapshot.records.len(), "loaded checkpoint");
                Some(snapshot)
            }
            Ok(None) => {
                debug!(%stage, "no checkpoint");
                None
            }
            Err(reason) => {
                warn!(%stage, %reason, "discarding checkpoint");
                None
            }
        }
    }

    /// Metadata of every readable snapshot, oldest first
    pub fn list(&self) -> Vec<CheckpointMetadata> {
        let Some(dir) = self.dir.as_deref() else {
            return Vec::new();
        };

        let mut found: Vec<CheckpointMetadata> = Stage::ALL
            .into_iter()
            .filter_map(|stage| match read_metadata(dir, stage) {
                Ok(meta) => meta,
                Err(reason) => {
                    warn!(%stage, %reason, "unreadable checkpoint metadata");
                    None
                }
            })
            .collect();
        found.sort_by_key(|m| (m.created_at, m.stage));
        found
    }

    /// Most recently written snapshot
    pub fn find_latest(&self) -> Option<CheckpointMetadata> {
        self.list().pop()
    }

    /// Delete snapshots, keeping only the most recent one if `keep_latest`.
    ///
    /// Returns the number of files removed.
    pub fn cleanup(&self, keep_latest: bool) -> SifterResult<usize> {
        let Some(dir) = self.dir.as_deref() else {
            return Ok(0);
        };

        let keep = if keep_latest { self.find_latest() } else { None };
        let keep_files: Vec<String> = match &keep {
            Some(meta) => vec![meta_file_name(meta.stage), meta.data_file.clone()],
            None => Vec::new(),
        };

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(SifterError::resource(
                    "checkpoint",
                    format!("cannot list {}: {e}", dir.display()),
                ))
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_checkpoint_file(&name) || keep_files.contains(&name) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %name, error = %e, "failed to remove checkpoint file"),
            }
        }

        info!(removed, keep_latest, "cleaned up checkpoints");
        Ok(removed)
    }

    fn remove_stale_tables(&self, dir: &Path, stage: Stage, current: &str) {
        let prefix = format!("{stage}-");
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(DATA_SUFFIX) && name != current {
                if let Err(e) = fs::remove_file(entry.path()) {
                    debug!(file = %name, error = %e, "failed to remove stale checkpoint table");
                }
            }
        }
    }
}

fn meta_file_name(stage: Stage) -> String {
    format!("{stage}{META_SUFFIX}")
}

fn meta_path(dir: &Path, stage: Stage) -> PathBuf {
    dir.join(meta_file_name(stage))
}

fn is_checkpoint_file(name: &str) -> bool {
    Stage::ALL.into_iter().any(|stage| {
        name == meta_file_name(stage)
            || (name.starts_with(&format!("{stage}-")) && name.ends_with(DATA_SUFFIX))
    })
}

fn read_metadata(dir: &Path, stage: Stage) -> Result<Option<CheckpointMetadata>, String> {
    let path = meta_path(dir, stage);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(format!("cannot read {}: {e}", path.display())),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| format!("malformed metadata: {e}"))
}

fn read_snapshot(
    dir: &Path,
    stage: Stage,
    input_fp: Fingerprint,
    config_fp: Fingerprint,
) -> Result<Option<CheckpointSnapshot>, String> {
    let Some(metadata) = read_metadata(dir, stage)? else {
        return Ok(None);
    };

    if metadata.format_version != CHECKPOINT_FORMAT_VERSION {
        return Err(format!("format version {} is not supported", metadata.format_version));
    }
    if metadata.stage != stage {
        return Err(format!("metadata is for stage {}", metadata.stage));
    }
    if metadata.input_fingerprint != input_fp {
        return Err("input fingerprint differs".to_string());
    }
    if metadata.config_fingerprint != config_fp {
        return Err("config fingerprint differs".to_string());
    }

    let data_path = dir.join(&metadata.data_file);
    let bytes =
        fs::read(&data_path).map_err(|e| format!("cannot read {}: {e}", data_path.display()))?;
    if Fingerprint::from(blake3::hash(&bytes)) != metadata.data_blake3 {
        return Err("table digest differs".to_string());
    }

    let (table, _): (CheckpointTable, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| format!("cannot decode table: {e}"))?;
    let records = table.into_records()?;
    if records.len() as u64 != metadata.row_count {
        return Err(format!(
            "row count {} differs from metadata {}",
            records.len(),
            metadata.row_count
        ));
    }

    Ok(Some(CheckpointSnapshot { metadata, records }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fp(seed: &str) -> Fingerprint {
        blake3::hash(seed.as_bytes()).into()
    }

    fn sample() -> Vec<Record> {
        let mut aux = BTreeMap::new();
        aux.insert("lang".to_string(), json!("en"));
        aux.insert("score".to_string(), json!(0.5));
        vec![
            Record::new(0, "first").with_auxiliary(aux),
            Record {
                id: RecordId::new(3).chunk(1),
                text: "second chunk".to_string(),
                auxiliary: BTreeMap::new(),
            },
        ]
    }

    fn store() -> (tempfile::TempDir, CheckpointStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(Some(dir.path().to_path_buf()));
        (dir, store)
    }

    #[test]
    fn test_round_trip() {
        let (_dir, store) = store();
        let stats = PipelineStats {
            input_rows: 4,
            ..Default::default()
        };
        store
            .save(Stage::ExactDedup, &sample(), fp("in"), fp("cfg"), &stats)
            .unwrap();

        let snapshot = store
            .load_snapshot(Stage::ExactDedup, fp("in"), fp("cfg"))
            .unwrap();
        assert_eq!(snapshot.records, sample());
        assert_eq!(snapshot.metadata.row_count, 2);
        assert_eq!(snapshot.metadata.stats.input_rows, 4);
    }

    #[test]
    fn test_fingerprint_mismatch_is_absent() {
        let (_dir, store) = store();
        store
            .save(Stage::Chunking, &sample(), fp("in"), fp("cfg"), &PipelineStats::default())
            .unwrap();

        assert!(store.load(Stage::Chunking, fp("in"), fp("other")).is_none());
        assert!(store.load(Stage::Chunking, fp("other"), fp("cfg")).is_none());
        assert!(store.load(Stage::ExactDedup, fp("in"), fp("cfg")).is_none());
    }

    #[test]
    fn test_corrupt_table_is_absent() {
        let (dir, store) = store();
        let meta = store
            .save(Stage::ExactDedup, &sample(), fp("in"), fp("cfg"), &PipelineStats::default())
            .unwrap()
            .unwrap();
        fs::write(dir.path().join(&meta.data_file), b"garbage").unwrap();

        assert!(store.load(Stage::ExactDedup, fp("in"), fp("cfg")).is_none());
    }

    #[test]
    fn test_malformed_metadata_is_absent() {
        let (dir, store) = store();
        fs::write(dir.path().join("exact_dedup.meta.json"), b"{not json").unwrap();
        assert!(store.load(Stage::ExactDedup, fp("in"), fp("cfg")).is_none());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_resave_replaces_table() {
        let (dir, store) = store();
        let first = store
            .save(Stage::ExactDedup, &sample(), fp("in"), fp("cfg"), &PipelineStats::default())
            .unwrap()
            .unwrap();
        let second = store
            .save(Stage::ExactDedup, &sample()[..1], fp("in"), fp("cfg"), &PipelineStats::default())
            .unwrap()
            .unwrap();

        assert_ne!(first.data_file, second.data_file);
        assert!(!dir.path().join(&first.data_file).exists());
        assert_eq!(store.load(Stage::ExactDedup, fp("in"), fp("cfg")).unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_store_is_noop() {
        let store = CheckpointStore::disabled();
        assert!(!store.is_enabled());
        let saved = store
            .save(Stage::ExactDedup, &sample(), fp("in"), fp("cfg"), &PipelineStats::default())
            .unwrap();
        assert!(saved.is_none());
        assert!(store.load(Stage::ExactDedup, fp("in"), fp("cfg")).is_none());
        assert!(store.list().is_empty());
        assert_eq!(store.cleanup(false).unwrap(), 0);
    }

    #[test]
    fn test_list_find_latest_and_cleanup() {
        let (dir, store) = store();
        let stats = PipelineStats::default();
        store
            .save(Stage::ExactDedup, &sample(), fp("in"), fp("cfg"), &stats)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store
            .save(Stage::SemanticDedup, &sample()[..1], fp("in"), fp("cfg"), &stats)
            .unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"keep me").unwrap();

        let listed: Vec<_> = store.list().into_iter().map(|m| m.stage).collect();
        assert_eq!(listed, vec![Stage::ExactDedup, Stage::SemanticDedup]);
        assert_eq!(store.find_latest().unwrap().stage, Stage::SemanticDedup);

        assert_eq!(store.cleanup(true).unwrap(), 2);
        assert!(store.load(Stage::ExactDedup, fp("in"), fp("cfg")).is_none());
        assert!(store.load(Stage::SemanticDedup, fp("in"), fp("cfg")).is_some());

        assert_eq!(store.cleanup(false).unwrap(), 2);
        assert!(store.list().is_empty());
        assert!(dir.path().join("unrelated.txt").exists());
    }
}
