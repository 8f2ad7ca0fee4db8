//! Shared helpers for CLI integration tests

#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `sifter` binary with no ambient embedding endpoint
pub fn sifter() -> Command {
    let mut cmd = Command::cargo_bin("sifter").unwrap();
    cmd.env_remove("SIFTER_EMBED_URL")
        .env_remove("SIFTER_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

/// Temp workspace with an input file
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write one JSON object per line
    pub fn write_rows(&self, name: &str, rows: &[Value]) -> PathBuf {
        let path = self.path(name);
        let body: String = rows.iter().map(|r| format!("{r}\n")).collect();
        fs::write(&path, body).unwrap();
        path
    }
}

/// Rows with exact duplicates and one short text
pub fn sample_rows() -> Vec<Value> {
    let long = "The quarterly report shows steady growth across every region we track.";
    vec![
        json!({"id": 0, "text": long}),
        json!({"id": 1, "text": long.to_uppercase()}),
        json!({"id": 2, "text": "tiny"}),
        json!({
            "id": 3,
            "text": "Customer churn fell for the third month in a row, driven by retention."
        }),
        json!({"id": 4, "text": format!("  {long}  ")}),
    ]
}

pub fn read_output(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}
