//! Common test utilities for core tests.

#![allow(dead_code)]

use sifter_core::{Embedding, Fingerprint, Record, RecordId};
use std::collections::BTreeMap;

/// Fingerprint derived from a label
pub fn fp(label: &str) -> Fingerprint {
    blake3::hash(label.as_bytes()).into()
}

/// Records `0..n` with the given texts
pub fn records(texts: &[&str]) -> Vec<Record> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Record::new(i as u64, *t))
        .collect()
}

/// Record with one auxiliary string column
pub fn record_with_aux(
    index: u64,
    chunk: Option<u32>,
    text: &str,
    key: &str,
    value: &str,
) -> Record {
    let mut aux = BTreeMap::new();
    aux.insert(key.to_string(), serde_json::Value::String(value.to_string()));
    Record {
        id: RecordId {
            original_index: index,
            chunk_seq: chunk,
        },
        text: text.to_string(),
        auxiliary: aux,
    }
}

/// 2-D unit vector at `degrees` from the x axis
pub fn at_angle(degrees: f32) -> Embedding {
    let r = degrees.to_radians();
    Embedding(vec![r.cos(), r.sin()])
}
