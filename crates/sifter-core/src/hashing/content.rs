//! Content hashing and exact deduplication

use crate::types::{AuditEvent, ContentHash, Record, RecordId, Removal, RemovalReason};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Lowercase and collapse every whitespace run to a single space.
///
/// Leading and trailing whitespace is dropped. The result is only ever used
/// as hash input.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut normalized = String::with_capacity(lowered.len());
    for word in lowered.split_whitespace() {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(word);
    }
    normalized
}

/// Content hash of `text` after normalization. Pure and deterministic.
pub fn fingerprint(text: &str) -> ContentHash {
    ContentHash(xxh3_64(normalize_text(text).as_bytes()))
}

/// Survivors and removals of an exact-dedup pass
#[derive(Debug, Clone, Default)]
pub struct ExactDedupOutcome {
    /// Kept records, in order of first appearance of their hash
    pub survivors: Vec<Record>,
    /// Removed records with back-references to the kept record
    pub removed: Vec<Removal>,
}

struct Displaced {
    id: RecordId,
    chars: u64,
    hash: ContentHash,
}

/// Incremental exact deduplicator.
///
/// Records can be fed in any order and in any number of batches; the record
/// with the smallest identity wins each hash group. Memory is one map entry
/// per distinct hash plus the survivors themselves.
#[derive(Default)]
pub struct ExactDeduplicator {
    kept: HashMap<ContentHash, usize>,
    survivors: Vec<Record>,
    displaced: Vec<Displaced>,
}

impl ExactDeduplicator {
    /// Empty deduplicator
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one record
    pub fn observe(&mut self, record: Record) {
        let hash = fingerprint(&record.text);
        match self.kept.entry(hash) {
            Entry::Vacant(slot) => {
                slot.insert(self.survivors.len());
                self.survivors.push(record);
            }
            Entry::Occupied(slot) => {
                let position = *slot.get();
                let loser = if record.id < self.survivors[position].id {
                    std::mem::replace(&mut self.survivors[position], record)
                } else {
                    record
                };
                self.displaced.push(Displaced {
                    id: loser.id,
                    chars: loser.char_len() as u64,
                    hash,
                });
            }
        }
    }

    /// Feed a batch of records
    pub fn observe_all(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.observe(record);
        }
    }

    /// Records seen so far
    pub fn seen(&self) -> usize {
        self.survivors.len() + self.displaced.len()
    }

    /// Resolve back-references and return the outcome
    pub fn finish(self) -> ExactDedupOutcome {
        let Self {
            kept,
            survivors,
            displaced,
        } = self;

        let removed = displaced
            .into_iter()
            .map(|d| {
                // Every displaced hash has a kept entry; the winner is whoever
                // holds the slot now, not whoever held it at displacement time.
                let canonical = survivors[kept[&d.hash]].id;
                Removal {
                    event: AuditEvent::duplicate(
                        d.id,
                        RemovalReason::ExactDuplicate,
                        canonical,
                        format!("exact duplicate of row {} (hash {})", canonical, d.hash),
                    ),
                    chars: d.chars,
                }
            })
            .collect();

        ExactDedupOutcome { survivors, removed }
    }
}

/// Single-pass exact deduplication of `records`
pub fn exact_dedup(records: impl IntoIterator<Item = Record>) -> ExactDedupOutcome {
    let mut dedup = ExactDeduplicator::new();
    dedup.observe_all(records);
    dedup.finish()
}
