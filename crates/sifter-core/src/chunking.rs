//! Recursive text chunker
//!
//! Text is first broken into atoms no longer than `chunk_size - overlap`
//! characters, trying separators in priority order, then atoms are merged
//! greedily into chunks. Each chunk after the first starts with the last
//! `overlap` characters of its predecessor.
//!
//! Recursion is driven by an explicit work stack and a depth counter, so
//! termination does not depend on the call stack or on the separator list:
//! once the depth bound is reached, or the separators run out, pieces are cut
//! into fixed character windows.

use crate::error::{SifterError, SifterResult};
use crate::types::Record;
use sifter_config::{ChunkingConfig, ChunkingSettings};
use tracing::debug;

/// Splits records into bounded, overlapping chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Chunker for a validated configuration
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split one text. Whitespace-only text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        split_with_config(text, &self.config)
    }

    /// Expand records into chunks.
    ///
    /// Every chunk keeps its parent's `original_index` and auxiliary columns
    /// and gets a sequence number in text order. A record that yields no
    /// chunks passes through unchanged as sequence 0.
    pub fn chunk_records(&self, records: Vec<Record>) -> Vec<Record> {
        let input = records.len();
        let mut out = Vec::with_capacity(input);

        for record in records {
            let chunks = self.split(&record.text);
            if chunks.is_empty() {
                out.push(Record {
                    id: record.id.chunk(0),
                    ..record
                });
                continue;
            }

            for (seq, text) in chunks.into_iter().enumerate() {
                out.push(Record {
                    id: record.id.chunk(seq as u32),
                    text,
                    auxiliary: record.auxiliary.clone(),
                });
            }
        }

        debug!(input, output = out.len(), "expanded records into chunks");
        out
    }
}

/// Split `text` into chunks of at most `max_size` characters sharing
/// `overlap` characters, using the default depth bound.
///
/// Fails with a validation error unless `overlap < max_size`.
pub fn split(
    text: &str,
    max_size: usize,
    overlap: usize,
    separators: &[&str],
) -> SifterResult<Vec<String>> {
    let config = ChunkingSettings::with_size(max_size)
        .overlap(overlap)
        .separators(separators.iter().copied())
        .validate()
        .map_err(SifterError::from)?;
    Ok(split_with_config(text, &config))
}

fn split_with_config(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // chunk_overlap < chunk_size holds for every validated config
    let atom_limit = config.chunk_size() - config.chunk_overlap();
    let atoms = atomize(text, atom_limit, config.separators(), config.max_depth());
    merge(atoms, config.chunk_size(), config.chunk_overlap())
}

struct Piece<'a> {
    text: &'a str,
    separator: usize,
    depth: usize,
}

/// Break `text` into contiguous pieces of at most `limit` characters.
/// Concatenating the result gives back `text`.
///
/// Only separators that actually split a piece count towards `max_depth`.
fn atomize<'a>(
    text: &'a str,
    limit: usize,
    separators: &[String],
    max_depth: usize,
) -> Vec<&'a str> {
    let mut atoms = Vec::new();
    let mut stack = vec![Piece {
        text,
        separator: 0,
        depth: 0,
    }];

    while let Some(piece) = stack.pop() {
        if piece.text.chars().count() <= limit {
            if !piece.text.is_empty() {
                atoms.push(piece.text);
            }
            continue;
        }

        let separator = separators.get(piece.separator).map(String::as_str);
        let separator = match separator {
            Some(sep) if !sep.is_empty() && piece.depth < max_depth => sep,
            _ => {
                atoms.extend(char_windows(piece.text, limit));
                continue;
            }
        };

        let parts: Vec<&str> = piece.text.split_inclusive(separator).collect();
        if parts.len() <= 1 {
            stack.push(Piece {
                separator: piece.separator + 1,
                ..piece
            });
            continue;
        }

        // Reverse so the first part is popped first
        for part in parts.into_iter().rev() {
            stack.push(Piece {
                text: part,
                separator: piece.separator + 1,
                depth: piece.depth + 1,
            });
        }
    }

    atoms
}

/// Consecutive windows of `limit` characters; the last may be shorter
fn char_windows(text: &str, limit: usize) -> Vec<&str> {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .step_by(limit)
        .chain(std::iter::once(text.len()))
        .collect();

    boundaries
        .windows(2)
        .map(|w| &text[w[0]..w[1]])
        .filter(|s| !s.is_empty())
        .collect()
}

/// Last `n` characters of `text`
fn char_suffix(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

fn merge(atoms: Vec<&str>, max_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for atom in atoms {
        let atom_len = atom.chars().count();
        if current_len == 0 || current_len + atom_len <= max_size {
            current.push_str(atom);
            current_len += atom_len;
            continue;
        }

        // current_len > max_size - atom_len >= overlap, so the tail is exactly
        // `overlap` characters long.
        let mut next = String::with_capacity(overlap * 4 + atom.len());
        next.push_str(char_suffix(&current, overlap));
        next.push_str(atom);
        chunks.push(std::mem::replace(&mut current, next));
        current_len = overlap + atom_len;
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}
