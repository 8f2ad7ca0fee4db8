//! Hashing
//!
//! Two unrelated hash families live here:
//!
//! - **Content hashes** ([`content`]): xxh3-64 over normalized text, used for
//!   exact-duplicate grouping. Fast, non-cryptographic, collisions accepted.
//! - **Fingerprints** ([`digest`]): BLAKE3 digests identifying an input
//!   file or a configuration, used to decide whether a checkpoint may be
//!   resumed. Equality must be exact, so these are never truncated.

pub mod content;
pub mod digest;

pub use content::{exact_dedup, fingerprint, normalize_text, ExactDedupOutcome, ExactDeduplicator};
pub use digest::{config_fingerprint, input_fingerprint, Fingerprint};
