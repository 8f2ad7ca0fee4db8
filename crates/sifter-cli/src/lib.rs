//! Sifter CLI library
//!
//! Adapters between the pipeline's capability traits and the outside world:
//! JSON Lines files for rows, a JSON file for the audit trail and an
//! OpenAI-compatible HTTP endpoint for embeddings. `main.rs` only parses
//! arguments, sets up logging and maps errors to exit codes.

pub mod audit;
pub mod cli;
pub mod embedder;
pub mod jsonl;
pub mod run;
