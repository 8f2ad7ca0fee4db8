//! BLAKE3 fingerprints of inputs and configuration
//!
//! A checkpoint is only reused when both fingerprints match the ones stored
//! next to it.

use crate::error::{SifterError, SifterResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sifter_config::PipelineConfig;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// 32-byte BLAKE3 digest, serialized as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short prefix used in file names
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fingerprint of a file: its resolved absolute path plus its contents
pub fn input_fingerprint(path: &Path) -> SifterResult<Fingerprint> {
    let resolved = path.canonicalize().map_err(|e| {
        SifterError::validation(format!("cannot resolve input {}: {e}", path.display()))
            .with_hint("check that the input file exists")
    })?;

    let file = File::open(&resolved).map_err(|e| {
        SifterError::validation(format!("cannot open input {}: {e}", resolved.display()))
    })?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(resolved.to_string_lossy().as_bytes());
    hasher.update(&[0]);

    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buffer).map_err(|e| {
            SifterError::resource("fingerprint", format!("failed to read input: {e}"))
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

/// Fingerprint of every configuration value that changes stage outputs
pub fn config_fingerprint(config: &PipelineConfig) -> Fingerprint {
    let material = config.fingerprint_material().to_string();
    blake3::hash(material.as_bytes()).into()
}
