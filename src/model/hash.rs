//! Content hashing
//!
//! The canonical serialization is one `name=value` line per content field, in
//! `FieldName::ALL` order. Provenance (URL, timestamps, raw snapshot) never
//! enters it.

use crate::model::field::FieldName;
use crate::model::record::BookContent;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest of a canonical serialization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps a digest loaded from storage
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn canonical_serialization(content: &BookContent) -> String {
    let mut out = String::new();
    for field in FieldName::ALL {
        out.push_str(field.as_str());
        out.push('=');
        out.push_str(&content.value(field).canonical());
        out.push('\n');
    }
    out
}

pub fn content_hash(content: &BookContent) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(canonical_serialization(content).as_bytes());
    ContentHash(hex::encode(hasher.finalize()))
}
