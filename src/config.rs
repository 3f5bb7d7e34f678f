//! Writer configuration and pass-through I/O hints.
//!
//! [`IoHints`] plays the role of an `MPI_Info` object: an ordered bag of
//! string key/value pairs handed to the collective I/O layer unchanged.
//! [`WriterConfig`] carries the tunables of the writer itself.

use crate::vlsv_error::VlsvError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Largest byte count moved by a single collective transfer call.
///
/// Collective transfers count elements with a C `int`, so one call can never
/// move more than `i32::MAX` bytes.
pub const DEFAULT_MAX_BYTES_PER_WRITE: u64 = i32::MAX as u64;

/// Opaque implementation hints for the collective I/O layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IoHints(BTreeMap<String, String>);

impl IoHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a hint.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Tunables for a [`Writer`](crate::writer::Writer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Rank that owns the footer index and the global offset.
    pub coordinator: usize,
    /// Per-call ceiling for collective transfers (bytes).
    pub max_bytes_per_write: u64,
    /// Hints forwarded to the file layer.
    pub hints: IoHints,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            coordinator: 0,
            max_bytes_per_write: DEFAULT_MAX_BYTES_PER_WRITE,
            hints: IoHints::default(),
        }
    }
}

impl WriterConfig {
    pub fn with_coordinator(mut self, rank: usize) -> Self {
        self.coordinator = rank;
        self
    }

    /// Lower the per-call transfer ceiling; mostly useful to exercise
    /// batching with small arrays.
    pub fn with_max_bytes_per_write(mut self, bytes: u64) -> Self {
        self.max_bytes_per_write = bytes;
        self
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.set(key, value);
        self
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, VlsvError> {
        let cfg: WriterConfig =
            serde_json::from_str(json).map_err(|e| VlsvError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), VlsvError> {
        if self.max_bytes_per_write == 0 {
            return Err(VlsvError::Config(
                "max_bytes_per_write must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = WriterConfig::default();
        assert_eq!(cfg.coordinator, 0);
        assert_eq!(cfg.max_bytes_per_write, 2_147_483_647);
        assert!(cfg.hints.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn json_with_partial_fields() {
        let cfg = WriterConfig::from_json_str(
            r#"{ "coordinator": 2, "hints": { "cb_buffer_size": "16777216" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.coordinator, 2);
        assert_eq!(cfg.max_bytes_per_write, DEFAULT_MAX_BYTES_PER_WRITE);
        assert_eq!(cfg.hints.get("cb_buffer_size"), Some("16777216"));
    }

    #[test]
    fn zero_ceiling_rejected() {
        let err = WriterConfig::from_json_str(r#"{ "max_bytes_per_write": 0 }"#).unwrap_err();
        assert!(matches!(err, VlsvError::Config(_)));
    }

    #[test]
    fn builder_chains() {
        let cfg = WriterConfig::default()
            .with_coordinator(1)
            .with_max_bytes_per_write(64)
            .with_hint("striping_factor", "4");
        assert_eq!(cfg.coordinator, 1);
        assert_eq!(cfg.max_bytes_per_write, 64);
        assert_eq!(cfg.hints.iter().count(), 1);
    }
}
