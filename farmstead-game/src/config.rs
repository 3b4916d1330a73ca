//! Process manager configuration.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::process::ProcessType;

/// How the tick accumulator resolves two writers of an overwrite-style field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The process visited later in the tick wins; the conflict is still reported.
    #[default]
    LastWriteWins,
    /// The first writer of the tick is authoritative; later writes are dropped.
    FirstWriterWins,
}

/// Errors raised when manager configuration invariants are violated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_concurrent for {process_type} must be at least 1")]
    ZeroConcurrency { process_type: ProcessType },
    #[error("event_log_capacity must be at least 1")]
    ZeroEventLogCapacity,
    #[error("config parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Per-type overrides of the handler's default `max_concurrent`.
    #[serde(default)]
    pub concurrency: BTreeMap<ProcessType, usize>,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default = "ManagerConfig::default_event_log_capacity")]
    pub event_log_capacity: usize,
}

impl ManagerConfig {
    const fn default_event_log_capacity() -> usize {
        512
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and the matching
    /// variant for any invariant violation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any field violates the documented bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((&process_type, _)) = self.concurrency.iter().find(|(_, max)| **max == 0) {
            return Err(ConfigError::ZeroConcurrency { process_type });
        }
        if self.event_log_capacity == 0 {
            return Err(ConfigError::ZeroEventLogCapacity);
        }
        Ok(())
    }

    #[must_use]
    pub fn with_concurrency(mut self, process_type: ProcessType, max: usize) -> Self {
        self.concurrency.insert(process_type, max);
        self
    }

    #[must_use]
    pub const fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            concurrency: BTreeMap::new(),
            conflict_policy: ConflictPolicy::default(),
            event_log_capacity: Self::default_event_log_capacity(),
        }
    }
}
