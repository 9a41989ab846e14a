//! Unified error types for the ingestion pipeline.
//!
//! Failure codes recorded with dead letters:
//! - INGEST_001: Unclassified schema
//! - INGEST_002: Validation error
//! - INGEST_003: Referential error
//! - INGEST_004: Persistence error

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::EntityKind;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification attached to every dead-lettered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// INGEST_001: No entity kind matched the record
    Unclassified,
    /// INGEST_002: Field coercion, enum or required-field failure
    ValidationError,
    /// INGEST_003: Referenced parent entity does not exist
    ReferentialError,
    /// INGEST_004: Store unavailable, timed out or rejected the write
    PersistenceError,
}

impl FailureKind {
    pub const ALL: [FailureKind; 4] = [
        Self::Unclassified,
        Self::ValidationError,
        Self::ReferentialError,
        Self::PersistenceError,
    ];

    /// Get the failure code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unclassified => "INGEST_001",
            Self::ValidationError => "INGEST_002",
            Self::ReferentialError => "INGEST_003",
            Self::PersistenceError => "INGEST_004",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclassified => "Unclassified",
            Self::ValidationError => "ValidationError",
            Self::ReferentialError => "ReferentialError",
            Self::PersistenceError => "PersistenceError",
        }
    }

    /// Parses either the name or the code.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s) || k.code().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the ingestion pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unclassified schema: {0}")]
    UnclassifiedSchema(String),

    #[error("validation error on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("referential error: {entity} `{key}` referenced by `{field}` does not exist")]
    Referential {
        entity: EntityKind,
        field: String,
        key: String,
    },

    #[error("persistence error: {message}")]
    Persistence { message: String, transient: bool },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn unclassified(msg: impl Into<String>) -> Self {
        Self::UnclassifiedSchema(msg.into())
    }

    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    pub fn referential(entity: EntityKind, field: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Referential {
            entity,
            field: field.into(),
            key: key.into(),
        }
    }

    /// Store failure that may succeed on retry (timeout, pool exhaustion, unique race).
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Persistence {
            message: msg.into(),
            transient: true,
        }
    }

    /// Store failure that retrying cannot fix.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Persistence {
            message: msg.into(),
            transient: false,
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Dead-letter classification, if this error terminates a message.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::UnclassifiedSchema(_) => Some(FailureKind::Unclassified),
            Self::Validation { .. } => Some(FailureKind::ValidationError),
            Self::Referential { .. } => Some(FailureKind::ReferentialError),
            Self::Persistence { .. } | Self::Internal(_) => Some(FailureKind::PersistenceError),
            Self::Serialization(_) => Some(FailureKind::Unclassified),
            Self::Transport(_) | Self::Config(_) => None,
        }
    }

    /// Whether a retry may change the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence { transient: true, .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
