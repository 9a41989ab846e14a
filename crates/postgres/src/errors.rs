//! sqlx error classification.

use sqlx::Error as SqlxError;

use ingest_core::{CanonicalRecord, Error};

// SQLSTATE codes retried alongside connection failures.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Maps a sqlx error to a persistence error.
///
/// Connection, pool and unique-violation failures are transient: a unique
/// violation means another writer inserted the same key first, and a retry
/// resolves to an update.
pub fn map_sqlx(error: SqlxError) -> Error {
    match &error {
        SqlxError::Database(db_err) => {
            if db_err.is_unique_violation() {
                return Error::transient(format!("unique violation: {}", db_err.message()));
            }
            let code = db_err.code();
            if matches!(code.as_deref(), Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)) {
                return Error::transient(db_err.message().to_string());
            }
            Error::conflict(db_err.message().to_string())
        }
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) | SqlxError::Tls(_) => {
            Error::transient(error.to_string())
        }
        SqlxError::Protocol(_) | SqlxError::WorkerCrashed => Error::transient(error.to_string()),
        _ => Error::conflict(error.to_string()),
    }
}

/// Like [`map_sqlx`], but reports foreign-key violations against the parent
/// reference named by the violated constraint.
pub fn map_write_error(error: SqlxError, record: &CanonicalRecord) -> Error {
    if let SqlxError::Database(db_err) = &error {
        if db_err.is_foreign_key_violation() {
            let constraint = db_err.constraint().unwrap_or_default();
            let supplied = record.parent_refs().filter_map(|(p, key)| key.map(|k| (p, k)));
            let mut fallback = None;
            for (parent, key) in supplied {
                if constraint.contains(parent.column) {
                    return Error::referential(parent.parent, parent.wire, key);
                }
                fallback.get_or_insert((parent, key));
            }
            if let Some((parent, key)) = fallback {
                return Error::referential(parent.parent, parent.wire, key);
            }
        }
    }
    map_sqlx(error)
}
