//! Upsert resolution policy shared by every store implementation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::CanonicalRecord;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Primary key of the stored row
    pub id: String,
    pub action: UpsertAction,
}

/// Which row an upsert will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Row found by primary key.
    UpdateByPrimaryKey(String),
    /// Row found by the secondary unique column; keeps its own key.
    UpdateBySecondary(String),
    /// No row found; insert under this key.
    Insert(String),
}

impl Resolution {
    pub fn id(&self) -> &str {
        match self {
            Self::UpdateByPrimaryKey(id) | Self::UpdateBySecondary(id) | Self::Insert(id) => id,
        }
    }

    pub fn action(&self) -> UpsertAction {
        match self {
            Self::Insert(_) => UpsertAction::Created,
            _ => UpsertAction::Updated,
        }
    }

    pub fn into_outcome(self) -> UpsertOutcome {
        let action = self.action();
        let id = match self {
            Self::UpdateByPrimaryKey(id) | Self::UpdateBySecondary(id) | Self::Insert(id) => id,
        };
        UpsertOutcome { id, action }
    }
}

/// Resolves an upsert given the rows found by each lookup.
///
/// `by_primary_key` is the key of the row matching the record's primary
/// key, `by_secondary` the key of the row matching its secondary unique
/// value. Primary key wins, then secondary, then insert (generating a key
/// when the record carries none).
pub fn resolve(
    record: &CanonicalRecord,
    by_primary_key: Option<String>,
    by_secondary: Option<String>,
) -> Result<Resolution> {
    match (by_primary_key, by_secondary) {
        (Some(pk_row), Some(secondary_row)) if pk_row != secondary_row => {
            Err(Error::conflict(format!(
                "{} `{}` conflicts with row `{}` holding {} `{}`",
                record.kind,
                pk_row,
                secondary_row,
                record.schema().secondary_unique.unwrap_or("secondary key"),
                record.secondary_key().unwrap_or_default()
            )))
        }
        (Some(pk_row), _) => Ok(Resolution::UpdateByPrimaryKey(pk_row)),
        (None, Some(secondary_row)) => Ok(Resolution::UpdateBySecondary(secondary_row)),
        (None, None) => {
            let id = record
                .primary_key
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            Ok(Resolution::Insert(id))
        }
    }
}

/// Parent references that must be present before a row can be inserted.
///
/// Returns the first missing reference's wire name.
pub fn missing_insert_reference(record: &CanonicalRecord) -> Option<&'static str> {
    record
        .parent_refs()
        .find(|(_, key)| key.is_none())
        .map(|(parent, _)| parent.wire)
}
