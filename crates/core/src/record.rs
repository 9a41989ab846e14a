//! Canonical records ready for persistence.

use std::collections::BTreeMap;

use crate::entity::{EntityKind, EntitySchema, ParentRef};
use crate::field::ColumnValue;

/// A validated, normalized entity record.
///
/// `columns` holds only the fields the inbound message supplied (including
/// explicit nulls) plus parent references; the primary key is kept apart
/// because it may be assigned at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub kind: EntityKind,
    pub primary_key: Option<String>,
    pub columns: BTreeMap<&'static str, ColumnValue>,
}

impl CanonicalRecord {
    pub fn new(schema: &'static EntitySchema, primary_key: Option<String>) -> Self {
        Self {
            kind: schema.kind,
            primary_key,
            columns: BTreeMap::new(),
        }
    }

    /// Schema for this record's kind.
    pub fn schema(&self) -> &'static EntitySchema {
        self.kind
            .schema()
            .unwrap_or_else(|| unreachable!("canonical record of unknown kind"))
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }

    /// Value of the secondary unique column, if supplied.
    pub fn secondary_key(&self) -> Option<&str> {
        self.schema()
            .secondary_unique
            .and_then(|column| self.get(column))
            .and_then(ColumnValue::as_text)
    }

    /// Parent references with the key each one carries (None when absent).
    pub fn parent_refs(&self) -> impl Iterator<Item = (&'static ParentRef, Option<&str>)> + '_ {
        self.schema()
            .parents
            .iter()
            .map(move |p| (p, self.get(p.column).and_then(ColumnValue::as_text)))
    }

    /// Identity used in logs, dead letters and message keys.
    pub fn entity_key(&self) -> Option<String> {
        self.primary_key
            .clone()
            .or_else(|| self.secondary_key().map(str::to_string))
    }

    /// Lock names covering every identity this record can resolve through,
    /// sorted so that concurrent holders acquire them in the same order.
    pub fn lock_keys(&self) -> Vec<String> {
        let table = self.schema().table;
        let mut keys = Vec::with_capacity(2);
        if let Some(pk) = &self.primary_key {
            keys.push(format!("{}:pk:{}", table, pk));
        }
        if let Some(secondary) = self.secondary_key() {
            keys.push(format!("{}:uq:{}", table, secondary));
        }
        keys.sort();
        keys
    }

    /// Lock names of the writable parent rows this record references. A
    /// child must not overtake its parent's insert within a batch.
    pub fn parent_lock_keys(&self) -> Vec<String> {
        self.parent_refs()
            .filter_map(|(parent, key)| {
                let schema = parent.parent.schema().filter(|s| s.writable)?;
                Some(format!("{}:pk:{}", schema.table, key?))
            })
            .collect()
    }
}
