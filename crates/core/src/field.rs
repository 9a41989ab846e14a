//! Tri-state field values and typed column values.

use chrono::{DateTime, NaiveTime, Utc};
use serde_json::{Map, Value};

/// A field as it appeared in the inbound record.
///
/// `Absent` leaves a stored value untouched; `Null` clears it.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Absent => Field::Absent,
            Self::Null => Field::Null,
            Self::Value(v) => Field::Value(f(v)),
        }
    }
}

impl<'a> Field<&'a Value> {
    /// Reads a raw JSON field, distinguishing a missing key from `null`.
    pub fn read(record: &'a Map<String, Value>, name: &str) -> Self {
        match record.get(name) {
            None => Self::Absent,
            Some(Value::Null) => Self::Null,
            Some(v) => Self::Value(v),
        }
    }
}

/// Storage type of a column, needed to bind typed NULLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Bool,
    Timestamp,
    Time,
}

/// A typed column value; `None` inside a variant is an explicit NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Float(Option<f64>),
    Bool(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
    Time(Option<NaiveTime>),
}

impl ColumnValue {
    pub fn null(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Text => Self::Text(None),
            ColumnType::Integer => Self::Integer(None),
            ColumnType::Float => Self::Float(None),
            ColumnType::Bool => Self::Bool(None),
            ColumnType::Timestamp => Self::Timestamp(None),
            ColumnType::Time => Self::Time(None),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Text(_) => ColumnType::Text,
            Self::Integer(_) => ColumnType::Integer,
            Self::Float(_) => ColumnType::Float,
            Self::Bool(_) => ColumnType::Bool,
            Self::Timestamp(_) => ColumnType::Timestamp,
            Self::Time(_) => ColumnType::Time,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Text(v) => v.is_none(),
            Self::Integer(v) => v.is_none(),
            Self::Float(v) => v.is_none(),
            Self::Bool(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
            Self::Time(v) => v.is_none(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => *v,
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Self::Time(v) => *v,
            _ => None,
        }
    }
}
