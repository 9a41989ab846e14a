//! Field transformation into canonical records.
//!
//! Pure: takes a classified JSON record and returns a typed
//! [`CanonicalRecord`] or a validation error naming the offending field.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use validator::ValidateEmail;

use crate::classify::is_truthy;
use crate::entity::{CodeFormat, EntityKind, FieldSpec, FieldType, FLEXIBLE_SHIFT};
use crate::error::{Error, Result};
use crate::field::{ColumnValue, Field};
use crate::limits::{MAX_ID_LEN, MAX_RECORD_FIELDS};
use crate::record::CanonicalRecord;

static IFSC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").expect("valid IFSC pattern"));

static PAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("valid PAN pattern"));

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

// Attendance columns used by the flexible-hours derivation.
const SHIFT_TYPE: &str = "shift_type";
const SHIFT_START: &str = "shift_start_time";
const SHIFT_END: &str = "shift_end_time";
const FLEXIBLE_HOURS: &str = "flexible_hours";

/// Transforms a classified record into its canonical form.
pub fn transform(kind: EntityKind, record: &Map<String, Value>) -> Result<CanonicalRecord> {
    let schema = kind
        .schema()
        .ok_or_else(|| Error::unclassified("record matches no known entity"))?;

    if !schema.writable {
        return Err(Error::validation(
            schema.primary_key.wire,
            format!("{} is a lookup entity and is not written by ingestion", kind),
        ));
    }

    if record.len() > MAX_RECORD_FIELDS {
        return Err(Error::validation(
            "record",
            format!("{} fields exceeds {} limit", record.len(), MAX_RECORD_FIELDS),
        ));
    }

    let pk_wire = schema.primary_key.wire;
    let primary_key = match Field::read(record, pk_wire) {
        _ if schema.assigns_key && is_unset_key(record.get(pk_wire)) => None,
        Field::Value(v) => Some(normalize_id(pk_wire, v)?),
        Field::Absent | Field::Null => {
            return Err(Error::validation(pk_wire, "primary key is required"));
        }
    };

    let mut canonical = CanonicalRecord::new(schema, primary_key);

    for parent in schema.parents {
        match Field::read(record, parent.wire) {
            Field::Absent => {}
            Field::Null => {
                return Err(Error::validation(
                    parent.wire,
                    format!("reference to {} cannot be cleared", parent.parent),
                ));
            }
            Field::Value(v) => {
                let key = normalize_id(parent.wire, v)?;
                canonical
                    .columns
                    .insert(parent.column, ColumnValue::Text(Some(key)));
            }
        }
    }

    for spec in schema.fields {
        let value = match Field::read(record, spec.wire) {
            Field::Absent => continue,
            Field::Null => ColumnValue::null(spec.ty.column_type()),
            Field::Value(v) => coerce(spec, v)?,
        };
        canonical.columns.insert(spec.column, value);
    }

    if kind == EntityKind::AttendanceSettings {
        derive_flexible_hours(&mut canonical);
    }

    Ok(canonical)
}

/// Whether a store-assigned key was left for the store to generate. A zero
/// id means unset whether it arrives as a number or as text.
fn is_unset_key(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s.trim().is_empty() || s.trim() == "0",
        other => !is_truthy(other),
    }
}

/// Normalizes an identifier to trimmed text.
pub fn normalize_id(field: &str, value: &Value) -> Result<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(u), _) => u.to_string(),
            (None, Some(f)) if f > 0.0 && f.fract() == 0.0 && f < 9.0e15 => format!("{}", f as u64),
            _ => return Err(Error::validation(field, "identifier must be a positive integer")),
        },
        _ => return Err(Error::validation(field, "identifier must be a string or number")),
    };

    if id.is_empty() || id == "0" {
        return Err(Error::validation(field, "identifier is empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(Error::validation(
            field,
            format!("identifier exceeds {} characters", MAX_ID_LEN),
        ));
    }
    Ok(id)
}

fn coerce(spec: &FieldSpec, value: &Value) -> Result<ColumnValue> {
    let field = spec.wire;

    // Empty strings clear the field, whatever its type.
    if value.as_str().is_some_and(|s| s.trim().is_empty()) {
        return Ok(ColumnValue::null(spec.ty.column_type()));
    }

    match spec.ty {
        FieldType::Text { max_len } => {
            let text = text_value(field, value)?;
            if text.chars().count() > max_len {
                return Err(Error::validation(
                    field,
                    format!("exceeds {} characters", max_len),
                ));
            }
            Ok(ColumnValue::Text(Some(text)))
        }
        FieldType::Email => {
            let email = text_value(field, value)?.to_lowercase();
            if !email.validate_email() {
                return Err(Error::validation(field, format!("`{}` is not a valid email", email)));
            }
            Ok(ColumnValue::Text(Some(email)))
        }
        FieldType::Code(format) => {
            let code: String = text_value(field, value)?
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase();
            let pattern = match format {
                CodeFormat::Ifsc => &*IFSC,
                CodeFormat::Pan => &*PAN,
            };
            if !pattern.is_match(&code) {
                return Err(Error::validation(field, format!("`{}` is not a valid {:?} code", code, format)));
            }
            Ok(ColumnValue::Text(Some(code)))
        }
        FieldType::Enum(allowed) => {
            let raw = value
                .as_str()
                .ok_or_else(|| Error::validation(field, "expected a string"))?;
            let normalized = normalize_enum(raw);
            if !allowed.contains(&normalized.as_str()) {
                return Err(Error::validation(
                    field,
                    format!("`{}` is not one of [{}]", raw, allowed.join(", ")),
                ));
            }
            Ok(ColumnValue::Text(Some(normalized)))
        }
        FieldType::Integer { min, max } => {
            let n = integer_value(field, value)?;
            if n < min || n > max {
                return Err(Error::validation(
                    field,
                    format!("{} is outside {}..={}", n, min, max),
                ));
            }
            Ok(ColumnValue::Integer(Some(n)))
        }
        FieldType::Decimal { min } => {
            let n = decimal_value(field, value)?;
            if n < min {
                return Err(Error::validation(field, format!("{} is below {}", n, min)));
            }
            Ok(ColumnValue::Float(Some(n)))
        }
        FieldType::Bool => Ok(ColumnValue::Bool(Some(bool_value(field, value)?))),
        FieldType::Timestamp => Ok(ColumnValue::Timestamp(Some(parse_timestamp(field, value)?))),
        FieldType::Time => {
            let raw = value
                .as_str()
                .ok_or_else(|| Error::validation(field, "expected a time string"))?;
            Ok(ColumnValue::Time(Some(parse_time(field, raw)?)))
        }
    }
}

fn text_value(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::validation(field, "expected a string")),
    }
}

/// Folds case and separators so `On Leave`, `on-leave` and `ON_LEAVE` agree.
pub fn normalize_enum(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

fn integer_value(field: &str, value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::validation(field, format!("`{}` is not an integer", value)))
}

fn decimal_value(field: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| Error::validation(field, format!("`{}` is not a number", value)))
}

fn bool_value(field: &str, value: &Value) -> Result<bool> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| Error::validation(field, format!("`{}` is not a boolean", value)))
}

/// Parses a date/time-like value into a UTC timestamp.
///
/// Integers are epoch milliseconds; naive strings are taken as UTC.
pub fn parse_timestamp(field: &str, value: &Value) -> Result<DateTime<Utc>> {
    let invalid = || Error::validation(field, format!("`{}` is not a recognized timestamp", value));

    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            for format in NAIVE_DATETIME_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Ok(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

/// Parses a time of day (`09:30`, `09:30:00`, `9:30 AM`).
pub fn parse_time(field: &str, raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| Error::validation(field, format!("`{}` is not a recognized time", raw)))
}

/// Hours between shift start and end, wrapping past midnight. An empty
/// window has no span.
pub fn shift_span_hours(start: NaiveTime, end: NaiveTime) -> Option<f64> {
    let mut seconds = end.signed_duration_since(start).num_seconds();
    if seconds == 0 {
        return None;
    }
    if seconds < 0 {
        seconds += 24 * 3600;
    }
    Some((seconds as f64 / 3600.0 * 100.0).round() / 100.0)
}

/// Fills `flexible_hours` from the shift window for flexible schedules.
///
/// Only an absent value is derived; an explicit value or explicit null wins.
fn derive_flexible_hours(record: &mut CanonicalRecord) {
    if record.columns.contains_key(FLEXIBLE_HOURS) {
        return;
    }
    if record.get(SHIFT_TYPE).and_then(ColumnValue::as_text) != Some(FLEXIBLE_SHIFT) {
        return;
    }
    let start = record.get(SHIFT_START).and_then(ColumnValue::as_time);
    let end = record.get(SHIFT_END).and_then(ColumnValue::as_time);
    if let Some(hours) = start.zip(end).and_then(|(start, end)| shift_span_hours(start, end)) {
        record
            .columns
            .insert(FLEXIBLE_HOURS, ColumnValue::Float(Some(hours)));
    }
}
