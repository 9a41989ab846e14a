//! Schema classification by structural inspection.

use serde_json::{Map, Value};

use crate::entity::EntityKind;

/// Distinguishing fields, in precedence order.
///
/// Detail records always carry their parent's identifier, so detail
/// identifiers are inspected first; the remaining order is fixed and part
/// of the classification contract.
pub const PRECEDENCE: [(&str, EntityKind); 6] = [
    ("empl_personal_det_id", EntityKind::EmployeePersonalDetail),
    ("employee_bank_id", EntityKind::EmployeeBankDetail),
    ("empl_financial_id", EntityKind::EmployeeFinancialDetail),
    ("employee_id", EntityKind::Employee),
    ("org_id", EntityKind::Organization),
    ("bank_id", EntityKind::BankMaster),
];

/// Field that ties attendance settings to their organization.
pub const ATTENDANCE_ORG_FIELD: &str = "organizationId";

/// Policy fields that mark a record as attendance settings.
pub const ATTENDANCE_POLICY_FIELDS: &[&str] = &[
    "shiftType",
    "shiftStartTime",
    "shiftEndTime",
    "flexibleHours",
    "gracePeriodMinutes",
    "halfDayThresholdHours",
    "overtimeEnabled",
    "overtimeCalculationType",
    "overtimeRateMultiplier",
    "latePenaltyType",
    "latePenaltyAmount",
];

/// Returns whether a value can serve as an identifier.
///
/// Zero is never a valid id; arrays and objects are never ids.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

/// Maps a record to the entity kind it represents.
pub fn classify(record: &Map<String, Value>) -> EntityKind {
    let primary = PRECEDENCE
        .iter()
        .find(|(field, _)| is_truthy(record.get(*field)))
        .map(|(_, kind)| *kind);

    match primary {
        // Attendance settings may carry an org_id alongside organizationId.
        None | Some(EntityKind::Organization) if is_attendance_settings(record) => {
            EntityKind::AttendanceSettings
        }
        Some(kind) => kind,
        None => EntityKind::Unknown,
    }
}

/// Secondary check for the dedicated attendance-settings schema.
pub fn is_attendance_settings(record: &Map<String, Value>) -> bool {
    is_truthy(record.get(ATTENDANCE_ORG_FIELD))
        && !is_truthy(record.get("employee_id"))
        && ATTENDANCE_POLICY_FIELDS
            .iter()
            .any(|field| record.contains_key(*field))
}
