//! Test fixtures and record generators.

use chrono::Utc;
use ingest_core::QueueMessage;
use serde_json::{json, Value};

pub const TOPIC: &str = "hrms.records";

pub fn organization(org_id: &str) -> Value {
    json!({
        "org_id": org_id,
        "org_name": "Acme Corp",
        "org_code": "ACME",
        "industry": "Manufacturing",
        "email": "hr@acme.example",
        "status": "Active",
        "created_at": "2024-01-15T10:00:00Z"
    })
}

pub fn employee(employee_id: &str, org_id: &str) -> Value {
    json!({
        "employee_id": employee_id,
        "org_id": org_id,
        "employee_code": "EMP-001",
        "first_name": "Asha",
        "last_name": "Rao",
        "email": "asha.rao@acme.example",
        "status": "active",
        "date_of_joining": "2024-02-01T00:00:00Z"
    })
}

pub fn personal_detail(id: &str, employee_id: &str) -> Value {
    json!({
        "empl_personal_det_id": id,
        "employee_id": employee_id,
        "gender": "Female",
        "marital_status": "single",
        "nationality": "Indian",
        "personal_email": "asha@example.com"
    })
}

pub fn bank_detail(id: &str, employee_id: &str, bank_id: &str) -> Value {
    json!({
        "employee_bank_id": id,
        "employee_id": employee_id,
        "bank_id": bank_id,
        "account_holder_name": "Asha Rao",
        "account_number": "001234567890",
        "ifsc_code": "hdfc0001234",
        "account_type": "Savings",
        "is_primary": true
    })
}

pub fn financial_detail(id: &str, employee_id: &str) -> Value {
    json!({
        "empl_financial_id": id,
        "employee_id": employee_id,
        "pan_number": "abcde1234f",
        "tax_regime": "new",
        "pay_frequency": "monthly",
        "basic_salary": 50000,
        "ctc": 900000.5
    })
}

pub fn attendance_settings(org_id: &str) -> Value {
    json!({
        "organizationId": org_id,
        "shiftType": "flexible",
        "shiftStartTime": "09:00",
        "shiftEndTime": "18:30",
        "gracePeriodMinutes": 15,
        "overtimeEnabled": true,
        "latePenaltyType": "none"
    })
}

/// A full employee onboarding: organization, employee and every detail.
pub fn onboarding(org_id: &str, employee_id: &str, bank_id: &str) -> Vec<Value> {
    vec![
        organization(org_id),
        employee(employee_id, org_id),
        personal_detail(&format!("{}-p", employee_id), employee_id),
        bank_detail(&format!("{}-b", employee_id), employee_id, bank_id),
        financial_detail(&format!("{}-f", employee_id), employee_id),
        attendance_settings(org_id),
    ]
}

/// Wraps a body as a message at `offset`.
pub fn message(offset: i64, body: &Value) -> QueueMessage {
    raw_message(offset, body.to_string().into_bytes())
}

pub fn raw_message(offset: i64, payload: Vec<u8>) -> QueueMessage {
    QueueMessage {
        topic: TOPIC.to_string(),
        partition: 0,
        offset,
        key: None,
        payload,
        received_at: Utc::now(),
    }
}
