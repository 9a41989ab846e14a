//! End-to-end scenarios through the dispatcher, pipeline and in-memory
//! stores.

use ingest_core::{ColumnValue, EntityKind, FailureKind};
use integration_tests::fixtures;
use integration_tests::harness::{Harness, BANK_ID};
use serde_json::json;

#[tokio::test]
async fn test_onboarding_persists_every_entity() {
    let h = Harness::new();
    for body in fixtures::onboarding("ORG-1", "EMP-1", BANK_ID) {
        h.queue.push(&body);
    }

    let report = h.drain().await.unwrap();
    assert_eq!(report.received, 6);
    assert_eq!(report.created, 6);
    assert_eq!(report.dead_lettered, 0);
    assert_eq!(h.queue.unacknowledged(), 0);

    let org = h.store.row(EntityKind::Organization, "ORG-1").unwrap();
    assert_eq!(org["status"], ColumnValue::Text(Some("active".into())));

    let bank = h.store.row(EntityKind::EmployeeBankDetail, "EMP-1-b").unwrap();
    assert_eq!(bank["ifsc_code"], ColumnValue::Text(Some("HDFC0001234".into())));
    assert_eq!(bank["account_type"], ColumnValue::Text(Some("savings".into())));

    let settings = h.store.rows(EntityKind::AttendanceSettings);
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0]["flexible_hours"], ColumnValue::Float(Some(9.5)));
    assert_eq!(
        settings[0]["organization_id"],
        ColumnValue::Text(Some("ORG-1".into()))
    );
}

#[tokio::test]
async fn test_employee_with_org_id_is_an_employee() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.push(&fixtures::employee("EMP-1", "ORG-1"));
    h.drain().await.unwrap();

    assert_eq!(h.store.count(EntityKind::Employee), 1);
    assert_eq!(h.store.count(EntityKind::Organization), 1);
    let org = h.store.row(EntityKind::Organization, "ORG-1").unwrap();
    // the employee message must not have touched the organization
    assert_eq!(org["email"], ColumnValue::Text(Some("hr@acme.example".into())));
}

#[tokio::test]
async fn test_unknown_bank_is_dead_lettered_with_intact_payload() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.push(&fixtures::employee("EMP-1", "ORG-1"));
    let body = fixtures::bank_detail("EB-1", "EMP-1", "BANK-NOPE");
    h.queue.push(&body);

    let report = h.drain().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(h.queue.unacknowledged(), 0);
    assert!(h.store.row(EntityKind::EmployeeBankDetail, "EB-1").is_none());

    let letters = h.dead_letters.letters();
    assert_eq!(letters.len(), 1);
    let letter = &letters[0];
    assert_eq!(letter.failure_kind, FailureKind::ReferentialError);
    assert_eq!(letter.entity_kind, Some(EntityKind::EmployeeBankDetail));
    assert_eq!(letter.entity_key.as_deref(), Some("EB-1"));
    assert_eq!(letter.raw_message, body.to_string());
    assert_eq!(letter.source_offset, 2);
    assert!(letter.reason.contains("BANK-NOPE"));
}

#[tokio::test]
async fn test_new_employee_without_organization_is_referential() {
    let h = Harness::new();
    h.queue.push(&json!({"employee_id": "EMP-9", "first_name": "Ravi"}));
    h.drain().await.unwrap();

    let letters = h.dead_letters.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].failure_kind, FailureKind::ReferentialError);
    assert!(h.store.row(EntityKind::Employee, "EMP-9").is_none());
}

#[tokio::test]
async fn test_partial_update_does_not_need_the_reference_again() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.push(&fixtures::employee("EMP-1", "ORG-1"));
    h.queue.push(&json!({"employee_id": "EMP-1", "designation": "Engineer"}));
    h.drain().await.unwrap();

    assert_eq!(h.dead_letters.count(), 0);
    let employee = h.store.row(EntityKind::Employee, "EMP-1").unwrap();
    assert_eq!(employee["designation"], ColumnValue::Text(Some("Engineer".into())));
    assert_eq!(employee["first_name"], ColumnValue::Text(Some("Asha".into())));
}

#[tokio::test]
async fn test_undecodable_messages_are_unclassified_and_acknowledged() {
    let h = Harness::new();
    h.queue.push_raw(b"{not json".to_vec(), None);
    h.queue.push_raw(b"[1, 2]".to_vec(), None);
    h.queue.push(&json!({"unrelated": "shape"}));

    let report = h.drain().await.unwrap();
    assert_eq!(report.dead_lettered, 3);
    assert_eq!(h.queue.unacknowledged(), 0);
    assert!(h
        .dead_letters
        .letters()
        .iter()
        .all(|l| l.failure_kind == FailureKind::Unclassified));
    assert_eq!(h.store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_validation_failures_name_the_field() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    let mut bad = fixtures::employee("EMP-1", "ORG-1");
    bad["status"] = json!("retired-ish");
    h.queue.push(&bad);
    h.drain().await.unwrap();

    let letters = h.dead_letters.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].failure_kind, FailureKind::ValidationError);
    assert!(letters[0].reason.contains("status"));
    assert_eq!(letters[0].entity_key.as_deref(), Some("EMP-1"));
}

#[tokio::test]
async fn test_bank_master_records_are_rejected() {
    let h = Harness::new();
    h.queue.push(&json!({"bank_id": "BANK-NEW", "bank_name": "New Bank"}));
    h.drain().await.unwrap();

    let letters = h.dead_letters.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].failure_kind, FailureKind::ValidationError);
    assert!(h.store.row(EntityKind::BankMaster, "BANK-NEW").is_none());
}

#[tokio::test]
async fn test_explicit_null_clears_and_omission_keeps() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.push(&json!({
        "organizationId": "ORG-1",
        "shiftType": "fixed",
        "flexibleHours": 2.5,
        "gracePeriodMinutes": 10
    }));
    h.drain().await.unwrap();

    // omission leaves flexible_hours alone
    h.queue.push(&json!({"organizationId": "ORG-1", "gracePeriodMinutes": 20}));
    h.drain().await.unwrap();
    let row = &h.store.rows(EntityKind::AttendanceSettings)[0];
    assert_eq!(row["flexible_hours"], ColumnValue::Float(Some(2.5)));
    assert_eq!(row["grace_period_minutes"], ColumnValue::Integer(Some(20)));

    // explicit null clears it
    h.queue.push(&json!({"organizationId": "ORG-1", "flexibleHours": null}));
    h.drain().await.unwrap();
    let rows = h.store.rows(EntityKind::AttendanceSettings);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["flexible_hours"], ColumnValue::Float(None));
    assert_eq!(h.dead_letters.count(), 0);
}
