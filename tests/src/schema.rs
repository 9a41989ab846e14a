//! Reference PostgreSQL DDL for the entity tables, generated from the
//! entity catalogue so column names and types cannot drift.

use ingest_core::entity::{
    EntitySchema, ATTENDANCE_SETTINGS, BANK_MASTER, EMPLOYEE, EMPLOYEE_BANK_DETAIL,
    EMPLOYEE_FINANCIAL_DETAIL, EMPLOYEE_PERSONAL_DETAIL, ORGANIZATION,
};
use ingest_core::ColumnType;
use postgres_store::offsets::CREATE_CONSUMER_OFFSETS;

/// Tables in dependency order.
pub const TABLES: [&EntitySchema; 7] = [
    &ORGANIZATION,
    &BANK_MASTER,
    &EMPLOYEE,
    &EMPLOYEE_PERSONAL_DETAIL,
    &EMPLOYEE_BANK_DETAIL,
    &EMPLOYEE_FINANCIAL_DETAIL,
    &ATTENDANCE_SETTINGS,
];

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Text => "TEXT",
        ColumnType::Integer => "BIGINT",
        ColumnType::Float => "DOUBLE PRECISION",
        ColumnType::Bool => "BOOLEAN",
        ColumnType::Timestamp => "TIMESTAMPTZ",
        ColumnType::Time => "TIME",
    }
}

/// `CREATE TABLE` for one entity.
pub fn create_table(schema: &EntitySchema) -> String {
    let mut columns = vec![format!("{} TEXT PRIMARY KEY", schema.primary_key.column)];

    for parent in schema.parents {
        let Some(target) = parent.parent.schema() else { continue };
        let unique = if schema.secondary_unique == Some(parent.column) {
            " UNIQUE"
        } else {
            ""
        };
        columns.push(format!(
            "{} TEXT NOT NULL{} REFERENCES {} ({})",
            parent.column, unique, target.table, target.primary_key.column
        ));
    }

    for field in schema.fields {
        columns.push(format!("{} {}", field.column, sql_type(field.ty.column_type())));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        schema.table,
        columns.join(",\n    ")
    )
}

/// Every statement needed for a fresh database.
pub fn all_statements() -> Vec<String> {
    let mut statements: Vec<String> = TABLES.iter().map(|s| create_table(s)).collect();
    statements.push(CREATE_CONSUMER_OFFSETS.to_string());
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_detail_table() {
        let ddl = create_table(&EMPLOYEE_BANK_DETAIL);
        assert!(ddl.contains("employee_bank_id TEXT PRIMARY KEY"));
        assert!(ddl.contains("employee_id TEXT NOT NULL UNIQUE REFERENCES employees (employee_id)"));
        assert!(ddl.contains("bank_id TEXT NOT NULL REFERENCES bank_master (bank_id)"));
        assert!(ddl.contains("is_primary BOOLEAN"));
    }

    #[test]
    fn test_attendance_table_uses_snake_case_columns() {
        let ddl = create_table(&ATTENDANCE_SETTINGS);
        assert!(ddl.contains("organization_id TEXT NOT NULL UNIQUE REFERENCES organizations (org_id)"));
        assert!(ddl.contains("grace_period_minutes BIGINT"));
        assert!(ddl.contains("shift_start_time TIME"));
        assert!(!ddl.contains("shiftType"));
    }
}
