//! Entity catalogue: kinds, tables, keys, references and field types.
//!
//! Every entity the pipeline can write is described here once. The
//! transformer reads wire fields through these descriptions and the stores
//! read table/column names from them, so adding a field is a one-line change.

use serde::{Deserialize, Serialize};

use crate::field::ColumnType;

/// Logical entity a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Organization,
    Employee,
    EmployeePersonalDetail,
    EmployeeBankDetail,
    EmployeeFinancialDetail,
    BankMaster,
    AttendanceSettings,
    Unknown,
}

impl EntityKind {
    /// All kinds with a schema, in catalogue order.
    pub const KNOWN: [EntityKind; 7] = [
        Self::Organization,
        Self::Employee,
        Self::EmployeePersonalDetail,
        Self::EmployeeBankDetail,
        Self::EmployeeFinancialDetail,
        Self::BankMaster,
        Self::AttendanceSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "Organization",
            Self::Employee => "Employee",
            Self::EmployeePersonalDetail => "EmployeePersonalDetail",
            Self::EmployeeBankDetail => "EmployeeBankDetail",
            Self::EmployeeFinancialDetail => "EmployeeFinancialDetail",
            Self::BankMaster => "BankMaster",
            Self::AttendanceSettings => "AttendanceSettings",
            Self::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::KNOWN
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Returns the schema for this kind; `Unknown` has none.
    pub fn schema(&self) -> Option<&'static EntitySchema> {
        match self {
            Self::Organization => Some(&ORGANIZATION),
            Self::Employee => Some(&EMPLOYEE),
            Self::EmployeePersonalDetail => Some(&EMPLOYEE_PERSONAL_DETAIL),
            Self::EmployeeBankDetail => Some(&EMPLOYEE_BANK_DETAIL),
            Self::EmployeeFinancialDetail => Some(&EMPLOYEE_FINANCIAL_DETAIL),
            Self::BankMaster => Some(&BANK_MASTER),
            Self::AttendanceSettings => Some(&ATTENDANCE_SETTINGS),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats with a fixed pattern check after uppercasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeFormat {
    /// Indian Financial System Code, e.g. `HDFC0001234`
    Ifsc,
    /// Permanent Account Number, e.g. `ABCDE1234F`
    Pan,
}

/// How a wire value is coerced into a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    Text { max_len: usize },
    Email,
    Code(CodeFormat),
    Enum(&'static [&'static str]),
    Integer { min: i64, max: i64 },
    Decimal { min: f64 },
    Bool,
    Timestamp,
    Time,
}

impl FieldType {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Text { .. } | Self::Email | Self::Code(_) | Self::Enum(_) => ColumnType::Text,
            Self::Integer { .. } => ColumnType::Integer,
            Self::Decimal { .. } => ColumnType::Float,
            Self::Bool => ColumnType::Bool,
            Self::Timestamp => ColumnType::Timestamp,
            Self::Time => ColumnType::Time,
        }
    }
}

/// A plain (non-key) field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub wire: &'static str,
    pub column: &'static str,
    pub ty: FieldType,
}

/// An identifier field (primary key).
#[derive(Debug, Clone, Copy)]
pub struct KeyField {
    pub wire: &'static str,
    pub column: &'static str,
}

/// A foreign key to a parent entity.
#[derive(Debug, Clone, Copy)]
pub struct ParentRef {
    pub wire: &'static str,
    pub column: &'static str,
    pub parent: EntityKind,
}

/// Storage description of one entity kind.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    pub primary_key: KeyField,
    /// Whether a primary key is generated when the record carries none.
    pub assigns_key: bool,
    /// Column of a parent reference that is also unique per row.
    pub secondary_unique: Option<&'static str>,
    pub parents: &'static [ParentRef],
    pub fields: &'static [FieldSpec],
    /// Lookup entities are read, never written, by ingestion.
    pub writable: bool,
}

impl EntitySchema {
    pub fn parent_for_column(&self, column: &str) -> Option<&'static ParentRef> {
        self.parents.iter().find(|p| p.column == column)
    }

    pub fn field(&self, wire: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.wire == wire)
    }
}

// === Enumerations ===

pub const ORGANIZATION_STATUS: &[&str] = &["active", "inactive", "suspended"];
pub const EMPLOYEE_STATUS: &[&str] = &[
    "active",
    "inactive",
    "on_leave",
    "probation",
    "terminated",
    "resigned",
];
pub const GENDER: &[&str] = &["male", "female", "other", "undisclosed"];
pub const MARITAL_STATUS: &[&str] = &["single", "married", "divorced", "widowed", "separated"];
pub const ACCOUNT_TYPE: &[&str] = &["savings", "current", "salary"];
pub const TAX_REGIME: &[&str] = &["old", "new"];
pub const PAY_FREQUENCY: &[&str] = &["monthly", "biweekly", "weekly"];
pub const SHIFT_TYPE: &[&str] = &["fixed", "flexible", "rotational", "split"];
pub const OVERTIME_CALCULATION_TYPE: &[&str] = &["hourly", "daily", "weekly"];
pub const PENALTY_TYPE: &[&str] = &["none", "fixed_amount", "percentage", "leave_deduction"];

/// Shift type value that triggers the flexible-hours derivation.
pub const FLEXIBLE_SHIFT: &str = "flexible";

const fn text(wire: &'static str, max_len: usize) -> FieldSpec {
    FieldSpec {
        wire,
        column: wire,
        ty: FieldType::Text { max_len },
    }
}

const fn typed(wire: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        wire,
        column: wire,
        ty,
    }
}

const fn renamed(wire: &'static str, column: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec { wire, column, ty }
}

const NON_NEGATIVE: FieldType = FieldType::Decimal { min: 0.0 };

// === Schemas ===

pub static ORGANIZATION: EntitySchema = EntitySchema {
    kind: EntityKind::Organization,
    table: "organizations",
    primary_key: KeyField {
        wire: "org_id",
        column: "org_id",
    },
    assigns_key: false,
    secondary_unique: None,
    parents: &[],
    fields: &[
        text("org_name", 200),
        text("org_code", 50),
        text("industry", 100),
        typed("email", FieldType::Email),
        text("phone", 32),
        text("address", 500),
        typed("status", FieldType::Enum(ORGANIZATION_STATUS)),
        typed("created_at", FieldType::Timestamp),
        typed("updated_at", FieldType::Timestamp),
    ],
    writable: true,
};

pub static EMPLOYEE: EntitySchema = EntitySchema {
    kind: EntityKind::Employee,
    table: "employees",
    primary_key: KeyField {
        wire: "employee_id",
        column: "employee_id",
    },
    assigns_key: false,
    secondary_unique: None,
    parents: &[ParentRef {
        wire: "org_id",
        column: "org_id",
        parent: EntityKind::Organization,
    }],
    fields: &[
        text("employee_code", 50),
        text("first_name", 100),
        text("last_name", 100),
        typed("email", FieldType::Email),
        text("phone", 32),
        text("designation", 100),
        text("department", 100),
        typed("status", FieldType::Enum(EMPLOYEE_STATUS)),
        typed("date_of_joining", FieldType::Timestamp),
        typed("date_of_exit", FieldType::Timestamp),
        typed("created_at", FieldType::Timestamp),
        typed("updated_at", FieldType::Timestamp),
    ],
    writable: true,
};

const EMPLOYEE_REF: ParentRef = ParentRef {
    wire: "employee_id",
    column: "employee_id",
    parent: EntityKind::Employee,
};

pub static EMPLOYEE_PERSONAL_DETAIL: EntitySchema = EntitySchema {
    kind: EntityKind::EmployeePersonalDetail,
    table: "employee_personal_details",
    primary_key: KeyField {
        wire: "empl_personal_det_id",
        column: "empl_personal_det_id",
    },
    assigns_key: false,
    secondary_unique: Some("employee_id"),
    parents: &[EMPLOYEE_REF],
    fields: &[
        typed("date_of_birth", FieldType::Timestamp),
        typed("gender", FieldType::Enum(GENDER)),
        typed("marital_status", FieldType::Enum(MARITAL_STATUS)),
        text("nationality", 64),
        text("blood_group", 8),
        typed("personal_email", FieldType::Email),
        text("emergency_contact_name", 100),
        text("emergency_contact_phone", 32),
        text("permanent_address", 500),
        text("current_address", 500),
        typed("created_at", FieldType::Timestamp),
        typed("updated_at", FieldType::Timestamp),
    ],
    writable: true,
};

pub static EMPLOYEE_BANK_DETAIL: EntitySchema = EntitySchema {
    kind: EntityKind::EmployeeBankDetail,
    table: "employee_bank_details",
    primary_key: KeyField {
        wire: "employee_bank_id",
        column: "employee_bank_id",
    },
    assigns_key: false,
    secondary_unique: Some("employee_id"),
    parents: &[
        EMPLOYEE_REF,
        ParentRef {
            wire: "bank_id",
            column: "bank_id",
            parent: EntityKind::BankMaster,
        },
    ],
    fields: &[
        text("account_holder_name", 150),
        text("account_number", 34),
        typed("ifsc_code", FieldType::Code(CodeFormat::Ifsc)),
        text("branch_name", 150),
        typed("account_type", FieldType::Enum(ACCOUNT_TYPE)),
        typed("is_primary", FieldType::Bool),
        typed("created_at", FieldType::Timestamp),
        typed("updated_at", FieldType::Timestamp),
    ],
    writable: true,
};

pub static EMPLOYEE_FINANCIAL_DETAIL: EntitySchema = EntitySchema {
    kind: EntityKind::EmployeeFinancialDetail,
    table: "employee_financial_details",
    primary_key: KeyField {
        wire: "empl_financial_id",
        column: "empl_financial_id",
    },
    assigns_key: false,
    secondary_unique: Some("employee_id"),
    parents: &[EMPLOYEE_REF],
    fields: &[
        typed("pan_number", FieldType::Code(CodeFormat::Pan)),
        typed("tax_regime", FieldType::Enum(TAX_REGIME)),
        typed("pay_frequency", FieldType::Enum(PAY_FREQUENCY)),
        typed("basic_salary", NON_NEGATIVE),
        typed("ctc", NON_NEGATIVE),
        text("pf_number", 32),
        text("uan_number", 32),
        text("esi_number", 32),
        typed("effective_from", FieldType::Timestamp),
        typed("created_at", FieldType::Timestamp),
        typed("updated_at", FieldType::Timestamp),
    ],
    writable: true,
};

pub static BANK_MASTER: EntitySchema = EntitySchema {
    kind: EntityKind::BankMaster,
    table: "bank_master",
    primary_key: KeyField {
        wire: "bank_id",
        column: "bank_id",
    },
    assigns_key: false,
    secondary_unique: None,
    parents: &[],
    fields: &[text("bank_name", 150), text("bank_code", 20)],
    writable: false,
};

pub static ATTENDANCE_SETTINGS: EntitySchema = EntitySchema {
    kind: EntityKind::AttendanceSettings,
    table: "attendance_settings",
    primary_key: KeyField {
        wire: "id",
        column: "id",
    },
    assigns_key: true,
    secondary_unique: Some("organization_id"),
    parents: &[ParentRef {
        wire: "organizationId",
        column: "organization_id",
        parent: EntityKind::Organization,
    }],
    fields: &[
        renamed("shiftType", "shift_type", FieldType::Enum(SHIFT_TYPE)),
        renamed("shiftStartTime", "shift_start_time", FieldType::Time),
        renamed("shiftEndTime", "shift_end_time", FieldType::Time),
        renamed("flexibleHours", "flexible_hours", NON_NEGATIVE),
        renamed(
            "gracePeriodMinutes",
            "grace_period_minutes",
            FieldType::Integer { min: 0, max: 720 },
        ),
        renamed("halfDayThresholdHours", "half_day_threshold_hours", NON_NEGATIVE),
        renamed("overtimeEnabled", "overtime_enabled", FieldType::Bool),
        renamed(
            "overtimeCalculationType",
            "overtime_calculation_type",
            FieldType::Enum(OVERTIME_CALCULATION_TYPE),
        ),
        renamed("overtimeRateMultiplier", "overtime_rate_multiplier", NON_NEGATIVE),
        renamed(
            "latePenaltyType",
            "late_penalty_type",
            FieldType::Enum(PENALTY_TYPE),
        ),
        renamed("latePenaltyAmount", "late_penalty_amount", NON_NEGATIVE),
        renamed("effectiveFrom", "effective_from", FieldType::Timestamp),
        renamed("createdAt", "created_at", FieldType::Timestamp),
        renamed("updatedAt", "updated_at", FieldType::Timestamp),
    ],
    writable: true,
};
