//! The one authoritative schema every script agrees on.
//!
//! Earlier scripts disagreed on column names (`visible` vs `is_visible`) and on whether the
//! founder id doubled as the auth user id. Table and column names live here so any change
//! happens in one place, and `inspect_schema` reports drift against these lists.

pub const FOUNDERS_TABLE: &str = "founders";
pub const CONNECTIONS_TABLE: &str = "connections";

pub mod founders {
    pub const ID: &str = "id";
    pub const USER_ID: &str = "user_id";
    pub const NAME: &str = "name";
    pub const BIO: &str = "bio";
    pub const COMPANY: &str = "company";
    pub const IS_VISIBLE: &str = "is_visible";
    pub const ONBOARDING_COMPLETED: &str = "onboarding_completed";
    pub const PROFILE_PROGRESS: &str = "profile_progress";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";

    pub const ALL: &[&str] = &[
        ID,
        USER_ID,
        NAME,
        BIO,
        COMPANY,
        IS_VISIBLE,
        ONBOARDING_COMPLETED,
        PROFILE_PROGRESS,
        CREATED_AT,
        UPDATED_AT,
    ];

    /// Names seen in older scripts, mapped to the current column.
    pub const LEGACY_NAMES: &[(&str, &str)] = &[
        ("visible", IS_VISIBLE),
        ("profile_visible", IS_VISIBLE),
        ("onboarding_complete", ONBOARDING_COMPLETED),
        ("progress", PROFILE_PROGRESS),
        ("founder_id", ID),
    ];
}

pub mod connections {
    pub const ID: &str = "id";
    pub const INITIATOR_ID: &str = "initiator_id";
    pub const RECEIVER_ID: &str = "receiver_id";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "created_at";

    pub const ALL: &[&str] = &[ID, INITIATOR_ID, RECEIVER_ID, STATUS, CREATED_AT];

    pub const LEGACY_NAMES: &[(&str, &str)] = &[
        ("founder_id", INITIATOR_ID),
        ("requester_id", INITIATOR_ID),
        ("target_id", RECEIVER_ID),
    ];
}

/// Difference between the pinned column list and what a live table actually has.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchemaDrift {
    /// Pinned columns the live table lacks.
    pub missing: Vec<String>,
    /// Live columns the pinned list does not know about.
    pub unexpected: Vec<String>,
    /// Live columns that match a known legacy name, paired with the current name.
    pub legacy: Vec<(String, String)>,
}

impl SchemaDrift {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.legacy.is_empty()
    }
}

pub fn diff_columns(
    expected: &[&str],
    legacy_names: &[(&str, &str)],
    actual: &[String],
) -> SchemaDrift {
    let mut drift = SchemaDrift::default();

    for column in expected {
        if !actual.iter().any(|a| a == column) {
            drift.missing.push(column.to_string());
        }
    }

    for column in actual {
        if expected.contains(&column.as_str()) {
            continue;
        }
        match legacy_names.iter().find(|(old, _)| old == column) {
            Some((old, current)) => drift.legacy.push((old.to_string(), current.to_string())),
            None => drift.unexpected.push(column.clone()),
        }
    }

    drift
}
