//! Membership and revenue records

use serde::{Deserialize, Deserializer, Serialize};

use crate::clock::YearMonth;

/// A member's Prime entitlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub user_id: String,
    /// Epoch milliseconds at which the membership lapses
    pub expiry_at: i64,
    /// Set once the "expiring soon" notice went out for the current expiry
    pub warned: bool,
}

impl MembershipRecord {
    pub fn new(user_id: impl Into<String>, expiry_at: i64) -> Self {
        Self {
            user_id: user_id.into(),
            expiry_at,
            warned: false,
        }
    }

    pub fn is_active(&self, now: i64) -> bool {
        self.expiry_at > now
    }
}

/// One calendar month of recognized revenue, before it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub year: i32,
    pub month: u8,
    pub amount: i64,
}

impl Allocation {
    pub fn year_month(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.month,
        }
    }
}

/// A stored allocation row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub id: i64,
    pub year: i32,
    pub month: u8,
    pub amount: i64,
}

impl AllocationRecord {
    pub fn year_month(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.month,
        }
    }
}

/// One member as exchanged with the backup webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMember {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(deserialize_with = "integer_millis")]
    pub expiry: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl From<&MembershipRecord> for BackupMember {
    fn from(record: &MembershipRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            expiry: record.expiry_at,
            nickname: None,
        }
    }
}

/// The full membership set at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    #[serde(default)]
    pub members: Vec<BackupMember>,
}

impl BackupSnapshot {
    pub fn from_records(records: &[MembershipRecord]) -> Self {
        Self {
            members: records.iter().map(BackupMember::from).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// Spreadsheet cells come back as numbers when the id looks numeric.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for userId, got {}",
            other
        ))),
    }
}

fn integer_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(ms) = number.as_i64() {
        return Ok(ms);
    }
    match number.as_f64() {
        Some(ms) if ms.is_finite() => Ok(ms.round() as i64),
        _ => Err(serde::de::Error::custom(format!(
            "expiry is not a finite number: {}",
            number
        ))),
    }
}
