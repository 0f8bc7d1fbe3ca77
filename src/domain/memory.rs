use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    /// No similar advice was on record.
    New,
    /// Similar advice was given before, outside the cooldown window.
    RepeatedNoChange,
}

impl MemoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::RepeatedNoChange => "repeated_no_change",
        }
    }
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "repeated_no_change" => Ok(Self::RepeatedNoChange),
            other => Err(format!("Unknown memory status: {other}")),
        }
    }
}

/// A remembered recommendation. Records are appended and deleted, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    /// Store-assigned insertion sequence, used to break timestamp ties.
    pub seq: u64,
    pub subject_id: String,
    pub target_id: String,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub status: MemoryStatus,
}

/// Insert payload; the store assigns `id` and `seq`.
#[derive(Debug, Clone)]
pub struct NewMemoryRecord {
    pub subject_id: String,
    pub target_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub status: MemoryStatus,
}
