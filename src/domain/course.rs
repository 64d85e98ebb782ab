use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccountId;

pub type CourseId = Uuid;

/// Number of catalog courses a new account is enrolled in automatically.
pub const DEFAULT_ENROLLMENT_LIMIT: i64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub code: String,
    pub icon: Option<String>,
    pub instructor: Option<String>,
}

impl Course {
    pub fn new(name: String, code: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            code,
            icon: None,
            instructor: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_instructor(mut self, instructor: impl Into<String>) -> Self {
        self.instructor = Some(instructor.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EnrollmentStatus::Active),
            _ => None,
        }
    }
}

/// Membership of an account in a course. At most one row exists per
/// (account, course) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub account_id: AccountId,
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
}

/// Result of an enroll request. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollOutcome {
    Enrolled,
    AlreadyEnrolled,
}

/// Result of a drop request. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    NotEnrolled,
}
