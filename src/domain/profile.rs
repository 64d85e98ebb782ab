use serde::{Deserialize, Serialize};

use super::AccountId;

/// Student profile, 1:1 with an account. Every field is optional: the row is
/// created as an empty shell at provisioning and filled in later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub account_id: AccountId,
    pub registration_no: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub year: Option<i64>,
    pub gpa: Option<f64>,
}

impl Profile {
    pub fn shell(account_id: AccountId) -> Self {
        Self {
            account_id,
            ..Default::default()
        }
    }

    pub fn is_shell(&self) -> bool {
        self.registration_no.is_none()
            && self.phone.is_none()
            && self.department.is_none()
            && self.year.is_none()
            && self.gpa.is_none()
    }
}

/// Fields written by a profile edit. Unset fields are stored as NULL, matching
/// a full-form submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub registration_no: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub year: Option<i64>,
    pub gpa: Option<f64>,
}

impl ProfileUpdate {
    pub fn into_profile(self, account_id: AccountId) -> Profile {
        Profile {
            account_id,
            registration_no: self.registration_no,
            phone: self.phone,
            department: self.department,
            year: self.year,
            gpa: self.gpa,
        }
    }
}
