use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info};

use crate::domain::{AccountId, CourseId, DropOutcome, EnrollOutcome, Enrollment};
use crate::storage::{ConstraintViolation, Repository, constraint_violation};

use super::{AppError, PortalService};

impl PortalService {
    /// Enroll an account in a course. Enrolling twice is a success that
    /// changes nothing.
    ///
    /// Both the account and the course must exist; a dangling reference is
    /// rejected with [`AppError::Referential`].
    pub async fn enroll(
        &self,
        account_id: AccountId,
        course_id: CourseId,
    ) -> Result<EnrollOutcome, AppError> {
        let mut tx = self.repo.begin().await?;

        let inserted = match Repository::insert_enrollment_if_absent(
            &mut *tx,
            account_id,
            course_id,
            Utc::now(),
        )
        .await
        {
            Ok(inserted) => inserted,
            Err(err) => {
                return match constraint_violation(&err) {
                    Some(ConstraintViolation::ForeignKey) => Err(AppError::Referential(format!(
                        "account {} or course {}",
                        account_id, course_id
                    ))),
                    // Lost a race with an identical enroll: the pair exists
                    Some(ConstraintViolation::Unique) => Ok(EnrollOutcome::AlreadyEnrolled),
                    _ => Err(AppError::Database(err)),
                };
            }
        };

        tx.commit().await.context("Failed to commit enrollment")?;

        let outcome = if inserted {
            EnrollOutcome::Enrolled
        } else {
            EnrollOutcome::AlreadyEnrolled
        };
        info!(account_id = %account_id, course_id = %course_id, ?outcome, "enroll");
        Ok(outcome)
    }

    /// Remove an account from a course. Dropping an absent enrollment is a
    /// success that changes nothing.
    pub async fn drop_enrollment(
        &self,
        account_id: AccountId,
        course_id: CourseId,
    ) -> Result<DropOutcome, AppError> {
        let mut tx = self.repo.begin().await?;
        let deleted = Repository::delete_enrollment(&mut *tx, account_id, course_id).await?;
        tx.commit().await.context("Failed to commit drop")?;

        let outcome = if deleted {
            DropOutcome::Dropped
        } else {
            DropOutcome::NotEnrolled
        };
        info!(account_id = %account_id, course_id = %course_id, ?outcome, "drop");
        Ok(outcome)
    }

    pub async fn list_enrollments(&self, account_id: AccountId) -> Result<Vec<Enrollment>, AppError> {
        let enrollments = self.repo.list_enrollments(account_id).await?;
        debug!(account_id = %account_id, count = enrollments.len(), "enrollments listed");
        Ok(enrollments)
    }
}
