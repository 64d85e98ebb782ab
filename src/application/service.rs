use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::auth::{hash_password, verify_password};
use crate::domain::{
    Account, AccountId, AccountSummary, Cents, Course, DEFAULT_ENROLLMENT_LIMIT, IntegrityReport,
    LedgerBalance, Profile, ProfileUpdate, build_integrity_report, normalize_email,
};
use crate::storage::{ConstraintViolation, Repository, StoreConfig, constraint_violation};

use super::{AppError, ValidationError};

/// Application service for the student portal core.
///
/// Every mutating operation runs as exactly one unit of work: it either
/// commits all of its statements or none of them. The service keeps no state
/// between calls besides the connection pool.
#[derive(Clone)]
pub struct PortalService {
    pub(super) repo: Repository,
}

impl PortalService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Create (if needed) and migrate the database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let config = StoreConfig::new(database_path).create_if_missing(true);
        Self::open(&config, true).await
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        Self::open(&StoreConfig::new(database_path), false).await
    }

    pub async fn open(config: &StoreConfig, migrate: bool) -> Result<Self, AppError> {
        let repo = if migrate {
            Repository::init(config).await?
        } else {
            Repository::connect(config).await?
        };
        debug!(path = %config.path, migrate, "store opened");
        Ok(Self::new(repo))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Account operations
    // ========================

    /// Create a student account together with its empty profile and the
    /// default course enrollments.
    ///
    /// Nothing is persisted unless all three steps succeed; a taken email
    /// fails with [`AppError::DuplicateEmail`] and leaves no rows behind.
    pub async fn provision(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AccountId, AppError> {
        let name = required("name", name)?;
        let email = normalize_email(required("email", email)?);
        if password.is_empty() {
            return Err(ValidationError::MissingField("password").into());
        }

        let password_hash = hash_blocking(password.to_owned()).await?;
        let account = Account::new_student(name.to_string(), email, password_hash);

        let mut tx = self.repo.begin().await?;

        if let Err(err) = Repository::insert_account(&mut *tx, &account).await {
            return Err(match constraint_violation(&err) {
                Some(ConstraintViolation::Unique) => {
                    warn!(email = %account.email, "provisioning rejected: email taken");
                    AppError::DuplicateEmail(account.email)
                }
                _ => AppError::Database(err),
            });
        }

        Repository::insert_profile_if_absent(&mut *tx, &Profile::shell(account.id)).await?;

        let courses = Repository::list_default_courses(&mut *tx, DEFAULT_ENROLLMENT_LIMIT).await?;
        let enrolled_at = Utc::now();
        let mut enrolled = 0;
        for course_id in courses {
            if Repository::insert_enrollment_if_absent(&mut *tx, account.id, course_id, enrolled_at)
                .await?
            {
                enrolled += 1;
            }
        }

        tx.commit()
            .await
            .context("Failed to commit account provisioning")?;

        info!(account_id = %account.id, enrolled, "account provisioned");
        Ok(account.id)
    }

    /// Check an email/password pair. Unknown emails and wrong passwords both
    /// fail with [`AppError::InvalidCredentials`].
    pub async fn login(&self, email: &str, password: &str) -> Result<AccountSummary, AppError> {
        let email = normalize_email(required("email", email)?);
        if password.is_empty() {
            return Err(ValidationError::MissingField("password").into());
        }

        let Some(account) = self.repo.get_account_by_email(&email).await? else {
            warn!("login failed: unknown email");
            return Err(AppError::InvalidCredentials);
        };

        let hash = account.password_hash.clone();
        let password = password.to_owned();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .context("Password verification task failed")??;

        if !verified {
            warn!(account_id = %account.id, "login failed: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        info!(account_id = %account.id, "login succeeded");
        Ok(account.summary())
    }

    // ========================
    // Profile operations
    // ========================

    /// Write profile fields, updating the row if it exists and inserting it
    /// otherwise.
    pub async fn update_profile(
        &self,
        account_id: AccountId,
        update: ProfileUpdate,
    ) -> Result<(), AppError> {
        let profile = update.into_profile(account_id);
        let mut tx = self.repo.begin().await?;

        if !Repository::update_profile(&mut *tx, &profile).await? {
            if let Err(err) = Repository::insert_profile(&mut *tx, &profile).await {
                return Err(match constraint_violation(&err) {
                    Some(ConstraintViolation::ForeignKey) => {
                        AppError::NotFound(format!("account {}", account_id))
                    }
                    _ => AppError::Database(err),
                });
            }
            debug!(account_id = %account_id, "profile row created on update");
        }

        tx.commit().await.context("Failed to commit profile update")?;
        info!(account_id = %account_id, "profile updated");
        Ok(())
    }

    // ========================
    // Catalog operations
    // ========================

    pub async fn add_course(
        &self,
        name: &str,
        code: &str,
        icon: Option<String>,
        instructor: Option<String>,
    ) -> Result<Course, AppError> {
        let name = required("name", name)?;
        let code = required("code", code)?;

        let mut course = Course::new(name.to_string(), code.to_string());
        if let Some(icon) = icon {
            course = course.with_icon(icon);
        }
        if let Some(instructor) = instructor {
            course = course.with_instructor(instructor);
        }

        if let Err(err) = self.repo.insert_course(&course).await {
            return Err(match constraint_violation(&err) {
                Some(ConstraintViolation::Unique) => AppError::DuplicateCourse(course.code),
                _ => AppError::Database(err),
            });
        }

        info!(course_id = %course.id, code = %course.code, "course added");
        Ok(course)
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        Ok(self.repo.list_courses().await?)
    }

    pub async fn enrolled_courses(&self, account_id: AccountId) -> Result<Vec<Course>, AppError> {
        Ok(self.repo.list_enrolled_courses(account_id).await?)
    }

    // ========================
    // Ledger provisioning
    // ========================

    /// Create the tuition ledger for an account. Payments never create
    /// ledgers; this is the only way one comes into existence.
    pub async fn open_ledger(
        &self,
        account_id: AccountId,
        total: Cents,
    ) -> Result<LedgerBalance, AppError> {
        let ledger = LedgerBalance::open(account_id, total)
            .map_err(|e| ValidationError::InvalidAmount(e.to_string()))?;

        if let Err(err) = Repository::insert_ledger(self.repo.pool(), &ledger).await {
            return Err(match constraint_violation(&err) {
                Some(ConstraintViolation::Unique) => AppError::LedgerExists(account_id.to_string()),
                Some(ConstraintViolation::ForeignKey) => {
                    AppError::NotFound(format!("account {}", account_id))
                }
                _ => AppError::Database(err),
            });
        }

        info!(account_id = %account_id, total, "ledger opened");
        Ok(ledger)
    }

    pub async fn list_ledgers(&self) -> Result<Vec<LedgerBalance>, AppError> {
        Ok(self.repo.list_ledgers().await?)
    }

    // ========================
    // Integrity
    // ========================

    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;
        let ledgers = self.repo.list_ledgers().await?;

        let report = build_integrity_report(
            stats.account_count,
            stats.enrollment_count,
            stats.accounts_without_profile,
            stats.orphan_enrollments,
            &ledgers,
        );

        if !report.is_valid {
            warn!(
                inconsistent_ledgers = report.inconsistent_ledgers.len(),
                accounts_without_profile = report.accounts_without_profile,
                orphan_enrollments = report.orphan_enrollments,
                "integrity check found problems"
            );
        }
        Ok(report)
    }
}

/// Trimmed value of a required text field.
fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(value)
    }
}

/// Argon2 is CPU-bound; keep it off the async workers.
async fn hash_blocking(password: String) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task failed")??;
    Ok(hash)
}
