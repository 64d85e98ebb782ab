mod repository;

pub use repository::*;

/// SQL migration for accounts, profiles, courses and enrollments
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for tuition ledgers
pub const MIGRATION_002_LEDGERS: &str = include_str!("migrations/002_ledgers.sql");

/// Kind of schema constraint a failed statement tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    Unique,
    ForeignKey,
    Check,
}

/// Classify a storage error by the constraint it violated, looking through
/// any context attached on the way up.
pub fn constraint_violation(err: &anyhow::Error) -> Option<ConstraintViolation> {
    let sqlx::Error::Database(db_err) = err.downcast_ref::<sqlx::Error>()? else {
        return None;
    };

    if db_err.is_unique_violation() {
        Some(ConstraintViolation::Unique)
    } else if db_err.is_foreign_key_violation() {
        Some(ConstraintViolation::ForeignKey)
    } else if db_err.is_check_violation() {
        Some(ConstraintViolation::Check)
    } else {
        None
    }
}
