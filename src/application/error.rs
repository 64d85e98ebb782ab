use thiserror::Error;

use crate::auth::CredentialError;
use crate::domain::Cents;

/// Caller-side input problems, detected before any store access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payment of {requested} exceeds remaining balance of {overdue}")]
    Overpayment { overdue: Cents, requested: Cents },

    #[error("Unknown reference: {0}")]
    Referential(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Course code already exists: {0}")]
    DuplicateCourse(String),

    #[error("Ledger already exists for account {0}")]
    LedgerExists(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable failure reason exposed to callers. Never carries
    /// store-internal text.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::Validation(ValidationError::MissingField(_)) => "missing_field",
            AppError::Validation(ValidationError::InvalidAmount(_)) => "invalid_amount",
            AppError::DuplicateEmail(_) => "duplicate_email",
            AppError::NotFound(_) => "not_found",
            AppError::Overpayment { .. } => "exceeds_balance",
            AppError::Referential(_) => "unknown_reference",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::DuplicateCourse(_) => "duplicate_course",
            AppError::LedgerExists(_) => "ledger_exists",
            AppError::Credential(_) | AppError::Database(_) => "internal_error",
        }
    }

    /// True for failures caused by the caller's input or the current state,
    /// as opposed to the store or the environment.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AppError::Credential(_) | AppError::Database(_))
    }
}
