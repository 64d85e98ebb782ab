use anyhow::{Context, anyhow};
use tracing::{info, warn};

use crate::domain::{AccountId, Cents, LedgerBalance, LedgerError};
use crate::storage::Repository;

use super::{AppError, PortalService, ValidationError};

impl PortalService {
    /// Current tuition balance. `None` means the account has no ledger yet,
    /// which is a legitimate state rather than a failure.
    pub async fn balance(&self, account_id: AccountId) -> Result<Option<LedgerBalance>, AppError> {
        Ok(Repository::get_ledger(self.repo.pool(), account_id).await?)
    }

    /// Record a tuition payment.
    ///
    /// The payment is applied in full or not at all. Concurrent payments
    /// against the same ledger are serialized by the store: the guarded update
    /// is the first statement of the unit of work, so the remaining balance is
    /// always checked against the latest committed `paid` amount.
    pub async fn apply_payment(
        &self,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<LedgerBalance, AppError> {
        if amount <= 0 {
            return Err(ValidationError::InvalidAmount(format!(
                "payment must be positive, got {} cents",
                amount
            ))
            .into());
        }

        let mut tx = self.repo.begin().await?;

        if let Some(updated) = Repository::apply_payment_guarded(&mut *tx, account_id, amount).await?
        {
            tx.commit().await.context("Failed to commit payment")?;
            info!(
                account_id = %account_id,
                amount,
                paid = updated.paid,
                overdue = updated.overdue,
                "payment applied"
            );
            return Ok(updated);
        }

        // Nothing was written. The transaction still holds the write lock
        // taken by the update, so this read sees the row the guard rejected.
        let current = Repository::get_ledger(&mut *tx, account_id).await?;
        tx.rollback().await.context("Failed to roll back payment")?;

        let Some(current) = current else {
            warn!(account_id = %account_id, "payment rejected: no ledger");
            return Err(AppError::NotFound(format!("ledger for account {}", account_id)));
        };

        match current.apply_payment(amount) {
            Err(LedgerError::ExceedsBalance { overdue, requested }) => {
                warn!(account_id = %account_id, overdue, requested, "payment rejected: exceeds balance");
                Err(AppError::Overpayment { overdue, requested })
            }
            Err(err) => Err(AppError::Database(anyhow!(err))),
            // The stored overdue disagrees with total - paid
            Ok(_) => Err(AppError::Database(anyhow!(
                "ledger for account {} is inconsistent",
                account_id
            ))),
        }
    }
}
