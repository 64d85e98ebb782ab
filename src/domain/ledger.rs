use serde::{Deserialize, Serialize};

use super::{AccountId, Cents};

/// Tuition ledger for one account.
///
/// The row always satisfies `overdue == total - paid` and `overdue >= 0`, and
/// `paid` never decreases. The only mutation is [`LedgerBalance::apply_payment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub account_id: AccountId,
    pub total: Cents,
    pub paid: Cents,
    pub overdue: Cents,
}

impl LedgerBalance {
    /// A freshly opened ledger: nothing paid, the whole obligation overdue.
    pub fn open(account_id: AccountId, total: Cents) -> Result<Self, LedgerError> {
        if total < 0 {
            return Err(LedgerError::NegativeTotal(total));
        }
        Ok(Self {
            account_id,
            total,
            paid: 0,
            overdue: total,
        })
    }

    pub fn is_consistent(&self) -> bool {
        self.paid >= 0 && self.overdue >= 0 && self.overdue == self.total - self.paid
    }

    pub fn is_settled(&self) -> bool {
        self.overdue == 0
    }

    /// Compute the balance after paying `amount`, without touching `self`.
    pub fn apply_payment(&self, amount: Cents) -> Result<Self, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if amount > self.overdue {
            return Err(LedgerError::ExceedsBalance {
                overdue: self.overdue,
                requested: amount,
            });
        }

        let paid = self.paid + amount;
        Ok(Self {
            account_id: self.account_id,
            total: self.total,
            paid,
            overdue: self.total - paid,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    NonPositiveAmount(Cents),
    NegativeTotal(Cents),
    ExceedsBalance { overdue: Cents, requested: Cents },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::NonPositiveAmount(amount) => {
                write!(f, "payment amount must be positive, got {} cents", amount)
            }
            LedgerError::NegativeTotal(total) => {
                write!(f, "ledger total cannot be negative, got {} cents", total)
            }
            LedgerError::ExceedsBalance { overdue, requested } => write!(
                f,
                "payment of {} cents exceeds remaining balance of {} cents",
                requested, overdue
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ledger(total: Cents, paid: Cents) -> LedgerBalance {
        LedgerBalance {
            account_id: Uuid::new_v4(),
            total,
            paid,
            overdue: total - paid,
        }
    }

    #[test]
    fn test_payment_settles_balance() {
        let before = ledger(1000, 200);
        let after = before.apply_payment(800).unwrap();

        assert_eq!(after.total, 1000);
        assert_eq!(after.paid, 1000);
        assert_eq!(after.overdue, 0);
        assert!(after.is_consistent());
        assert!(after.is_settled());
    }

    #[test]
    fn test_overpayment_rejected() {
        let settled = ledger(1000, 1000);
        assert_eq!(
            settled.apply_payment(1),
            Err(LedgerError::ExceedsBalance {
                overdue: 0,
                requested: 1
            })
        );
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let before = ledger(1000, 0);
        assert_eq!(before.apply_payment(0), Err(LedgerError::NonPositiveAmount(0)));
        assert_eq!(
            before.apply_payment(-5),
            Err(LedgerError::NonPositiveAmount(-5))
        );
    }

    #[test]
    fn test_partial_payments_accumulate() {
        let mut balance = ledger(900, 0);
        for _ in 0..3 {
            let next = balance.apply_payment(300).unwrap();
            assert!(next.paid > balance.paid);
            balance = next;
        }
        assert!(balance.is_settled());
        assert!(balance.apply_payment(300).is_err());
    }

    #[test]
    fn test_open_ledger() {
        let opened = LedgerBalance::open(Uuid::new_v4(), 5000).unwrap();
        assert_eq!(opened.paid, 0);
        assert_eq!(opened.overdue, 5000);
        assert!(LedgerBalance::open(Uuid::new_v4(), -1).is_err());
    }

    #[test]
    fn test_inconsistent_row_detected() {
        let mut row = ledger(1000, 200);
        row.overdue = 700;
        assert!(!row.is_consistent());
    }
}
