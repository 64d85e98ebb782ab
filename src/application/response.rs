use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;

use crate::domain::{AccountId, AccountSummary, Cents, LedgerBalance};

use super::AppError;

/// Structured result payload: `{"ok": true, ...}` or
/// `{"ok": false, "reason": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

#[derive(Serialize)]
struct BalanceBody {
    total: Cents,
    paid: Cents,
    overdue: Cents,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
            body: Map::new(),
        }
    }

    pub fn failure(reason: &str) -> Self {
        Self {
            ok: false,
            reason: Some(reason.to_string()),
            body: Map::new(),
        }
    }

    /// Failure payload for an error. Internal errors are logged here because
    /// their details are dropped from the payload.
    pub fn from_error(err: &AppError) -> Self {
        if !err.is_client_error() {
            error!(error = %err, "request failed");
        }
        Self::failure(err.reason())
    }

    /// Merge the fields of a struct into the top level of the payload.
    /// Values that do not serialize to an object are ignored.
    pub fn merge(mut self, value: impl Serialize) -> Self {
        if let Ok(Value::Object(fields)) = serde_json::to_value(value) {
            self.body.extend(fields);
        }
        self
    }

    pub fn provisioned(result: Result<AccountId, AppError>) -> Self {
        match result {
            Ok(id) => Self::ok().with_field("account_id", id),
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn payment(result: Result<LedgerBalance, AppError>) -> Self {
        match result {
            Ok(balance) => Self::ok().with_balance(&balance),
            Err(err) => Self::from_error(&err),
        }
    }

    /// A missing ledger is reported as `not_found` rather than an empty
    /// success.
    pub fn balance(result: Result<Option<LedgerBalance>, AppError>) -> Self {
        match result {
            Ok(Some(balance)) => Self::ok().with_balance(&balance),
            Ok(None) => Self::failure("not_found"),
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn login(result: Result<AccountSummary, AppError>) -> Self {
        match result {
            Ok(account) => Self::ok().with_field("account", account),
            Err(err) => Self::from_error(&err),
        }
    }

    /// Payload for operations whose success carries no data.
    pub fn done<T>(result: Result<T, AppError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => Self::from_error(&err),
        }
    }

    fn with_balance(self, balance: &LedgerBalance) -> Self {
        self.merge(BalanceBody {
            total: balance.total,
            paid: balance.paid,
            overdue: balance.overdue,
        })
    }

    /// Insert `value` under `key` without flattening objects.
    pub fn with_field(mut self, key: &str, value: impl Serialize) -> Self {
        // Values here are plain structs, ids and numbers, which always serialize
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.body.insert(key.to_string(), value);
        self
    }
}
