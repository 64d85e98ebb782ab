// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use bursar::application::PortalService;
use bursar::domain::{AccountId, Cents, CourseId};
use sqlx::Row;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(PortalService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = PortalService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Test fixture: a small course catalog
pub struct StandardCatalog {
    pub algorithms: CourseId,
    pub calculus: CourseId,
    pub physics: CourseId,
}

impl StandardCatalog {
    /// Three courses; ordered by code, CS101 and MA101 are the defaults
    pub async fn create(service: &PortalService) -> Result<Self> {
        let physics = service
            .add_course("Physics I", "PH101", Some("atom".into()), None)
            .await?;
        let algorithms = service
            .add_course("Algorithms", "CS101", Some("code".into()), Some("Dr. Hopper".into()))
            .await?;
        let calculus = service
            .add_course("Calculus", "MA101", None, Some("Dr. Noether".into()))
            .await?;
        Ok(Self {
            algorithms: algorithms.id,
            calculus: calculus.id,
            physics: physics.id,
        })
    }
}

/// Provision a student and open a ledger with some amount already paid
pub async fn student_with_ledger(
    service: &PortalService,
    email: &str,
    total: Cents,
    paid: Cents,
) -> Result<AccountId> {
    let id = service.provision("Student", email, "secret").await?;
    service.open_ledger(id, total).await?;
    if paid > 0 {
        service.apply_payment(id, paid).await?;
    }
    Ok(id)
}

/// Count rows in a table, optionally filtered by account
pub async fn count_rows(service: &PortalService, table: &str, account: Option<AccountId>) -> Result<i64> {
    let pool = service.repository().pool();
    let row = match account {
        Some(id) => {
            let column = if table == "accounts" { "id" } else { "account_id" };
            sqlx::query(&format!("SELECT COUNT(*) as count FROM {} WHERE {} = ?", table, column))
                .bind(id.to_string())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query(&format!("SELECT COUNT(*) as count FROM {}", table))
                .fetch_one(pool)
                .await?
        }
    };
    Ok(row.get("count"))
}
