use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteExecutor, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Cents, Course, CourseId, Enrollment, EnrollmentStatus, LedgerBalance,
    Profile, Role,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_LEDGERS};

/// Connection settings for the SQLite store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: String,
    pub create_if_missing: bool,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: false,
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

}

/// Raw counts used by the integrity check.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub account_count: i64,
    pub enrollment_count: i64,
    pub accounts_without_profile: i64,
    pub orphan_enrollments: i64,
}

/// Repository for persisting and querying accounts, courses, enrollments and
/// ledgers.
///
/// Statements that take part in a unit of work are associated functions over
/// any [`SqliteExecutor`], so the caller decides whether they run on the pool
/// or inside a transaction from [`Repository::begin`].
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for the configured database file.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_LEDGERS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let repo = Self::connect(config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a unit of work. Dropping the transaction without committing
    /// rolls it back and returns the connection to the pool.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================
    // Account operations
    // ========================

    /// Insert a new account row.
    pub async fn insert_account<'e, E>(executor: E, account: &Account) -> Result<()>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, password_hash, role, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.created_at.to_rfc3339())
        .execute(executor)
        .await
        .context("Failed to insert account")?;
        Ok(())
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, password_hash, role, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Get an account by its (normalized) email.
    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, password_hash, role, created_at
            FROM accounts
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by email")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn count_accounts_with_email(&self, email: &str) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count accounts")?
            .get("count");
        Ok(count)
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let role_str: String = row.get("role");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            name: row.get("name"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid role: {}", role_str))?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Profile operations
    // ========================

    /// Insert the profile unless a row for its account already exists.
    /// Returns whether a row was inserted.
    pub async fn insert_profile_if_absent<'e, E>(executor: E, profile: &Profile) -> Result<bool>
    where
        E: SqliteExecutor<'e>,
    {
        let id = profile.account_id.to_string();
        let result = sqlx::query(
            r#"
            INSERT INTO profiles (account_id, registration_no, phone, department, year, gpa)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (SELECT 1 FROM profiles WHERE account_id = ?)
            "#,
        )
        .bind(&id)
        .bind(&profile.registration_no)
        .bind(&profile.phone)
        .bind(&profile.department)
        .bind(profile.year)
        .bind(profile.gpa)
        .bind(&id)
        .execute(executor)
        .await
        .context("Failed to insert profile")?;
        Ok(result.rows_affected() == 1)
    }

    /// Update the profile row, returning whether one existed.
    pub async fn update_profile<'e, E>(executor: E, profile: &Profile) -> Result<bool>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET registration_no = ?, phone = ?, department = ?, year = ?, gpa = ?
            WHERE account_id = ?
            "#,
        )
        .bind(&profile.registration_no)
        .bind(&profile.phone)
        .bind(&profile.department)
        .bind(profile.year)
        .bind(profile.gpa)
        .bind(profile.account_id.to_string())
        .execute(executor)
        .await
        .context("Failed to update profile")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_profile<'e, E>(executor: E, profile: &Profile) -> Result<()>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO profiles (account_id, registration_no, phone, department, year, gpa)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(profile.account_id.to_string())
        .bind(&profile.registration_no)
        .bind(&profile.phone)
        .bind(&profile.department)
        .bind(profile.year)
        .bind(profile.gpa)
        .execute(executor)
        .await
        .context("Failed to insert profile")?;
        Ok(())
    }

    pub async fn get_profile(&self, account_id: AccountId) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, registration_no, phone, department, year, gpa
            FROM profiles
            WHERE account_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch profile")?;

        match row {
            Some(row) => {
                let id_str: String = row.get("account_id");
                Ok(Some(Profile {
                    account_id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
                    registration_no: row.get("registration_no"),
                    phone: row.get("phone"),
                    department: row.get("department"),
                    year: row.get("year"),
                    gpa: row.get("gpa"),
                }))
            }
            None => Ok(None),
        }
    }

    // ========================
    // Course operations
    // ========================

    pub async fn insert_course(&self, course: &Course) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, name, code, icon, instructor)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(course.id.to_string())
        .bind(&course.name)
        .bind(&course.code)
        .bind(&course.icon)
        .bind(&course.instructor)
        .execute(&self.pool)
        .await
        .context("Failed to insert course")?;
        Ok(())
    }

    /// List the catalog, ordered by course code.
    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query("SELECT id, name, code, icon, instructor FROM courses ORDER BY code")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list courses")?;

        rows.iter().map(Self::row_to_course).collect()
    }

    /// Courses with an active enrollment for the account.
    pub async fn list_enrolled_courses(&self, account_id: AccountId) -> Result<Vec<Course>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.code, c.icon, c.instructor
            FROM enrollments e
            JOIN courses c ON e.course_id = c.id
            WHERE e.account_id = ? AND e.status = 'active'
            ORDER BY c.code
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list enrolled courses")?;

        rows.iter().map(Self::row_to_course).collect()
    }

    /// The courses every new account is enrolled in. Ordered by code so the
    /// choice is stable.
    pub async fn list_default_courses<'e, E>(executor: E, limit: i64) -> Result<Vec<CourseId>>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query("SELECT id FROM courses ORDER BY code LIMIT ?")
            .bind(limit)
            .fetch_all(executor)
            .await
            .context("Failed to list default courses")?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("id");
                Uuid::parse_str(&id_str).context("Invalid course ID")
            })
            .collect()
    }

    fn row_to_course(row: &SqliteRow) -> Result<Course> {
        let id_str: String = row.get("id");
        Ok(Course {
            id: Uuid::parse_str(&id_str).context("Invalid course ID")?,
            name: row.get("name"),
            code: row.get("code"),
            icon: row.get("icon"),
            instructor: row.get("instructor"),
        })
    }

    // ========================
    // Enrollment operations
    // ========================

    /// Insert an active enrollment unless the pair is already present.
    /// Returns whether a row was inserted.
    pub async fn insert_enrollment_if_absent<'e, E>(
        executor: E,
        account_id: AccountId,
        course_id: CourseId,
        enrolled_at: DateTime<Utc>,
    ) -> Result<bool>
    where
        E: SqliteExecutor<'e>,
    {
        let account = account_id.to_string();
        let course = course_id.to_string();
        let result = sqlx::query(
            r#"
            INSERT INTO enrollments (account_id, course_id, status, enrolled_at)
            SELECT ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM enrollments WHERE account_id = ? AND course_id = ?
            )
            "#,
        )
        .bind(&account)
        .bind(&course)
        .bind(EnrollmentStatus::Active.as_str())
        .bind(enrolled_at.to_rfc3339())
        .bind(&account)
        .bind(&course)
        .execute(executor)
        .await
        .context("Failed to insert enrollment")?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete the enrollment, returning whether a row existed.
    pub async fn delete_enrollment<'e, E>(
        executor: E,
        account_id: AccountId,
        course_id: CourseId,
    ) -> Result<bool>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM enrollments WHERE account_id = ? AND course_id = ?")
            .bind(account_id.to_string())
            .bind(course_id.to_string())
            .execute(executor)
            .await
            .context("Failed to delete enrollment")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_enrollments(&self, account_id: AccountId) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, course_id, status, enrolled_at
            FROM enrollments
            WHERE account_id = ?
            ORDER BY enrolled_at, course_id
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list enrollments")?;

        rows.iter().map(Self::row_to_enrollment).collect()
    }

    fn row_to_enrollment(row: &SqliteRow) -> Result<Enrollment> {
        let account_str: String = row.get("account_id");
        let course_str: String = row.get("course_id");
        let status_str: String = row.get("status");
        let enrolled_at_str: String = row.get("enrolled_at");

        Ok(Enrollment {
            account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
            course_id: Uuid::parse_str(&course_str).context("Invalid course ID")?,
            status: EnrollmentStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid enrollment status: {}", status_str))?,
            enrolled_at: DateTime::parse_from_rfc3339(&enrolled_at_str)
                .context("Invalid enrolled_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Ledger operations
    // ========================

    pub async fn insert_ledger<'e, E>(executor: E, ledger: &LedgerBalance) -> Result<()>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO ledgers (account_id, total_amount, paid_amount, overdue_amount)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(ledger.account_id.to_string())
        .bind(ledger.total)
        .bind(ledger.paid)
        .bind(ledger.overdue)
        .execute(executor)
        .await
        .context("Failed to insert ledger")?;
        Ok(())
    }

    pub async fn get_ledger<'e, E>(executor: E, account_id: AccountId) -> Result<Option<LedgerBalance>>
    where
        E: SqliteExecutor<'e>,
    {
        let row = sqlx::query(
            r#"
            SELECT account_id, total_amount, paid_amount, overdue_amount
            FROM ledgers
            WHERE account_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to fetch ledger")?;

        row.as_ref().map(Self::row_to_ledger).transpose()
    }

    /// Add `amount` to the paid total only while the remaining balance covers
    /// it. The guard and the write are one statement, so the check cannot be
    /// made against a stale `paid_amount`. Returns `None` when the row is
    /// missing or the guard rejected the payment.
    pub async fn apply_payment_guarded<'e, E>(
        executor: E,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<Option<LedgerBalance>>
    where
        E: SqliteExecutor<'e>,
    {
        let row = sqlx::query(
            r#"
            UPDATE ledgers
            SET paid_amount = paid_amount + ?1,
                overdue_amount = total_amount - (paid_amount + ?1)
            WHERE account_id = ?2 AND total_amount - paid_amount >= ?1
            RETURNING account_id, total_amount, paid_amount, overdue_amount
            "#,
        )
        .bind(amount)
        .bind(account_id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to apply payment")?;

        row.as_ref().map(Self::row_to_ledger).transpose()
    }

    pub async fn list_ledgers(&self) -> Result<Vec<LedgerBalance>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, total_amount, paid_amount, overdue_amount
            FROM ledgers
            ORDER BY account_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ledgers")?;

        rows.iter().map(Self::row_to_ledger).collect()
    }

    fn row_to_ledger(row: &SqliteRow) -> Result<LedgerBalance> {
        let id_str: String = row.get("account_id");
        Ok(LedgerBalance {
            account_id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            total: row.get("total_amount"),
            paid: row.get("paid_amount"),
            overdue: row.get("overdue_amount"),
        })
    }

    // ========================
    // Integrity
    // ========================

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let account_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM accounts")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let enrollment_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM enrollments")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let accounts_without_profile: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM accounts a
            WHERE NOT EXISTS (SELECT 1 FROM profiles p WHERE p.account_id = a.id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        let orphan_enrollments: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM enrollments e
            WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = e.account_id)
               OR NOT EXISTS (SELECT 1 FROM courses c WHERE c.id = e.course_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            account_count,
            enrollment_count,
            accounts_without_profile,
            orphan_enrollments,
        })
    }
}
