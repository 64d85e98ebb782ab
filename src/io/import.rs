use anyhow::Result;
use serde::Deserialize;
use std::io::Read;
use tracing::{debug, info};

use crate::application::{AppError, PortalService};
use crate::domain::{LedgerBalance, normalize_email, parse_cents};

/// Result of an import operation
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportError>,
}

/// Error that occurred during import
#[derive(Debug, Clone)]
pub struct ImportError {
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

/// Options for import operations
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Parse and validate every line without writing anything
    pub dry_run: bool,
    /// Count rows that already exist as skipped instead of as errors
    pub skip_duplicates: bool,
}

#[derive(Debug, Deserialize)]
struct CourseRecord {
    name: String,
    code: String,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    instructor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LedgerRecord {
    email: String,
    total_amount: String,
}

/// Importer for seeding the catalog and provisioning ledgers
pub struct Importer<'a> {
    service: &'a PortalService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a PortalService) -> Self {
        Self { service }
    }

    /// Import courses from CSV with a `name,code,icon,instructor` header.
    pub async fn import_courses_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut result = ImportResult::default();

        for (line_num, record) in csv_reader.deserialize::<CourseRecord>().enumerate() {
            let line = line_num + 2; // +2 for header and 0-indexing

            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    result.errors.push(parse_error(line, e));
                    continue;
                }
            };

            if options.dry_run {
                result.imported += 1;
                continue;
            }

            match self
                .service
                .add_course(
                    &record.name,
                    &record.code,
                    non_empty(record.icon),
                    non_empty(record.instructor),
                )
                .await
            {
                Ok(_) => result.imported += 1,
                Err(AppError::DuplicateCourse(_)) if options.skip_duplicates => {
                    debug!(line, code = %record.code, "course already in catalog");
                    result.skipped += 1;
                }
                Err(e) => result.errors.push(ImportError {
                    line,
                    field: Some("code".to_string()),
                    error: format!("Course creation failed: {}", e),
                }),
            }
        }

        info!(
            imported = result.imported,
            skipped = result.skipped,
            errors = result.errors.len(),
            "course import finished"
        );
        Ok(result)
    }

    /// Open ledgers from CSV with an `email,total_amount` header. Amounts are
    /// decimal strings ("1200.00").
    pub async fn import_ledgers_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut result = ImportResult::default();

        for (line_num, record) in csv_reader.deserialize::<LedgerRecord>().enumerate() {
            let line = line_num + 2;

            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    result.errors.push(parse_error(line, e));
                    continue;
                }
            };

            let total = match parse_cents(&record.total_amount) {
                Ok(total) => total,
                Err(e) => {
                    result.errors.push(ImportError {
                        line,
                        field: Some("total_amount".to_string()),
                        error: format!("Invalid amount: {}", e),
                    });
                    continue;
                }
            };

            let email = normalize_email(&record.email);
            let account = match self.service.repository().get_account_by_email(&email).await {
                Ok(Some(account)) => account,
                Ok(None) => {
                    result.errors.push(ImportError {
                        line,
                        field: Some("email".to_string()),
                        error: format!("No account with email {}", email),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Err(e) = LedgerBalance::open(account.id, total) {
                result.errors.push(ImportError {
                    line,
                    field: Some("total_amount".to_string()),
                    error: format!("Invalid amount: {}", e),
                });
                continue;
            }

            if options.dry_run {
                result.imported += 1;
                continue;
            }

            match self.service.open_ledger(account.id, total).await {
                Ok(_) => result.imported += 1,
                Err(AppError::LedgerExists(_)) if options.skip_duplicates => result.skipped += 1,
                Err(e) => result.errors.push(ImportError {
                    line,
                    field: None,
                    error: format!("Ledger creation failed: {}", e),
                }),
            }
        }

        info!(
            imported = result.imported,
            skipped = result.skipped,
            errors = result.errors.len(),
            "ledger import finished"
        );
        Ok(result)
    }
}

fn parse_error(line: usize, e: csv::Error) -> ImportError {
    ImportError {
        line,
        field: None,
        error: format!("CSV parse error: {}", e),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
