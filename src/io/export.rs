use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::PortalService;
use crate::domain::{Course, LedgerBalance, format_cents};

/// Ledger snapshot for JSON export
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub courses: Vec<Course>,
    pub ledgers: Vec<LedgerBalance>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a PortalService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a PortalService) -> Self {
        Self { service }
    }

    /// Export every ledger balance to CSV
    pub async fn export_ledgers_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let ledgers = self.service.list_ledgers().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["account_id", "total", "paid", "overdue"])?;

        for ledger in &ledgers {
            csv_writer.write_record([
                ledger.account_id.to_string(),
                format_cents(ledger.total),
                format_cents(ledger.paid),
                format_cents(ledger.overdue),
            ])?;
        }

        csv_writer.flush()?;
        Ok(ledgers.len())
    }

    /// Export the catalog and all ledgers as a JSON snapshot
    pub async fn export_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            courses: self.service.list_courses().await?,
            ledgers: self.service.list_ledgers().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
