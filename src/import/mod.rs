//! Spreadsheet import: one engine for every record type that used to have
//! its own script. A target declares its columns (with the header spellings
//! seen in the wild) and how to upsert one row; header detection, row
//! skipping and reporting are shared.

pub mod cash;
pub mod columns;
pub mod employees;
pub mod sheet;
pub mod values;

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use strum::{AsRefStr, Display, EnumString};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::AppResult;
use columns::{ColumnMap, FieldSpec, detect_header};
use sheet::{Sheet, read_sheet};

/// Every target keeps its identifier column first.
pub const IDENTIFIER: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, clap::ValueEnum)]
#[strum(serialize_all = "kebab-case")]
pub enum ImportTarget {
    Employees,
    CashReceives,
    CashPayments,
}

impl ImportTarget {
    fn specs(&self) -> &'static [FieldSpec] {
        match self {
            ImportTarget::Employees => employees::FIELDS,
            ImportTarget::CashReceives => cash::RECEIVE_FIELDS,
            ImportTarget::CashPayments => cash::PAYMENT_FIELDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct RowIssue {
    /// 1-based row number as shown by spreadsheet programs
    #[schema(example = 7)]
    pub row: usize,
    #[schema(example = "missing full name")]
    pub message: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    /// rows without an identifier
    pub skipped: usize,
    /// rows that were not imported
    pub errors: Vec<RowIssue>,
    /// rows imported with a value dropped
    pub warnings: Vec<RowIssue>,
}

impl ImportReport {
    pub(crate) fn warn(&mut self, row: usize, message: impl Into<String>) {
        self.warnings.push(RowIssue {
            row,
            message: message.into(),
        });
    }
}

pub(crate) enum RowOutcome {
    Inserted,
    Updated,
    Rejected(String),
}

pub async fn run_import(
    pool: &SqlitePool,
    target: ImportTarget,
    bytes: &[u8],
) -> AppResult<ImportReport> {
    let sheet = read_sheet(bytes)?;
    import_sheet(pool, target, &sheet).await
}

/// All rows go in one transaction; a database failure leaves nothing behind.
pub async fn import_sheet(
    pool: &SqlitePool,
    target: ImportTarget,
    sheet: &Sheet,
) -> AppResult<ImportReport> {
    let (header_index, map) = detect_header(&sheet.rows, target.specs(), IDENTIFIER)?;
    info!(%target, header_row = header_index + 1, columns = map.matched(), "Importing spreadsheet");

    let mut report = ImportReport::default();
    let mut tx = pool.begin().await?;

    for (index, row) in sheet.rows.iter().enumerate().skip(header_index + 1) {
        let line = index + 1;

        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if map.value(row, IDENTIFIER).is_empty() {
            report.skipped += 1;
            continue;
        }

        let outcome = import_row(&mut *tx, target, &map, row, line, &mut report).await?;
        match outcome {
            RowOutcome::Inserted => report.inserted += 1,
            RowOutcome::Updated => report.updated += 1,
            RowOutcome::Rejected(message) => {
                warn!(%target, row = line, %message, "Row rejected");
                report.errors.push(RowIssue { row: line, message });
            }
        }
    }

    tx.commit().await?;

    info!(
        %target,
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        errors = report.errors.len(),
        "Import finished"
    );
    Ok(report)
}

async fn import_row(
    conn: &mut SqliteConnection,
    target: ImportTarget,
    map: &ColumnMap,
    row: &[String],
    line: usize,
    report: &mut ImportReport,
) -> AppResult<RowOutcome> {
    match target {
        ImportTarget::Employees => employees::import_row(conn, map, row, line, report).await,
        ImportTarget::CashReceives => cash::import_receive(conn, map, row, line, report).await,
        ImportTarget::CashPayments => cash::import_payment(conn, map, row, line, report).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn targets_parse_from_url_segments() {
        assert_eq!(ImportTarget::from_str("employees").unwrap(), ImportTarget::Employees);
        assert_eq!(
            ImportTarget::from_str("cash-receives").unwrap(),
            ImportTarget::CashReceives
        );
        assert!(ImportTarget::from_str("payroll").is_err());
    }
}
