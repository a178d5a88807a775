use sqlx::SqliteConnection;

use crate::error::AppResult;

use super::columns::{ColumnMap, FieldSpec};
use super::values::{non_empty, parse_amount, parse_date};
use super::{IDENTIFIER, ImportReport, RowOutcome};

const DATE: usize = 1;
const PARTY: usize = 2;
const DESCRIPTION: usize = 3;
const AMOUNT: usize = 4;
const ACCOUNT: usize = 5;

const VOUCHER_ALIASES: &[&str] = &[
    "voucher no",
    "voucher number",
    "vr no",
    "voucher",
    "receipt no",
    "receipt number",
    "ref no",
    "reference no",
    "reference",
];
const DATE_ALIASES: &[&str] = &["date", "entry date", "voucher date", "transaction date", "txn date"];
const DESCRIPTION_ALIASES: &[&str] = &["description", "particulars", "narration", "details", "purpose", "remarks"];
const ACCOUNT_ALIASES: &[&str] = &["account", "account head", "account name", "head", "ledger"];

pub const RECEIVE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "voucher_no",
        aliases: VOUCHER_ALIASES,
    },
    FieldSpec {
        name: "entry_date",
        aliases: DATE_ALIASES,
    },
    FieldSpec {
        name: "received_from",
        aliases: &["received from", "receive from", "from", "payer", "party", "customer", "name"],
    },
    FieldSpec {
        name: "description",
        aliases: DESCRIPTION_ALIASES,
    },
    FieldSpec {
        name: "amount",
        aliases: &["amount", "received amount", "amount tk", "credit", "total", "taka"],
    },
    FieldSpec {
        name: "account",
        aliases: ACCOUNT_ALIASES,
    },
];

pub const PAYMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "voucher_no",
        aliases: VOUCHER_ALIASES,
    },
    FieldSpec {
        name: "entry_date",
        aliases: DATE_ALIASES,
    },
    FieldSpec {
        name: "paid_to",
        aliases: &["paid to", "pay to", "payee", "to", "party", "vendor", "supplier", "name"],
    },
    FieldSpec {
        name: "description",
        aliases: DESCRIPTION_ALIASES,
    },
    FieldSpec {
        name: "amount",
        aliases: &["amount", "paid amount", "amount tk", "debit", "total", "taka"],
    },
    FieldSpec {
        name: "account",
        aliases: ACCOUNT_ALIASES,
    },
];

/// Values shared by both cash tables.
struct CashRow {
    voucher_no: String,
    entry_date: Option<chrono::NaiveDate>,
    party: Option<String>,
    description: Option<String>,
    amount: f64,
    account: Option<String>,
}

fn parse_row(
    map: &ColumnMap,
    row: &[String],
    line: usize,
    report: &mut ImportReport,
) -> Result<CashRow, String> {
    let voucher_no = map.value(row, IDENTIFIER).to_string();

    let amount = match map.value(row, AMOUNT) {
        "" => return Err(format!("voucher {voucher_no}: missing amount")),
        raw => parse_amount(raw)
            .ok_or_else(|| format!("voucher {voucher_no}: invalid amount '{raw}'"))?,
    };

    let entry_date = match map.value(row, DATE) {
        "" => None,
        raw => {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                report.warn(line, format!("unrecognised date '{raw}'"));
            }
            parsed
        }
    };

    Ok(CashRow {
        voucher_no,
        entry_date,
        party: non_empty(map.value(row, PARTY)),
        description: non_empty(map.value(row, DESCRIPTION)),
        amount,
        account: non_empty(map.value(row, ACCOUNT)),
    })
}

/// `table` and `party_column` are compile-time constants below.
async fn upsert(
    conn: &mut SqliteConnection,
    table: &str,
    party_column: &str,
    cash: CashRow,
) -> AppResult<RowOutcome> {
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {table} WHERE voucher_no = ?)"
    ))
    .bind(&cash.voucher_no)
    .fetch_one(&mut *conn)
    .await?;

    let sql = format!(
        r#"
        INSERT INTO {table} (voucher_no, entry_date, {party_column}, description, amount, account)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(voucher_no) DO UPDATE SET
            entry_date = COALESCE(excluded.entry_date, {table}.entry_date),
            {party_column} = COALESCE(excluded.{party_column}, {table}.{party_column}),
            description = COALESCE(excluded.description, {table}.description),
            amount = excluded.amount,
            account = COALESCE(excluded.account, {table}.account)
        "#
    );

    sqlx::query(&sql)
        .bind(&cash.voucher_no)
        .bind(cash.entry_date)
        .bind(&cash.party)
        .bind(&cash.description)
        .bind(cash.amount)
        .bind(&cash.account)
        .execute(&mut *conn)
        .await?;

    Ok(if exists {
        RowOutcome::Updated
    } else {
        RowOutcome::Inserted
    })
}

pub(crate) async fn import_receive(
    conn: &mut SqliteConnection,
    map: &ColumnMap,
    row: &[String],
    line: usize,
    report: &mut ImportReport,
) -> AppResult<RowOutcome> {
    match parse_row(map, row, line, report) {
        Ok(cash) => upsert(conn, "cash_receives", "received_from", cash).await,
        Err(message) => Ok(RowOutcome::Rejected(message)),
    }
}

pub(crate) async fn import_payment(
    conn: &mut SqliteConnection,
    map: &ColumnMap,
    row: &[String],
    line: usize,
    report: &mut ImportReport,
) -> AppResult<RowOutcome> {
    match parse_row(map, row, line, report) {
        Ok(cash) => upsert(conn, "cash_payments", "paid_to", cash).await,
        Err(message) => Ok(RowOutcome::Rejected(message)),
    }
}
