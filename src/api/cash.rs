use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::cash::{CashPayment, CashReceive},
    models::paging,
    utils::db_utils::{Filters, day_range},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, sqlite::SqliteRow};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
pub struct CashQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Inclusive start date (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    /// Inclusive end date (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    /// Matches voucher, party or description
    pub search: Option<String>,
}

/// A cash page plus the total amount over every matching row.
#[derive(Serialize, ToSchema)]
#[aliases(CashReceivePage = CashPage<CashReceive>, CashPaymentPage = CashPage<CashPayment>)]
pub struct CashPage<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    #[schema(example = 15250.5)]
    pub total_amount: f64,
}

struct Ledger {
    table: &'static str,
    party_column: &'static str,
}

const RECEIVES: Ledger = Ledger {
    table: "cash_receives",
    party_column: "received_from",
};

const PAYMENTS: Ledger = Ledger {
    table: "cash_payments",
    party_column: "paid_to",
};

async fn list_ledger<T>(
    pool: &SqlitePool,
    ledger: &Ledger,
    query: &CashQuery,
) -> AppResult<CashPage<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::BadRequest("from cannot be after to".into()));
        }
    }
    let (page, per_page, offset) = paging(query.page, query.per_page);

    let mut filters = Filters::new();
    day_range(&mut filters, "entry_date", query.from, query.to);
    if let Some(term) = &query.search {
        filters.search(&["voucher_no", ledger.party_column, "description"], term);
    }
    let where_sql = filters.where_sql();

    let (total, total_amount) = filters
        .bind_as(sqlx::query_as::<_, (i64, f64)>(&format!(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0.0) FROM {}{where_sql}",
            ledger.table
        )))
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT id, voucher_no, entry_date, {party}, description, amount, account \
         FROM {table}{where_sql} \
         ORDER BY entry_date DESC, id DESC LIMIT ? OFFSET ?",
        party = ledger.party_column,
        table = ledger.table,
    );
    let data = filters
        .bind_as(sqlx::query_as::<_, T>(&data_sql))
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(CashPage {
        data,
        page,
        per_page,
        total,
        total_amount,
    })
}

/// List cash receives
#[utoipa::path(
    get,
    path = "/api/cash/receives",
    params(CashQuery),
    responses(
        (status = 200, description = "Paginated receives with total amount", body = CashReceivePage),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Cash"
)]
pub async fn list_receives(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<CashQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let page: CashPage<CashReceive> = list_ledger(pool.get_ref(), &RECEIVES, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// List cash payments
#[utoipa::path(
    get,
    path = "/api/cash/payments",
    params(CashQuery),
    responses(
        (status = 200, description = "Paginated payments with total amount", body = CashPaymentPage),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Cash"
)]
pub async fn list_payments(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<CashQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let page: CashPage<CashPayment> = list_ledger(pool.get_ref(), &PAYMENTS, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}
