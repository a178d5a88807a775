use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct CashReceive {
    pub id: i64,
    #[schema(example = "CR-0001")]
    pub voucher_no: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub entry_date: Option<NaiveDate>,
    pub received_from: Option<String>,
    pub description: Option<String>,
    #[schema(example = 1500.0)]
    pub amount: f64,
    pub account: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct CashPayment {
    pub id: i64,
    #[schema(example = "CP-0001")]
    pub voucher_no: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub entry_date: Option<NaiveDate>,
    pub paid_to: Option<String>,
    pub description: Option<String>,
    #[schema(example = 420.5)]
    pub amount: f64,
    pub account: Option<String>,
}
