use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    sqlx::Type,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Hr,
    Employee,
}

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }
}
