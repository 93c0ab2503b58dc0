use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "token_transaction_reason"
)]
#[serde(rename_all = "snake_case")]
pub enum TokenTransactionReason {
    #[sea_orm(string_value = "generation")]
    Generation,
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "renewal_grant")]
    RenewalGrant,
    #[sea_orm(string_value = "admin_adjustment")]
    AdminAdjustment,
}

impl std::fmt::Display for TokenTransactionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenTransactionReason::Generation => write!(f, "generation"),
            TokenTransactionReason::Purchase => write!(f, "purchase"),
            TokenTransactionReason::RenewalGrant => write!(f, "renewal_grant"),
            TokenTransactionReason::AdminAdjustment => write!(f, "admin_adjustment"),
        }
    }
}

/// Append-only usage ledger. Rows are never updated or deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "token_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    /// Positive = grant, negative = debit.
    pub amount: i64,
    pub reason: TokenTransactionReason,
    /// Remaining tokens after this entry; None while on an unlimited plan.
    pub balance_after: Option<i64>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
