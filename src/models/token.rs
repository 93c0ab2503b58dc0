use crate::entities::{token_transaction_entity, TokenTransactionReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenBalanceResponse {
    /// None = unlimited plan.
    pub tokens_total: Option<i64>,
    pub tokens_used: i64,
    /// Clamped at 0 for display; None = unlimited.
    pub tokens_remaining: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsumeTokensRequest {
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsumeTokensResponse {
    pub debited: i64,
    pub balance: TokenBalanceResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UsageHistoryQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenTransactionResponse {
    pub id: i64,
    pub amount: i64,
    pub reason: TokenTransactionReason,
    pub balance_after: Option<i64>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<token_transaction_entity::Model> for TokenTransactionResponse {
    fn from(m: token_transaction_entity::Model) -> Self {
        Self {
            id: m.id,
            amount: m.amount,
            reason: m.reason,
            balance_after: m.balance_after,
            description: m.description,
            created_at: m.created_at,
        }
    }
}
