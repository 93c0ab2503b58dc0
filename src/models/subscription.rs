use crate::entities::{subscription_entity, PlanId, SubscriptionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlanChangeRequest {
    pub plan_id: String,
}

/// Payload handed to the front-end payment widget to collect a payment
/// method. The widget redirects back to `/billing/callback` with an authKey.
#[derive(Debug, Serialize, ToSchema)]
pub struct BillingAuthRequest {
    pub client_key: String,
    pub customer_key: String,
    pub plan_id: PlanId,
    pub amount: i64,
    pub order_name: String,
    pub customer_email: String,
    pub customer_name: String,
    pub success_url: String,
    pub fail_url: String,
}

/// Subscription as exposed over HTTP. The billing key itself never leaves
/// the server; only cached card metadata does.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub plan: PlanId,
    pub status: SubscriptionStatus,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub tokens_total: Option<i64>,
    pub tokens_used: i64,
    pub tokens_remaining: Option<i64>,
}

impl From<subscription_entity::Model> for SubscriptionResponse {
    fn from(m: subscription_entity::Model) -> Self {
        let tokens_remaining = m.tokens_total.map(|t| (t - m.tokens_used).max(0));
        Self {
            id: m.id,
            plan: m.plan,
            status: m.status,
            card_brand: m.card_brand,
            card_last4: m.card_last4,
            current_period_start: m.current_period_start,
            current_period_end: m.current_period_end,
            tokens_total: m.tokens_total,
            tokens_used: m.tokens_used,
            tokens_remaining,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BillingCallbackQuery {
    #[serde(rename = "authKey")]
    pub auth_key: String,
    #[serde(rename = "customerKey")]
    pub customer_key: String,
    #[serde(rename = "planId")]
    pub plan_id: String,
}
