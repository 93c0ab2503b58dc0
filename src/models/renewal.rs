use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenewalOutcome {
    Success,
    Failed,
}

/// Per-subscription result of one scheduler pass. Transient, never persisted.
#[derive(Debug, Serialize, ToSchema)]
pub struct RenewalResult {
    pub subscription_id: i64,
    pub user_id: i64,
    pub outcome: RenewalOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charged_amount: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<RenewalResult>,
}
