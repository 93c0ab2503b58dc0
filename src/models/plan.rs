use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use crate::entities::PlanId;

/// Static catalog entry for one plan tier. Built at compile time, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlanDefinition {
    pub id: PlanId,
    /// None = unlimited.
    pub token_allowance: Option<i64>,
    pub max_characters: Option<i32>,
    pub max_projects: Option<i32>,
    pub price_minor_units: i64,
    pub billing_interval_days: i64,
}

impl PlanId {
    /// Catalog lookup. Exhaustive on purpose: adding a plan without a
    /// definition is a compile error, not a runtime `None`.
    pub fn definition(self) -> PlanDefinition {
        match self {
            PlanId::Free => PlanDefinition {
                id: PlanId::Free,
                token_allowance: Some(10),
                max_characters: Some(2),
                max_projects: Some(3),
                price_minor_units: 0,
                billing_interval_days: 30,
            },
            PlanId::Personal => PlanDefinition {
                id: PlanId::Personal,
                token_allowance: Some(100),
                max_characters: Some(10),
                max_projects: Some(20),
                price_minor_units: 9900,
                billing_interval_days: 30,
            },
            PlanId::Heavy => PlanDefinition {
                id: PlanId::Heavy,
                token_allowance: Some(300),
                max_characters: Some(30),
                max_projects: Some(50),
                price_minor_units: 29900,
                billing_interval_days: 30,
            },
            PlanId::Enterprise => PlanDefinition {
                id: PlanId::Enterprise,
                token_allowance: None,
                max_characters: None,
                max_projects: None,
                price_minor_units: 99000,
                billing_interval_days: 30,
            },
        }
    }

    pub fn parse(s: &str) -> Option<PlanId> {
        match s {
            "free" => Some(PlanId::Free),
            "personal" => Some(PlanId::Personal),
            "heavy" => Some(PlanId::Heavy),
            "enterprise" => Some(PlanId::Enterprise),
            _ => None,
        }
    }

    /// Paid plans are the only valid plan-change targets.
    pub fn is_paid(self) -> bool {
        !matches!(self, PlanId::Free)
    }
}
