use crate::entities::{subscription_entity as sub, PlanId, SubscriptionStatus};
use crate::error::{AppError, AppResult};
use crate::models::{BatchSummary, RenewalOutcome, RenewalResult};
use crate::services::SubscriptionService;
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;

/// Daily batch driven by the `/cron/recurring-payments` trigger: renews every
/// due subscription while keeping one item's failure from touching the rest.
#[derive(Clone)]
pub struct RecurringBillingService {
    pool: Arc<DatabaseConnection>,
    subscription_service: SubscriptionService,
}

impl RecurringBillingService {
    pub fn new(pool: Arc<DatabaseConnection>, subscription_service: SubscriptionService) -> Self {
        Self {
            pool,
            subscription_service,
        }
    }

    /// One pass over everything due for renewal.
    ///
    /// The selection snapshot is taken once at run start, so no subscription
    /// is processed twice within a run, and a successful renewal advances
    /// `current_period_end` past now, which keeps an immediate re-run from
    /// selecting it again. PastDue rows are included so the next scheduled
    /// run re-attempts yesterday's failures.
    pub async fn run(&self) -> AppResult<BatchSummary> {
        let now = Utc::now();
        let due = sub::Entity::find()
            .filter(
                sub::Column::Status
                    .is_in([SubscriptionStatus::Active, SubscriptionStatus::PastDue]),
            )
            .filter(sub::Column::CurrentPeriodEnd.lte(now))
            // the free tier has nothing to charge
            .filter(sub::Column::Plan.ne(PlanId::Free))
            .order_by_asc(sub::Column::Id)
            .all(self.pool.as_ref())
            .await?;

        log::info!("Recurring billing run: {} subscription(s) due", due.len());

        let mut results: Vec<RenewalResult> = Vec::with_capacity(due.len());
        for row in due {
            let subscription_id = row.id;
            let user_id = row.user_id;
            // Failure isolation: renew_one folds gateway declines into the
            // result itself; anything else (storage failures included) is
            // recorded here instead of aborting the batch.
            match self.subscription_service.renew_one(row).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    log::error!("Renewal of subscription {subscription_id} errored: {e:?}");
                    let error_kind = match e {
                        AppError::GatewayError { code } => code,
                        _ => "INTERNAL".to_string(),
                    };
                    results.push(RenewalResult {
                        subscription_id,
                        user_id,
                        outcome: RenewalOutcome::Failed,
                        error_kind: Some(error_kind),
                        charged_amount: None,
                    });
                }
            }
        }

        let successful = results
            .iter()
            .filter(|r| r.outcome == RenewalOutcome::Success)
            .count();
        let summary = BatchSummary {
            processed: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        };
        log::info!(
            "Recurring billing run finished: processed={} successful={} failed={}",
            summary.processed,
            summary.successful,
            summary.failed
        );
        Ok(summary)
    }
}
