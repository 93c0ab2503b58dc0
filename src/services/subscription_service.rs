use crate::config::GatewayConfig;
use crate::entities::{subscription_entity as sub, PlanId, SubscriptionStatus};
use crate::error::{AppError, AppResult};
use crate::external::{ChargeReceipt, PaymentGateway};
use crate::models::{BillingAuthRequest, RenewalOutcome, RenewalResult, SubscriptionResponse};
use crate::services::TokenLedgerService;
use crate::utils::{checkout_order_id, customer_key, renewal_order_id, AuthUser};
use chrono::{Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;

/// Owns the subscription lifecycle: lazy FREE bootstrap, plan changes through
/// billing-key issuance, cancellation, and single-subscription renewal.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_config: GatewayConfig,
}

impl SubscriptionService {
    pub fn new(
        pool: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        gateway_config: GatewayConfig,
    ) -> Self {
        Self {
            pool,
            gateway,
            gateway_config,
        }
    }

    /// Return the user's subscription row, creating the implicit FREE one on
    /// first touch. The insert is an `ON CONFLICT (user_id) DO NOTHING`
    /// upsert, so two concurrent first touches produce exactly one row.
    pub async fn ensure_subscription(&self, user_id: i64) -> AppResult<sub::Model> {
        let free = PlanId::Free.definition();
        let now = Utc::now();

        let txn = self.pool.begin().await?;
        let row = sub::ActiveModel {
            user_id: Set(user_id),
            plan: Set(PlanId::Free),
            status: Set(SubscriptionStatus::Active),
            customer_key: Set(customer_key(user_id)),
            current_period_start: Set(now),
            current_period_end: Set(now + Duration::days(free.billing_interval_days)),
            tokens_total: Set(free.token_allowance),
            tokens_used: Set(0),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        let inserted = sub::Entity::insert(row)
            .on_conflict(
                OnConflict::column(sub::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        if inserted > 0 {
            // initial allowance shows up in the ledger like any other grant
            TokenLedgerService::record_grant(
                &txn,
                user_id,
                free.token_allowance,
                "free plan signup grant".to_string(),
            )
            .await?;
            log::info!("Created free subscription for user {user_id}");
        }
        txn.commit().await?;

        Self::fetch(self.pool.as_ref(), user_id).await
    }

    /// Build the payload the front-end payment widget needs to collect a
    /// payment method for the requested plan.
    pub async fn request_plan_change(
        &self,
        user: &AuthUser,
        plan_id: &str,
    ) -> AppResult<BillingAuthRequest> {
        let plan =
            PlanId::parse(plan_id).ok_or_else(|| AppError::InvalidPlan(plan_id.to_string()))?;
        if !plan.is_paid() {
            return Err(AppError::ValidationError(
                "The free plan is not purchasable; cancel your subscription instead".to_string(),
            ));
        }
        let def = plan.definition();

        let row = self.ensure_subscription(user.user_id).await?;

        Ok(BillingAuthRequest {
            client_key: self.gateway_config.client_key.clone(),
            customer_key: row.customer_key,
            plan_id: plan,
            amount: def.price_minor_units,
            order_name: format!("inkpanel {plan} plan"),
            customer_email: user.email.clone(),
            customer_name: user.username.clone(),
            success_url: self.gateway_config.success_redirect_url.clone(),
            fail_url: self.gateway_config.fail_redirect_url.clone(),
        })
    }

    /// Exchange the widget's auth key for a billing key, charge the first
    /// period, and only then activate the plan. A failed charge leaves every
    /// piece of state untouched; a billing key is never persisted without an
    /// active paid plan behind it.
    pub async fn complete_billing_key_issuance(
        &self,
        user_id: i64,
        auth_key: &str,
        plan_id: &str,
    ) -> AppResult<(SubscriptionResponse, ChargeReceipt)> {
        let plan =
            PlanId::parse(plan_id).ok_or_else(|| AppError::InvalidPlan(plan_id.to_string()))?;
        if !plan.is_paid() {
            return Err(AppError::ValidationError(
                "The free plan has no billing".to_string(),
            ));
        }
        let def = plan.definition();

        let row = self.ensure_subscription(user_id).await?;

        // Re-running the callback for an already-active identical plan must
        // not charge again.
        if row.status == SubscriptionStatus::Active
            && row.plan == plan
            && row.billing_key.is_some()
            && row.current_period_end > Utc::now()
        {
            return Err(AppError::ValidationError(
                "This plan is already active".to_string(),
            ));
        }

        let issued = self
            .gateway
            .issue_billing_key(auth_key, &row.customer_key)
            .await?;

        let order_id = checkout_order_id(user_id);
        let receipt = self
            .gateway
            .charge_billing_key(
                &issued.billing_key,
                &row.customer_key,
                def.price_minor_units,
                &order_id,
                &format!("inkpanel {plan} plan"),
            )
            .await?;

        // Supersede a previously registered payment method at the gateway.
        // Best effort: the new key is already charged and authoritative.
        if let Some(old_key) = row.billing_key.as_deref() {
            if old_key != issued.billing_key {
                if let Err(e) = self.gateway.cancel_billing_key(old_key).await {
                    log::warn!("Failed to invalidate superseded billing key: {e:?}");
                }
            }
        }

        let now = Utc::now();
        let period_end = now + Duration::days(def.billing_interval_days);

        let txn = self.pool.begin().await?;
        sub::Entity::update_many()
            .col_expr(sub::Column::Plan, Expr::value(plan))
            .col_expr(
                sub::Column::Status,
                Expr::value(SubscriptionStatus::Active),
            )
            .col_expr(
                sub::Column::BillingKey,
                Expr::value(Some(issued.billing_key.clone())),
            )
            .col_expr(sub::Column::CardBrand, Expr::value(issued.card_brand.clone()))
            .col_expr(sub::Column::CardLast4, Expr::value(issued.card_last4.clone()))
            .col_expr(sub::Column::CurrentPeriodStart, Expr::value(now))
            .col_expr(sub::Column::CurrentPeriodEnd, Expr::value(period_end))
            .col_expr(sub::Column::TokensTotal, Expr::value(def.token_allowance))
            .col_expr(sub::Column::TokensUsed, Expr::value(0i64))
            .col_expr(sub::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(sub::Column::Id.eq(row.id))
            .exec(&txn)
            .await?;
        TokenLedgerService::record_grant(
            &txn,
            user_id,
            def.token_allowance,
            format!("{plan} plan activation grant"),
        )
        .await?;
        txn.commit().await?;

        log::info!(
            "Activated {plan} plan for user {user_id} (order {order_id}, charged {})",
            receipt.amount
        );

        let updated = Self::fetch(self.pool.as_ref(), user_id).await?;
        Ok((SubscriptionResponse::from(updated), receipt))
    }

    /// Cancellation is effective at period end: tokens and the period window
    /// stay, and the billing key is kept for reactivation.
    pub async fn cancel_subscription(&self, user_id: i64) -> AppResult<SubscriptionResponse> {
        let row = Self::fetch(self.pool.as_ref(), user_id).await?;
        if row.status == SubscriptionStatus::Cancelled {
            return Ok(SubscriptionResponse::from(row));
        }

        sub::Entity::update_many()
            .col_expr(
                sub::Column::Status,
                Expr::value(SubscriptionStatus::Cancelled),
            )
            .col_expr(sub::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(sub::Column::Id.eq(row.id))
            .exec(self.pool.as_ref())
            .await?;

        log::info!("Cancelled subscription for user {user_id}");
        let mut cancelled = row;
        cancelled.status = SubscriptionStatus::Cancelled;
        Ok(SubscriptionResponse::from(cancelled))
    }

    /// Subscription + usage for the status endpoint; bootstraps the FREE row
    /// on first read.
    pub async fn get_status(&self, user_id: i64) -> AppResult<SubscriptionResponse> {
        let row = self.ensure_subscription(user_id).await?;
        Ok(SubscriptionResponse::from(row))
    }

    /// One charge-and-renew cycle for a single subscription. Gateway failures
    /// are folded into the returned `RenewalResult` (the row moves to
    /// PastDue); only storage failures propagate as errors. No retry happens
    /// here.
    pub async fn renew_one(&self, row: sub::Model) -> AppResult<RenewalResult> {
        let def = row.plan.definition();

        let billing_key = match row.billing_key.as_deref() {
            Some(key) => key,
            None => {
                log::warn!(
                    "Subscription {} has no billing key; marking past due",
                    row.id
                );
                self.mark_past_due(row.id).await?;
                return Ok(RenewalResult {
                    subscription_id: row.id,
                    user_id: row.user_id,
                    outcome: RenewalOutcome::Failed,
                    error_kind: Some("MISSING_BILLING_KEY".to_string()),
                    charged_amount: None,
                });
            }
        };

        // Deterministic per period: a second attempt within the same period
        // presents the same order id to the gateway.
        let order_id = renewal_order_id(row.id, row.current_period_end);

        match self
            .gateway
            .charge_billing_key(
                billing_key,
                &row.customer_key,
                def.price_minor_units,
                &order_id,
                &format!("inkpanel {} plan renewal", row.plan),
            )
            .await
        {
            Ok(receipt) => {
                // The new period starts now rather than at the stale period
                // end, so a late renewal cannot yield an already-expired
                // window.
                let now = Utc::now();
                let period_end = now + Duration::days(def.billing_interval_days);

                let txn = self.pool.begin().await?;
                sub::Entity::update_many()
                    .col_expr(
                        sub::Column::Status,
                        Expr::value(SubscriptionStatus::Active),
                    )
                    .col_expr(sub::Column::CurrentPeriodStart, Expr::value(now))
                    .col_expr(sub::Column::CurrentPeriodEnd, Expr::value(period_end))
                    .col_expr(sub::Column::TokensTotal, Expr::value(def.token_allowance))
                    .col_expr(sub::Column::TokensUsed, Expr::value(0i64))
                    .col_expr(sub::Column::UpdatedAt, Expr::value(Some(now)))
                    .filter(sub::Column::Id.eq(row.id))
                    .exec(&txn)
                    .await?;
                TokenLedgerService::record_grant(
                    &txn,
                    row.user_id,
                    def.token_allowance,
                    format!("{} plan renewal grant", row.plan),
                )
                .await?;
                txn.commit().await?;

                log::info!(
                    "Renewed subscription {} for user {} (order {order_id})",
                    row.id,
                    row.user_id
                );
                Ok(RenewalResult {
                    subscription_id: row.id,
                    user_id: row.user_id,
                    outcome: RenewalOutcome::Success,
                    error_kind: None,
                    charged_amount: Some(receipt.amount),
                })
            }
            Err(e) => {
                // Includes timeouts: an unconfirmed charge never grants
                // tokens. The period window and balance stay frozen.
                let error_kind = match &e {
                    AppError::GatewayError { code } => code.clone(),
                    other => {
                        log::error!("Unexpected renewal failure: {other:?}");
                        "INTERNAL".to_string()
                    }
                };
                self.mark_past_due(row.id).await?;
                log::warn!(
                    "Renewal charge for subscription {} failed ({error_kind}); marked past due",
                    row.id
                );
                Ok(RenewalResult {
                    subscription_id: row.id,
                    user_id: row.user_id,
                    outcome: RenewalOutcome::Failed,
                    error_kind: Some(error_kind),
                    charged_amount: None,
                })
            }
        }
    }

    async fn mark_past_due(&self, subscription_id: i64) -> AppResult<()> {
        sub::Entity::update_many()
            .col_expr(
                sub::Column::Status,
                Expr::value(SubscriptionStatus::PastDue),
            )
            .col_expr(sub::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(sub::Column::Id.eq(subscription_id))
            .exec(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn fetch<C: ConnectionTrait>(conn: &C, user_id: i64) -> AppResult<sub::Model> {
        sub::Entity::find()
            .filter(sub::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::external::IssuedBillingKey;
    use async_trait::async_trait;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted gateway: issuance always succeeds, charges fail for the
    /// configured set of billing keys.
    pub(crate) struct ScriptedGateway {
        pub fail_keys: Vec<String>,
        pub charges: AtomicUsize,
    }

    impl ScriptedGateway {
        pub fn charging(fail_keys: Vec<String>) -> Self {
            Self {
                fail_keys,
                charges: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn issue_billing_key(
            &self,
            _auth_key: &str,
            _customer_key: &str,
        ) -> AppResult<IssuedBillingKey> {
            Ok(IssuedBillingKey {
                billing_key: "bk_new".to_string(),
                card_brand: Some("Visa".to_string()),
                card_last4: Some("4242".to_string()),
            })
        }

        async fn charge_billing_key(
            &self,
            billing_key: &str,
            _customer_key: &str,
            amount: i64,
            _order_id: &str,
            _order_name: &str,
        ) -> AppResult<ChargeReceipt> {
            self.charges.fetch_add(1, Ordering::SeqCst);
            if self.fail_keys.iter().any(|k| k == billing_key) {
                Err(AppError::GatewayError {
                    code: "REJECT_CARD_COMPANY".to_string(),
                })
            } else {
                Ok(ChargeReceipt {
                    transaction_id: "pay_1".to_string(),
                    amount,
                })
            }
        }

        async fn cancel_billing_key(&self, _billing_key: &str) -> AppResult<()> {
            Ok(())
        }
    }

    fn gateway_config() -> GatewayConfig {
        GatewayConfig {
            secret_key: "sk".to_string(),
            client_key: "ck".to_string(),
            base_url: "https://api.example.test".to_string(),
            success_redirect_url: "/ok".to_string(),
            fail_redirect_url: "/fail".to_string(),
        }
    }

    pub(crate) fn paid_row(
        id: i64,
        user_id: i64,
        billing_key: Option<&str>,
        days_until_period_end: i64,
    ) -> sub::Model {
        let now = Utc::now();
        sub::Model {
            id,
            user_id,
            plan: PlanId::Personal,
            status: SubscriptionStatus::Active,
            customer_key: customer_key(user_id),
            billing_key: billing_key.map(str::to_string),
            card_brand: Some("Visa".to_string()),
            card_last4: Some("4242".to_string()),
            current_period_start: now - Duration::days(30),
            current_period_end: now + Duration::days(days_until_period_end),
            tokens_total: Some(100),
            tokens_used: 73,
            created_at: Some(now - Duration::days(90)),
            updated_at: Some(now),
        }
    }

    #[tokio::test]
    async fn test_plan_change_rejects_unknown_plan() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = SubscriptionService::new(
            Arc::new(db),
            Arc::new(ScriptedGateway::charging(vec![])),
            gateway_config(),
        );
        let user = AuthUser {
            user_id: 7,
            email: "artist@example.com".to_string(),
            username: "Mina".to_string(),
        };
        let err = service.request_plan_change(&user, "mega").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn test_plan_change_rejects_free_target() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = SubscriptionService::new(
            Arc::new(db),
            Arc::new(ScriptedGateway::charging(vec![])),
            gateway_config(),
        );
        let user = AuthUser {
            user_id: 7,
            email: "artist@example.com".to_string(),
            username: "Mina".to_string(),
        };
        let err = service.request_plan_change(&user, "free").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    fn free_row(user_id: i64) -> sub::Model {
        let now = Utc::now();
        sub::Model {
            id: 1,
            user_id,
            plan: PlanId::Free,
            status: SubscriptionStatus::Active,
            customer_key: customer_key(user_id),
            billing_key: None,
            card_brand: None,
            card_last4: None,
            current_period_start: now,
            current_period_end: now + Duration::days(30),
            tokens_total: Some(10),
            tokens_used: 0,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    #[tokio::test]
    async fn test_first_touch_bootstraps_free_plan_with_grant() {
        // fresh insert: the upsert lands (1 row) and the signup grant is
        // appended, then the committed row is read back
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 1,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 1,
                    rows_affected: 1,
                },
            ])
            .append_query_results([vec![free_row(7)]])
            .into_connection();

        let service = SubscriptionService::new(
            Arc::new(db),
            Arc::new(ScriptedGateway::charging(vec![])),
            gateway_config(),
        );
        let row = service.ensure_subscription(7).await.unwrap();
        assert_eq!(row.plan, PlanId::Free);
        assert_eq!(row.status, SubscriptionStatus::Active);
        assert_eq!(row.tokens_total, Some(10));
        assert_eq!(row.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_bootstrap_conflict_yields_existing_row_without_grant() {
        // The losing side of two concurrent first touches: the upsert hits
        // the conflict (0 rows). Exactly one exec result is scripted, so an
        // attempt to append a second signup grant would exhaust the mock and
        // fail the call.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![free_row(7)]])
            .into_connection();

        let service = SubscriptionService::new(
            Arc::new(db),
            Arc::new(ScriptedGateway::charging(vec![])),
            gateway_config(),
        );
        let row = service.ensure_subscription(7).await.unwrap();
        assert_eq!(row.plan, PlanId::Free);
        assert_eq!(row.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_failed_first_charge_persists_nothing() {
        // Only the ensure_subscription upsert touches the database: the
        // conflict-insert (0 rows, row already exists) and the fetch. If the
        // service tried to persist anything after the failed charge, the mock
        // would run out of scripted results and the error would differ.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![free_row(7)]])
            .into_connection();

        let gateway = Arc::new(ScriptedGateway::charging(vec!["bk_new".to_string()]));
        let service = SubscriptionService::new(Arc::new(db), gateway.clone(), gateway_config());

        let err = service
            .complete_billing_key_issuance(7, "auth_123", "personal")
            .await
            .unwrap_err();
        match err {
            AppError::GatewayError { code } => assert_eq!(code, "REJECT_CARD_COMPANY"),
            other => panic!("expected gateway error, got {other:?}"),
        }
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_callback_for_active_plan_never_recharges() {
        let row = paid_row(1, 7, Some("bk_old"), 20);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![row]])
            .into_connection();

        let gateway = Arc::new(ScriptedGateway::charging(vec![]));
        let service = SubscriptionService::new(Arc::new(db), gateway.clone(), gateway_config());

        let err = service
            .complete_billing_key_issuance(7, "auth_123", "personal")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_renew_one_success_advances_period_and_grants() {
        let row = paid_row(1, 7, Some("bk_good"), -2);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                // period/token reset
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                // renewal grant ledger entry
                MockExecResult {
                    last_insert_id: 10,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        let service = SubscriptionService::new(
            Arc::new(db),
            Arc::new(ScriptedGateway::charging(vec![])),
            gateway_config(),
        );
        let result = service.renew_one(row).await.unwrap();
        assert_eq!(result.outcome, RenewalOutcome::Success);
        assert_eq!(result.charged_amount, Some(9900));
        assert_eq!(result.error_kind, None);
    }

    #[tokio::test]
    async fn test_renew_one_failure_marks_past_due_and_touches_nothing_else() {
        let row = paid_row(1, 7, Some("bk_bad"), -2);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // the only write is the PastDue status flip
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let service = SubscriptionService::new(
            Arc::new(db),
            Arc::new(ScriptedGateway::charging(vec!["bk_bad".to_string()])),
            gateway_config(),
        );
        let result = service.renew_one(row).await.unwrap();
        assert_eq!(result.outcome, RenewalOutcome::Failed);
        assert_eq!(result.error_kind.as_deref(), Some("REJECT_CARD_COMPANY"));
        assert_eq!(result.charged_amount, None);
    }

    #[tokio::test]
    async fn test_renew_one_without_billing_key_fails() {
        let row = paid_row(1, 7, None, -2);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let gateway = Arc::new(ScriptedGateway::charging(vec![]));
        let service = SubscriptionService::new(Arc::new(db), gateway.clone(), gateway_config());
        let result = service.renew_one(row).await.unwrap();
        assert_eq!(result.outcome, RenewalOutcome::Failed);
        assert_eq!(result.error_kind.as_deref(), Some("MISSING_BILLING_KEY"));
        // the gateway is never called without a key
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_keeps_tokens_and_period() {
        let row = paid_row(1, 7, Some("bk_good"), 12);
        let period_end = row.current_period_end;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let service = SubscriptionService::new(
            Arc::new(db),
            Arc::new(ScriptedGateway::charging(vec![])),
            gateway_config(),
        );
        let response = service.cancel_subscription(7).await.unwrap();
        assert_eq!(response.status, SubscriptionStatus::Cancelled);
        assert_eq!(response.tokens_total, Some(100));
        assert_eq!(response.tokens_used, 73);
        assert_eq!(response.current_period_end, period_end);
    }
}
