use crate::entities::{
    subscription_entity as sub, token_transaction_entity as tx, TokenTransactionReason,
};
use crate::error::{AppError, AppResult};
use crate::models::{TokenBalanceResponse, TokenTransactionResponse};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;

/// Owns the per-user token balance and the append-only usage ledger.
///
/// Every balance mutation appends exactly one ledger row in the same database
/// transaction as the balance change; a ledger row never exists without its
/// balance change and vice versa.
#[derive(Clone)]
pub struct TokenLedgerService {
    pool: Arc<DatabaseConnection>,
}

impl TokenLedgerService {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    pub async fn get_balance(&self, user_id: i64) -> AppResult<TokenBalanceResponse> {
        let row = sub::Entity::find()
            .filter(sub::Column::UserId.eq(user_id))
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        Ok(Self::balance_of(&row))
    }

    /// Debit tokens for a consuming action.
    ///
    /// The balance check and the decrement are a single conditional UPDATE
    /// (`tokens_used = tokens_used + N ... WHERE tokens_used + N <=
    /// tokens_total`), so two concurrent debits that would jointly overdraw
    /// resolve to exactly one success and one `InsufficientBalance`.
    pub async fn debit(
        &self,
        user_id: i64,
        amount: i64,
        reason: TokenTransactionReason,
        description: Option<String>,
    ) -> AppResult<TokenBalanceResponse> {
        if amount <= 0 {
            return Err(AppError::ValidationError(
                "Debit amount must be positive".to_string(),
            ));
        }

        let txn = self.pool.begin().await?;

        let update = sub::Entity::update_many()
            .col_expr(
                sub::Column::TokensUsed,
                Expr::col(sub::Column::TokensUsed).add(amount),
            )
            .col_expr(sub::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(sub::Column::UserId.eq(user_id))
            .filter(
                Condition::any()
                    // NULL allowance = unlimited plan, usage is still recorded
                    .add(sub::Column::TokensTotal.is_null())
                    .add(
                        Expr::expr(Expr::col(sub::Column::TokensUsed).add(amount))
                            .lte(Expr::col(sub::Column::TokensTotal)),
                    ),
            )
            .exec(&txn)
            .await?;

        if update.rows_affected == 0 {
            let exists = sub::Entity::find()
                .filter(sub::Column::UserId.eq(user_id))
                .one(&txn)
                .await?
                .is_some();
            txn.rollback().await?;
            return if exists {
                Err(AppError::InsufficientBalance)
            } else {
                Err(AppError::NotFound("Subscription not found".to_string()))
            };
        }

        let row = Self::fetch_row(&txn, user_id).await?;
        let balance_after = row.tokens_total.map(|t| t - row.tokens_used);
        Self::append_entry(&txn, user_id, -amount, reason, balance_after, description).await?;

        txn.commit().await?;
        Ok(Self::balance_of(&row))
    }

    /// Credit tokens. `Purchase` and `AdminAdjustment` add to the allowance;
    /// `RenewalGrant` is rejected here because a renewal grant sets the
    /// allowance and zeroes usage rather than adding, and that reset is
    /// atomic with the subscription update — see [`Self::record_grant`].
    pub async fn credit(
        &self,
        user_id: i64,
        amount: i64,
        reason: TokenTransactionReason,
        description: Option<String>,
    ) -> AppResult<TokenBalanceResponse> {
        if amount <= 0 {
            return Err(AppError::ValidationError(
                "Credit amount must be positive".to_string(),
            ));
        }
        if reason == TokenTransactionReason::RenewalGrant {
            return Err(AppError::ValidationError(
                "Renewal grants are applied by the renewal flow".to_string(),
            ));
        }

        let txn = self.pool.begin().await?;

        // NULL + amount stays NULL, so unlimited plans are unaffected.
        let update = sub::Entity::update_many()
            .col_expr(
                sub::Column::TokensTotal,
                Expr::col(sub::Column::TokensTotal).add(amount),
            )
            .col_expr(sub::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(sub::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        if update.rows_affected == 0 {
            txn.rollback().await?;
            return Err(AppError::NotFound("Subscription not found".to_string()));
        }

        let row = Self::fetch_row(&txn, user_id).await?;
        let balance_after = row.tokens_total.map(|t| t - row.tokens_used);
        Self::append_entry(&txn, user_id, amount, reason, balance_after, description).await?;

        txn.commit().await?;
        Ok(Self::balance_of(&row))
    }

    /// Most recent entries first.
    pub async fn get_usage_history(
        &self,
        user_id: i64,
        limit: u64,
    ) -> AppResult<Vec<TokenTransactionResponse>> {
        let rows = tx::Entity::find()
            .filter(tx::Column::UserId.eq(user_id))
            .order_by_desc(tx::Column::CreatedAt)
            .order_by_desc(tx::Column::Id)
            .limit(limit)
            .all(self.pool.as_ref())
            .await?;

        Ok(rows.into_iter().map(TokenTransactionResponse::from).collect())
    }

    /// Append the ledger entry for a renewal grant inside the caller's
    /// transaction, keeping the grant atomic with the subscription update
    /// that set the new allowance. `granted` is None on unlimited tiers.
    pub(crate) async fn record_grant<C: ConnectionTrait>(
        conn: &C,
        user_id: i64,
        granted: Option<i64>,
        description: String,
    ) -> AppResult<()> {
        Self::append_entry(
            conn,
            user_id,
            granted.unwrap_or(0),
            TokenTransactionReason::RenewalGrant,
            granted,
            Some(description),
        )
        .await
    }

    async fn append_entry<C: ConnectionTrait>(
        conn: &C,
        user_id: i64,
        amount: i64,
        reason: TokenTransactionReason,
        balance_after: Option<i64>,
        description: Option<String>,
    ) -> AppResult<()> {
        let entry = tx::ActiveModel {
            user_id: Set(user_id),
            amount: Set(amount),
            reason: Set(reason),
            balance_after: Set(balance_after),
            description: Set(description),
            created_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        tx::Entity::insert(entry).exec_without_returning(conn).await?;
        Ok(())
    }

    async fn fetch_row<C: ConnectionTrait>(conn: &C, user_id: i64) -> AppResult<sub::Model> {
        sub::Entity::find()
            .filter(sub::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    fn balance_of(row: &sub::Model) -> TokenBalanceResponse {
        TokenBalanceResponse {
            tokens_total: row.tokens_total,
            tokens_used: row.tokens_used,
            // clamped for display; the stored value can never go negative
            tokens_remaining: row.tokens_total.map(|t| (t - row.tokens_used).max(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PlanId, SubscriptionStatus};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn sub_row(tokens_total: Option<i64>, tokens_used: i64) -> sub::Model {
        let now = Utc::now();
        sub::Model {
            id: 1,
            user_id: 7,
            plan: PlanId::Personal,
            status: SubscriptionStatus::Active,
            customer_key: "inkpanel-user-7".to_string(),
            billing_key: Some("bk_test".to_string()),
            card_brand: Some("Visa".to_string()),
            card_last4: Some("4242".to_string()),
            current_period_start: now,
            current_period_end: now + chrono::Duration::days(30),
            tokens_total,
            tokens_used,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    #[tokio::test]
    async fn test_debit_success_records_ledger_entry() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                // conditional decrement hits
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                // ledger insert
                MockExecResult {
                    last_insert_id: 1,
                    rows_affected: 1,
                },
            ])
            // re-read inside the transaction after the decrement
            .append_query_results([vec![sub_row(Some(10), 4)]])
            .into_connection();

        let ledger = TokenLedgerService::new(Arc::new(db));
        let balance = ledger
            .debit(7, 4, TokenTransactionReason::Generation, None)
            .await
            .unwrap();

        assert_eq!(balance.tokens_total, Some(10));
        assert_eq!(balance.tokens_used, 4);
        assert_eq!(balance.tokens_remaining, Some(6));
    }

    #[tokio::test]
    async fn test_debit_overdraw_is_rejected_without_ledger_entry() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                // conditional decrement misses: 8 > 6 remaining
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            // existence check distinguishing overdraw from missing row
            .append_query_results([vec![sub_row(Some(10), 4)]])
            .into_connection();

        let ledger = TokenLedgerService::new(Arc::new(db));
        let err = ledger
            .debit(7, 8, TokenTransactionReason::Generation, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance));
    }

    #[tokio::test]
    async fn test_debit_unknown_user_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([Vec::<sub::Model>::new()])
            .into_connection();

        let ledger = TokenLedgerService::new(Arc::new(db));
        let err = ledger
            .debit(99, 1, TokenTransactionReason::Generation, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_debit_rejects_non_positive_amount() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let ledger = TokenLedgerService::new(Arc::new(db));
        let err = ledger
            .debit(7, 0, TokenTransactionReason::Generation, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_credit_purchase_adds_to_allowance() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 2,
                    rows_affected: 1,
                },
            ])
            // balance 6 before (10 total, 4 used); +100 purchased
            .append_query_results([vec![sub_row(Some(110), 4)]])
            .into_connection();

        let ledger = TokenLedgerService::new(Arc::new(db));
        let balance = ledger
            .credit(7, 100, TokenTransactionReason::Purchase, None)
            .await
            .unwrap();
        assert_eq!(balance.tokens_remaining, Some(106));
    }

    #[tokio::test]
    async fn test_credit_rejects_renewal_grant_reason() {
        // grants set the allowance instead of adding; credit must not
        // silently apply additive semantics to them
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let ledger = TokenLedgerService::new(Arc::new(db));
        let err = ledger
            .credit(7, 100, TokenTransactionReason::RenewalGrant, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_credit_then_debit_round_trip() {
        // 10 total / 4 used; purchase 100, then spend 4
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                // credit: allowance bump + ledger insert
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 4,
                    rows_affected: 1,
                },
                // debit: conditional decrement + ledger insert
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 5,
                    rows_affected: 1,
                },
            ])
            .append_query_results([vec![sub_row(Some(110), 4)], vec![sub_row(Some(110), 8)]])
            .into_connection();

        let ledger = TokenLedgerService::new(Arc::new(db));

        let after_credit = ledger
            .credit(7, 100, TokenTransactionReason::Purchase, None)
            .await
            .unwrap();
        assert_eq!(after_credit.tokens_remaining, Some(106));

        let after_debit = ledger
            .debit(7, 4, TokenTransactionReason::Generation, None)
            .await
            .unwrap();
        assert_eq!(after_debit.tokens_used, 8);
        assert_eq!(after_debit.tokens_remaining, Some(102));
    }

    #[tokio::test]
    async fn test_unlimited_plan_debit_still_records_usage() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 3,
                    rows_affected: 1,
                },
            ])
            .append_query_results([vec![sub_row(None, 41)]])
            .into_connection();

        let ledger = TokenLedgerService::new(Arc::new(db));
        let balance = ledger
            .debit(7, 1, TokenTransactionReason::Generation, None)
            .await
            .unwrap();
        assert_eq!(balance.tokens_total, None);
        assert_eq!(balance.tokens_remaining, None);
        assert_eq!(balance.tokens_used, 41);
    }

    #[tokio::test]
    async fn test_usage_history_maps_entries() {
        let now = Utc::now();
        let entries = vec![
            tx::Model {
                id: 2,
                user_id: 7,
                amount: -4,
                reason: TokenTransactionReason::Generation,
                balance_after: Some(6),
                description: None,
                created_at: Some(now),
            },
            tx::Model {
                id: 1,
                user_id: 7,
                amount: 10,
                reason: TokenTransactionReason::RenewalGrant,
                balance_after: Some(10),
                description: Some("personal plan renewal".to_string()),
                created_at: Some(now - chrono::Duration::days(1)),
            },
        ];
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([entries])
            .into_connection();

        let ledger = TokenLedgerService::new(Arc::new(db));
        let history = ledger.get_usage_history(7, 20).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, -4);
        assert_eq!(history[1].balance_after, Some(10));
    }
}
