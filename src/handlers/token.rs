use crate::entities::TokenTransactionReason;
use crate::handlers::subscription::current_user;
use crate::models::*;
use crate::services::TokenLedgerService;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

const DEFAULT_HISTORY_LIMIT: u64 = 20;
const MAX_HISTORY_LIMIT: u64 = 100;

#[utoipa::path(
    get,
    path = "/tokens/balance",
    tag = "tokens",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Current token balance", body = TokenBalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No subscription")
    )
)]
pub async fn balance(
    ledger: web::Data<TokenLedgerService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match ledger.get_balance(user.user_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tokens/usage",
    tag = "tokens",
    params(
        ("limit" = Option<u64>, Query, description = "Max entries, newest first (default 20, cap 100)")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Token ledger history"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn usage(
    ledger: web::Data<TokenLedgerService>,
    req: HttpRequest,
    query: web::Query<UsageHistoryQuery>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    match ledger.get_usage_history(user.user_id, limit).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tokens/consume",
    tag = "tokens",
    request_body = ConsumeTokensRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Tokens debited", body = ConsumeTokensResponse),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Insufficient balance")
    )
)]
pub async fn consume(
    ledger: web::Data<TokenLedgerService>,
    req: HttpRequest,
    request: web::Json<ConsumeTokensRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    let amount = request.amount;
    match ledger
        .debit(
            user.user_id,
            amount,
            TokenTransactionReason::Generation,
            request.into_inner().description,
        )
        .await
    {
        Ok(balance) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": ConsumeTokensResponse {
                debited: amount,
                balance,
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn token_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tokens")
            .route("/balance", web::get().to(balance))
            .route("/usage", web::get().to(usage))
            .route("/consume", web::post().to(consume)),
    );
}
