use crate::error::AppError;
use crate::models::*;
use crate::services::SubscriptionService;
use crate::utils::AuthUser;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

pub(crate) fn current_user(req: &HttpRequest) -> Result<AuthUser, AppError> {
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::AuthError("Missing identity".to_string()))
}

#[utoipa::path(
    post,
    path = "/subscription/plan-change",
    tag = "subscription",
    request_body = PlanChangeRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Billing auth request for the payment widget", body = BillingAuthRequest),
        (status = 400, description = "Unknown or unpurchasable plan"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn plan_change(
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
    request: web::Json<PlanChangeRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match subscription_service
        .request_plan_change(&user, &request.plan_id)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/subscription/cancel",
    tag = "subscription",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Subscription cancelled (effective at period end)", body = SubscriptionResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No subscription")
    )
)]
pub async fn cancel(
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match subscription_service.cancel_subscription(user.user_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/subscription/status",
    tag = "subscription",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Current subscription and usage", body = SubscriptionResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn status(
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match subscription_service.get_status(user.user_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn subscription_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/subscription")
            .route("/plan-change", web::post().to(plan_change))
            .route("/cancel", web::post().to(cancel))
            .route("/status", web::get().to(status)),
    );
}
