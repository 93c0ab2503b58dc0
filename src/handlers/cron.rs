use crate::config::Config;
use crate::error::AppError;
use crate::services::RecurringBillingService;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

/// Externally triggered daily batch. Authenticated with the cron shared
/// secret, not a user JWT.
#[utoipa::path(
    post,
    path = "/cron/recurring-payments",
    tag = "cron",
    responses(
        (status = 200, description = "Batch summary", body = crate::models::BatchSummary),
        (status = 403, description = "Missing or invalid cron secret")
    )
)]
pub async fn recurring_payments(
    scheduler: web::Data<RecurringBillingService>,
    config: web::Data<Config>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    // an unset secret disables the trigger rather than opening it up
    let expected = config.cron.secret.as_str();
    if expected.is_empty() || provided != Some(expected) {
        return Ok(AppError::Forbidden.error_response());
    }

    match scheduler.run().await {
        Ok(summary) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": summary
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn cron_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/cron").route("/recurring-payments", web::post().to(recurring_payments)),
    );
}
