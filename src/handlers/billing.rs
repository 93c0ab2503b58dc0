use crate::config::Config;
use crate::error::AppError;
use crate::external::gateway::user_message;
use crate::models::BillingCallbackQuery;
use crate::services::SubscriptionService;
use crate::utils::user_id_from_customer_key;
use actix_web::{web, HttpResponse, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

fn redirect_to(url: String) -> HttpResponse {
    HttpResponse::Found()
        .append_header(("Location", url))
        .finish()
}

fn with_reason(base: &str, reason: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{sep}reason={}",
        utf8_percent_encode(reason, NON_ALPHANUMERIC)
    )
}

/// Landing point for the payment widget's redirect. Unauthenticated: the
/// gateway identifies the user through the deterministic customer key. The
/// browser is always redirected back to the front-end; failures carry only
/// the user-friendly reason, never the gateway's raw error code.
#[utoipa::path(
    get,
    path = "/billing/callback",
    tag = "billing",
    params(
        ("authKey" = String, Query, description = "Auth key issued by the payment widget"),
        ("customerKey" = String, Query, description = "Deterministic customer reference"),
        ("planId" = String, Query, description = "Plan selected in the widget")
    ),
    responses(
        (status = 302, description = "Redirect back to the front-end")
    )
)]
pub async fn callback(
    subscription_service: web::Data<SubscriptionService>,
    config: web::Data<Config>,
    query: web::Query<BillingCallbackQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let fail_url = config.gateway.fail_redirect_url.clone();

    let Some(user_id) = user_id_from_customer_key(&query.customer_key) else {
        log::warn!("Billing callback with unrecognized customer key");
        return Ok(redirect_to(with_reason(
            &fail_url,
            "Unrecognized customer reference",
        )));
    };

    match subscription_service
        .complete_billing_key_issuance(user_id, &query.auth_key, &query.plan_id)
        .await
    {
        Ok((subscription, receipt)) => {
            log::info!(
                "Billing callback activated plan {} for user {user_id} (charged {})",
                subscription.plan,
                receipt.amount
            );
            Ok(redirect_to(config.gateway.success_redirect_url.clone()))
        }
        Err(e) => {
            log::warn!("Billing callback failed for user {user_id}: {e:?}");
            let reason = match &e {
                AppError::GatewayError { code } => user_message(code).to_string(),
                AppError::InvalidPlan(_) => "The selected plan does not exist".to_string(),
                AppError::ValidationError(msg) => msg.clone(),
                _ => "Subscription activation failed. Please try again.".to_string(),
            };
            Ok(redirect_to(with_reason(&fail_url, &reason)))
        }
    }
}

pub fn billing_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/billing").route("/callback", web::get().to(callback)));
}
