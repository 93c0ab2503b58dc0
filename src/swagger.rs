use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::subscription::plan_change,
        handlers::subscription::cancel,
        handlers::subscription::status,
        handlers::token::balance,
        handlers::token::usage,
        handlers::token::consume,
        handlers::billing::callback,
        handlers::cron::recurring_payments,
    ),
    components(
        schemas(
            PlanId,
            crate::entities::SubscriptionStatus,
            crate::entities::TokenTransactionReason,
            PlanDefinition,
            PlanChangeRequest,
            BillingAuthRequest,
            SubscriptionResponse,
            TokenBalanceResponse,
            ConsumeTokensRequest,
            ConsumeTokensResponse,
            TokenTransactionResponse,
            RenewalOutcome,
            RenewalResult,
            BatchSummary,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "subscription", description = "Plan lifecycle"),
        (name = "tokens", description = "Generation token ledger"),
        (name = "billing", description = "Payment gateway callback"),
        (name = "cron", description = "Scheduled batch triggers")
    )
)]
struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
}
