use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use inkpanel_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{PaymentGateway, TossPaymentsClient},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::{RecurringBillingService, SubscriptionService, TokenLedgerService},
    swagger::swagger_config,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config = Config::from_toml().expect("Failed to load configuration file");

    let pool = Arc::new(
        create_pool(&config.database)
            .await
            .expect("Failed to create database connection pool"),
    );

    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let jwt_service = JwtService::new(&config.jwt.secret);

    // One gateway client, injected into the services that need it.
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(TossPaymentsClient::new(config.gateway.clone()));

    let token_ledger_service = TokenLedgerService::new(pool.clone());
    let subscription_service =
        SubscriptionService::new(pool.clone(), gateway.clone(), config.gateway.clone());
    let recurring_billing_service =
        RecurringBillingService::new(pool.clone(), subscription_service.clone());

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let app_config = config.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .app_data(web::Data::new(app_config.clone()))
            .app_data(web::Data::new(token_ledger_service.clone()))
            .app_data(web::Data::new(subscription_service.clone()))
            .app_data(web::Data::new(recurring_billing_service.clone()))
            .configure(swagger_config)
            .configure(handlers::billing_config)
            .configure(handlers::cron_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::subscription_config)
                    .configure(handlers::token_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
