pub mod billing;
pub mod cron;
pub mod subscription;
pub mod token;

pub use billing::billing_config;
pub use cron::cron_config;
pub use subscription::subscription_config;
pub use token::token_config;
