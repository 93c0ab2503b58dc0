pub mod recurring_billing_service;
pub mod subscription_service;
pub mod token_ledger_service;

pub use recurring_billing_service::*;
pub use subscription_service::*;
pub use token_ledger_service::*;
