pub mod subscriptions;
pub mod token_transactions;

pub use subscriptions as subscription_entity;
pub use token_transactions as token_transaction_entity;

pub use subscriptions::{PlanId, SubscriptionStatus};
pub use token_transactions::TokenTransactionReason;
