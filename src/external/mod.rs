pub mod gateway;
pub mod toss;

pub use gateway::{ChargeReceipt, IssuedBillingKey, PaymentGateway};
pub use toss::TossPaymentsClient;
