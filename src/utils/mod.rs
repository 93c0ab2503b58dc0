pub mod billing_ids;
pub mod jwt;

pub use billing_ids::*;
pub use jwt::*;
