pub mod common;
pub mod plan;
pub mod renewal;
pub mod subscription;
pub mod token;

pub use common::*;
pub use plan::*;
pub use renewal::*;
pub use subscription::*;
pub use token::*;
