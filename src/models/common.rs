use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error half of the response envelope; the handlers build the success half
/// with `json!` directly.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}
