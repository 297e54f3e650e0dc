pub mod boms;
pub mod common;
pub mod customers;
pub mod health;
pub mod jobs;
pub mod manufacturers;
pub mod parts;
pub mod rfqs;
pub mod suppliers;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::errors::ApiError;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// The acting user, taken from the `x-user-id` header. Identity management
/// is external; operations receive the user as an explicit parameter
/// rather than ambient state.
pub struct CurrentUser(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| CurrentUser(s.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}
