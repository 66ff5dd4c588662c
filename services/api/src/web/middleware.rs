//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use records_core::ports::PortError;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::ApiError;
use crate::web::access::session_id_from_headers;
use crate::web::state::AppState;

/// Middleware that validates the auth session cookie and loads the caller's identity.
///
/// If valid, inserts the `Identity` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_session_id = session_id_from_headers(req.headers()).ok_or(ApiError::Unauthenticated)?;

    let identity_id = state
        .repo
        .validate_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            if !matches!(e, PortError::Unauthorized) {
                error!("Failed to validate auth session: {:?}", e);
            }
            ApiError::Unauthenticated
        })?;

    let identity = match state.repo.get_identity(identity_id).await {
        Ok(identity) => identity,
        Err(PortError::NotFound(_)) => return Err(ApiError::Unauthenticated),
        Err(e) => return Err(e.into()),
    };
    if !identity.is_active {
        warn!(identity_id = %identity.id, "Session presented for an inactive identity");
        return Err(ApiError::Unauthenticated);
    }

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
