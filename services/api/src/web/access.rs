//! services/api/src/web/access.rs
//!
//! Session-cookie parsing and per-request role resolution shared by the handlers.

use axum::http::{header, HeaderMap};
use records_core::domain::Identity;
use records_core::roles::{can_manage_records, resolve_role, Role, RoleCandidates};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Pulls the session id out of the `Cookie` header, if present.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

pub fn session_cookie(session_id: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, session_id, max_age_secs
    )
}

pub fn cleared_session_cookie() -> String {
    session_cookie("", 0)
}

/// Gathers the records that may belong to `identity` and resolves its role.
pub async fn resolve_caller_role(state: &AppState, identity: &Identity) -> Result<Role, ApiError> {
    let policy = state.resolution_policy();
    if identity.is_superuser {
        return Ok(resolve_role(identity, RoleCandidates::default(), policy));
    }

    let fallback_email = identity
        .email
        .as_deref()
        .filter(|_| policy.email_fallback && identity.is_active);

    let (lecturer, linked_student, email_matches) = futures::try_join!(
        state.repo.find_lecturer_by_identity(identity.id),
        state.repo.find_student_by_identity(identity.id),
        async {
            match fallback_email {
                Some(email) => state.repo.find_students_by_email(email).await,
                None => Ok(Vec::new()),
            }
        },
    )?;

    Ok(resolve_role(
        identity,
        RoleCandidates {
            lecturer,
            linked_student,
            email_matches,
        },
        policy,
    ))
}

/// Refuses a caller who could not reach student `student_id` whatever the
/// record holds. Runs before the lookup so unknown ids are only reported as
/// missing to callers entitled to see them.
pub fn precheck_student_access(identity: &Identity, role: &Role, student_id: Uuid) -> Result<(), ApiError> {
    if identity.has_staff_override() || role.student().is_some_and(|s| s.id == student_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Staff-only operations.
pub fn require_staff(identity: &Identity) -> Result<(), ApiError> {
    if can_manage_records(identity) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}
