//! services/api/src/web/account.rs
//!
//! Self-service edits: a student's own profile and an administrator's own account.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use records_core::domain::{Identity, Student};
use records_core::roles::authorize_self_access;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::access::{cleared_session_cookie, precheck_student_access, resolve_caller_role};
use crate::web::models::{
    optional_email, optional_text, required_text, IdentityView, ProfilePayload, StudentView,
};
use crate::web::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminSettingsPayload {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
}

fn require_superuser(identity: &Identity) -> Result<(), ApiError> {
    if identity.is_superuser {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Edit the contact and programme fields of a student record.
#[utoipa::path(
    put,
    path = "/students/{id}/profile",
    params(("id" = Uuid, Path, description = "Student primary key")),
    request_body = ProfilePayload,
    responses(
        (status = 200, description = "Profile updated", body = StudentView),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not the caller's own record"),
        (status = 404, description = "No such student")
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProfilePayload>,
) -> Result<Json<StudentView>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    precheck_student_access(&identity, &role, id)?;
    let student = state.repo.get_student(id).await?;
    if !authorize_self_access(&identity, &role, &student) {
        return Err(ApiError::Forbidden);
    }

    let updated = state
        .repo
        .update_student(&Student {
            first_name: required_text("first_name", &payload.first_name, 100)?,
            last_name: required_text("last_name", &payload.last_name, 100)?,
            email: optional_email("email", payload.email.as_deref())?,
            program: optional_text("program", payload.program.as_deref(), 128)?,
            department: optional_text("department", payload.department.as_deref(), 128)?,
            faculty: optional_text("faculty", payload.faculty.as_deref(), 128)?,
            ..student
        })
        .await?;
    info!(student_id = %updated.id, by = %identity.username, "Profile updated");
    Ok(Json(StudentView::from(&updated)))
}

/// An administrator edits their own name and email.
#[utoipa::path(
    put,
    path = "/admin/settings",
    request_body = AdminSettingsPayload,
    responses(
        (status = 200, description = "Account updated", body = IdentityView),
        (status = 403, description = "Superusers only")
    )
)]
pub async fn update_admin_settings_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<AdminSettingsPayload>,
) -> Result<Json<IdentityView>, ApiError> {
    require_superuser(&identity)?;
    let updated = state
        .repo
        .update_identity(&Identity {
            first_name: optional_text("first_name", Some(payload.first_name.as_str()), 150)?
                .unwrap_or_default(),
            last_name: optional_text("last_name", Some(payload.last_name.as_str()), 150)?
                .unwrap_or_default(),
            email: optional_email("email", payload.email.as_deref())?,
            ..identity
        })
        .await?;
    Ok(Json(IdentityView::from(&updated)))
}

/// An administrator deletes their own account and is logged out.
#[utoipa::path(
    delete,
    path = "/admin/settings",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 403, description = "Superusers only")
    )
)]
pub async fn delete_admin_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    require_superuser(&identity)?;
    state.repo.delete_identity(identity.id).await?;
    info!(identity_id = %identity.id, "Administrator deleted own account");
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cleared_session_cookie())],
    ))
}
