//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: login, logout, self-registration for each role,
//! and account activation through the emailed link.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use records_core::domain::{Identity, NewIdentity, NewLecturer, NewStudent};
use records_core::ports::{ActivationMessage, PortError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::access::{
    cleared_session_cookie, resolve_caller_role, session_cookie, session_id_from_headers,
};
use crate::web::models::{optional_text, required_email, required_text};
use crate::web::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub identity_id: Uuid,
    pub username: String,
    pub role: String,
    /// The dashboard this identity should land on.
    pub redirect: String,
}

#[derive(Deserialize, ToSchema)]
pub struct StudentRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub program: Option<String>,
    pub department: Option<String>,
    pub faculty: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LecturerRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub staff_id: String,
    #[serde(default)]
    pub department: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AdminRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub registration_code: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RegistrationResponse {
    pub identity_id: Uuid,
    pub username: String,
    pub message: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

fn check_passwords(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if password != confirm {
        return Err(ApiError::validation(
            "password_confirm",
            "The two password fields didn't match",
        ));
    }
    Ok(())
}

/// Registration refuses an email that already belongs to an account.
async fn ensure_email_unused(state: &AppState, email: &str) -> Result<(), ApiError> {
    if !state.repo.find_identities_by_email(email).await?.is_empty() {
        return Err(PortError::Conflict("email".to_string()).into());
    }
    Ok(())
}

/// Creates the inactive identity shared by all three registration flows.
async fn create_inactive_identity(
    state: &AppState,
    username: &str,
    email: &str,
    password: &str,
    first_name: String,
    last_name: String,
) -> Result<Identity, ApiError> {
    let username = required_text("username", username, 150)?;
    let hashed_password = hash_password(password)?;
    let identity = state
        .repo
        .create_identity(NewIdentity {
            username,
            email: Some(email.to_string()),
            first_name,
            last_name,
            hashed_password,
            is_active: false,
            is_staff: false,
            is_superuser: false,
        })
        .await?;
    Ok(identity)
}

/// Issues an activation token and mails the link to the identity's address.
async fn send_activation(state: &AppState, identity: &Identity) -> Result<(), ApiError> {
    let Some(to) = identity.email.clone() else {
        return Ok(());
    };
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = Utc::now() + Duration::hours(state.config.activation_ttl_hours);
    state
        .repo
        .create_activation_token(&token, identity.id, expires_at)
        .await?;

    let config = &state.config;
    let link = format!("{}/activate/{}", config.public_base_url, token);
    let message = ActivationMessage {
        from: config.default_from_email.clone(),
        to,
        subject: format!("Activate your {} account", config.site_name),
        body: format!(
            "Hi {},\n\nThanks for registering with {}. Please activate your account by \
             opening the link below:\n\n{}\n\nThe link expires in {} hours.\n",
            identity.username, config.site_name, link, config.activation_ttl_hours
        ),
    };
    state.notifier.send_activation(&message).await?;
    info!(identity_id = %identity.id, "Activation email sent");
    Ok(())
}

/// Removes a half-created identity after a later registration step failed.
/// Lecturer records, sessions and tokens go with it; a student record only
/// loses its link, so its id is passed separately.
async fn rollback_registration(state: &AppState, identity_id: Uuid, student_id: Option<Uuid>) {
    if let Some(student_id) = student_id {
        if let Err(e) = state.repo.delete_student(student_id).await {
            error!(%student_id, "Failed to roll back student record: {:?}", e);
        }
    }
    if let Err(e) = state.repo.delete_identity(identity_id).await {
        error!(%identity_id, "Failed to roll back identity: {:?}", e);
    }
}

async fn start_session(state: &AppState, identity_id: Uuid) -> Result<String, ApiError> {
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(state.config.session_ttl_days);
    state
        .repo
        .create_auth_session(&auth_session_id, identity_id, Utc::now() + ttl)
        .await?;
    Ok(session_cookie(&auth_session_id, ttl.num_seconds()))
}

fn registered(identity: &Identity) -> (StatusCode, Json<RegistrationResponse>) {
    (
        StatusCode::CREATED,
        Json(RegistrationResponse {
            identity_id: identity.id,
            username: identity.username.clone(),
            message: "Registration successful! Please check your email to activate your account."
                .to_string(),
        }),
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Login with an activated account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or inactive account"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Get credentials by username
    let creds = match state.repo.get_credentials_by_username(req.username.trim()).await {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => return Err(ApiError::Unauthenticated),
        Err(e) => return Err(e.into()),
    };

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(ApiError::Unauthenticated);
    }
    if !creds.is_active {
        warn!(username = %creds.username, "Login attempt before activation");
        return Err(ApiError::Unauthenticated);
    }

    // 3. Create the auth session and resolve where to land
    let cookie = start_session(&state, creds.identity_id).await?;
    let identity = state.repo.get_identity(creds.identity_id).await?;
    let role = resolve_caller_role(&state, &identity).await?;
    info!(identity_id = %identity.id, role = role.name(), "Login successful");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            identity_id: identity.id,
            username: identity.username,
            role: role.name().to_string(),
            redirect: role.dashboard_path().to_string(),
        }),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let auth_session_id = session_id_from_headers(&headers).ok_or(ApiError::Unauthenticated)?;
    state.repo.delete_auth_session(auth_session_id).await?;
    Ok((StatusCode::OK, [(header::SET_COOKIE, cleared_session_cookie())]))
}

/// POST /register/student - Create an inactive student account and its record
#[utoipa::path(
    post,
    path = "/register/student",
    request_body = StudentRegistration,
    responses(
        (status = 201, description = "Registered; activation email sent", body = RegistrationResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username, student ID or email already in use")
    )
)]
pub async fn register_student_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StudentRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    check_passwords(&req.password, &req.password_confirm)?;
    let email = required_email("email", &req.email)?;
    let student_number = required_text("student_id", &req.student_id, 20)?;
    let first_name = required_text("first_name", &req.first_name, 100)?;
    let last_name = required_text("last_name", &req.last_name, 100)?;
    let program = optional_text("program", req.program.as_deref(), 128)?;
    let department = optional_text("department", req.department.as_deref(), 128)?;
    let faculty = optional_text("faculty", req.faculty.as_deref(), 128)?;

    if state.repo.get_student_by_number(&student_number).await?.is_some() {
        return Err(PortError::Conflict("student_id".to_string()).into());
    }
    if !state.repo.find_students_by_email(&email).await?.is_empty() {
        return Err(PortError::Conflict("email".to_string()).into());
    }
    ensure_email_unused(&state, &email).await?;

    let identity = create_inactive_identity(
        &state,
        &req.username,
        &email,
        &req.password,
        first_name.clone(),
        last_name.clone(),
    )
    .await?;

    let created = state
        .repo
        .create_student(NewStudent {
            student_number,
            first_name,
            last_name,
            email: Some(email),
            program,
            department,
            faculty,
            enrollment_date: Some(Utc::now().date_naive()),
            is_active: true,
            identity_id: Some(identity.id),
        })
        .await;
    let student = match created {
        Ok(student) => student,
        Err(e) => {
            rollback_registration(&state, identity.id, None).await;
            return Err(e.into());
        }
    };

    if let Err(e) = send_activation(&state, &identity).await {
        rollback_registration(&state, identity.id, Some(student.id)).await;
        return Err(e);
    }
    info!(identity_id = %identity.id, "Student registered");
    Ok(registered(&identity))
}

/// POST /register/lecturer - Create an inactive lecturer account and its record
#[utoipa::path(
    post,
    path = "/register/lecturer",
    request_body = LecturerRegistration,
    responses(
        (status = 201, description = "Registered; activation email sent", body = RegistrationResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username, staff ID or email already in use")
    )
)]
pub async fn register_lecturer_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LecturerRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    check_passwords(&req.password, &req.password_confirm)?;
    let email = required_email("email", &req.email)?;
    let staff_id = required_text("staff_id", &req.staff_id, 20)?;
    let first_name = optional_text("first_name", Some(req.first_name.as_str()), 150)?.unwrap_or_default();
    let last_name = optional_text("last_name", Some(req.last_name.as_str()), 150)?.unwrap_or_default();
    let department = optional_text("department", Some(req.department.as_str()), 100)?.unwrap_or_default();
    ensure_email_unused(&state, &email).await?;

    let identity =
        create_inactive_identity(&state, &req.username, &email, &req.password, first_name, last_name)
            .await?;

    let created = state
        .repo
        .create_lecturer(NewLecturer {
            identity_id: identity.id,
            staff_id,
            department,
            is_admin_assistant: false,
            course_ids: Vec::new(),
        })
        .await;
    if let Err(e) = created {
        rollback_registration(&state, identity.id, None).await;
        return Err(e.into());
    }

    if let Err(e) = send_activation(&state, &identity).await {
        rollback_registration(&state, identity.id, None).await;
        return Err(e);
    }
    info!(identity_id = %identity.id, "Lecturer registered");
    Ok(registered(&identity))
}

/// POST /register/admin - Create an inactive staff account
#[utoipa::path(
    post,
    path = "/register/admin",
    request_body = AdminRegistration,
    responses(
        (status = 201, description = "Registered; activation email sent", body = RegistrationResponse),
        (status = 400, description = "Validation failed or wrong registration code"),
        (status = 409, description = "Username or email already in use")
    )
)]
pub async fn register_admin_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(required) = state.config.admin_registration_code.as_deref() {
        if req.registration_code.as_deref().map(str::trim) != Some(required) {
            warn!(username = %req.username, "Admin registration with a wrong code");
            return Err(ApiError::validation(
                "registration_code",
                "Invalid admin registration code",
            ));
        }
    }
    check_passwords(&req.password, &req.password_confirm)?;
    let email = required_email("email", &req.email)?;
    ensure_email_unused(&state, &email).await?;

    let identity = create_inactive_identity(
        &state,
        &req.username,
        &email,
        &req.password,
        String::new(),
        String::new(),
    )
    .await?;
    let identity_id = identity.id;
    let promoted = async {
        let identity = state
            .repo
            .update_identity(&Identity {
                is_staff: true,
                is_superuser: state.config.make_admin_superuser_on_registration,
                ..identity
            })
            .await?;
        send_activation(&state, &identity).await?;
        Ok::<_, ApiError>(identity)
    }
    .await;
    let identity = match promoted {
        Ok(identity) => identity,
        Err(e) => {
            rollback_registration(&state, identity_id, None).await;
            return Err(e);
        }
    };
    info!(
        identity_id = %identity.id,
        superuser = identity.is_superuser,
        "Admin registered"
    );
    Ok(registered(&identity))
}

/// GET /activate/{token} - Activate an account and log it in
#[utoipa::path(
    get,
    path = "/activate/{token}",
    params(("token" = String, Path, description = "The token from the activation email.")),
    responses(
        (status = 200, description = "Account activated and logged in", body = AuthResponse),
        (status = 404, description = "Unknown or expired token")
    )
)]
pub async fn activate_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let identity_id = state.repo.consume_activation_token(&token).await?;
    state.repo.activate_identity(identity_id).await?;
    let identity = state.repo.get_identity(identity_id).await?;
    info!(%identity_id, "Account activated");

    let cookie = start_session(&state, identity.id).await?;
    let role = resolve_caller_role(&state, &identity).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            identity_id: identity.id,
            username: identity.username,
            role: role.name().to_string(),
            redirect: role.dashboard_path().to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rules() {
        assert!(check_passwords("short", "short").is_err());
        assert!(check_passwords("long-enough", "long-enougH").is_err());
        assert!(check_passwords("long-enough", "long-enough").is_ok());
    }

    #[test]
    fn hashes_verify() {
        let hash = hash_password("correct horse").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"correct horse", &parsed)
            .is_ok());
    }
}
