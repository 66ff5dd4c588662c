//! services/api/src/web/dashboard.rs
//!
//! Role dashboards. Each handler resolves the caller's role, fetches a record
//! snapshot and lets the core assemble the view.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use records_core::dashboard::{build_dashboard_snapshot, RecordSet, RECENT_LIMIT};
use records_core::domain::Identity;
use records_core::grading::current_semester;
use records_core::roles::Role;
use std::sync::Arc;

use crate::error::ApiError;
use crate::web::access::resolve_caller_role;
use crate::web::models::{DashboardView, MeResponse};
use crate::web::state::AppState;

/// Fetches what the role's dashboard reads. Only the global view needs the
/// full record set.
async fn records_for(state: &AppState, role: &Role) -> Result<RecordSet, ApiError> {
    match role {
        Role::Student(student) => Ok(RecordSet {
            students: vec![student.clone()],
            results: state.repo.fetch_results_for_student(student.id).await?,
            ..RecordSet::default()
        }),
        Role::Lecturer(lecturer) => {
            let (mut students, courses, results, result_count) = futures::try_join!(
                state.repo.fetch_all_active_students(),
                state.repo.list_courses(None),
                state
                    .repo
                    .fetch_recent_results_for_courses(&lecturer.course_ids, RECENT_LIMIT),
                state.repo.count_results_for_courses(&lecturer.course_ids),
            )?;
            // Recent results may belong to inactive students; load those for their names.
            for r in &results {
                if !students.iter().any(|s| s.id == r.result.student_id) {
                    students.push(state.repo.get_student(r.result.student_id).await?);
                }
            }
            Ok(RecordSet {
                students,
                courses,
                lecturers: vec![lecturer.clone()],
                results,
                result_count: Some(result_count),
            })
        }
        Role::Administrator | Role::Unresolved(_) => Ok(state.repo.fetch_record_set().await?),
    }
}

async fn render(state: &AppState, role: &Role) -> Result<Json<DashboardView>, ApiError> {
    let records = records_for(state, role).await?;
    let snapshot = build_dashboard_snapshot(role, &records);
    Ok(Json(DashboardView::from_snapshot(
        &snapshot,
        current_semester(Utc::now().date_naive()),
    )))
}

/// The landing dashboard: whatever view the caller's role gets.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard for the caller's role", body = DashboardView),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn landing_dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DashboardView>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    render(&state, &role).await
}

#[utoipa::path(
    get,
    path = "/dashboard/admin",
    responses(
        (status = 200, description = "Global dashboard", body = DashboardView),
        (status = 403, description = "Caller is not an administrator")
    )
)]
pub async fn admin_dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DashboardView>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    if !matches!(role, Role::Administrator) {
        return Err(ApiError::Forbidden);
    }
    render(&state, &role).await
}

#[utoipa::path(
    get,
    path = "/dashboard/lecturer",
    responses(
        (status = 200, description = "Lecturer dashboard", body = DashboardView),
        (status = 403, description = "Caller is not a lecturer")
    )
)]
pub async fn lecturer_dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DashboardView>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    if !matches!(role, Role::Lecturer(_)) {
        return Err(ApiError::Forbidden);
    }
    render(&state, &role).await
}

#[utoipa::path(
    get,
    path = "/dashboard/student",
    responses(
        (status = 200, description = "Student dashboard", body = DashboardView),
        (status = 403, description = "Caller is not a student")
    )
)]
pub async fn student_dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DashboardView>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    if !matches!(role, Role::Student(_)) {
        return Err(ApiError::Forbidden);
    }
    render(&state, &role).await
}

/// The caller's identity, resolved role and landing path.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Caller identity and role", body = MeResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<MeResponse>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    Ok(Json(MeResponse::new(&identity, &role)))
}
