pub mod access;
pub mod account;
pub mod auth;
pub mod dashboard;
pub mod export;
pub mod middleware;
pub mod models;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use state::AppState;

/// Builds every route of the service with `state` attached. CORS and the
/// Swagger UI are layered on by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/register/student", post(auth::register_student_handler))
        .route("/register/lecturer", post(auth::register_lecturer_handler))
        .route("/register/admin", post(auth::register_admin_handler))
        .route("/activate/{token}", get(auth::activate_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(dashboard::me_handler))
        .route("/dashboard", get(dashboard::landing_dashboard_handler))
        .route("/dashboard/admin", get(dashboard::admin_dashboard_handler))
        .route("/dashboard/lecturer", get(dashboard::lecturer_dashboard_handler))
        .route("/dashboard/student", get(dashboard::student_dashboard_handler))
        .route(
            "/api/students",
            get(rest::list_students_handler).post(rest::create_student_handler),
        )
        .route(
            "/api/students/{id}",
            get(rest::get_student_handler)
                .put(rest::update_student_handler)
                .delete(rest::delete_student_handler),
        )
        .route(
            "/api/courses",
            get(rest::list_courses_handler).post(rest::create_course_handler),
        )
        .route(
            "/api/courses/{id}",
            get(rest::get_course_handler)
                .put(rest::update_course_handler)
                .delete(rest::delete_course_handler),
        )
        .route(
            "/api/lecturers",
            get(rest::list_lecturers_handler).post(rest::create_lecturer_handler),
        )
        .route(
            "/api/lecturers/{id}",
            get(rest::get_lecturer_handler)
                .put(rest::update_lecturer_handler)
                .delete(rest::delete_lecturer_handler),
        )
        .route(
            "/api/results",
            get(rest::list_results_handler).post(rest::create_result_handler),
        )
        .route(
            "/api/results/{id}",
            get(rest::get_result_handler)
                .put(rest::update_result_handler)
                .delete(rest::delete_result_handler),
        )
        .route("/students/{id}/profile", put(account::update_profile_handler))
        .route(
            "/students/{id}/download",
            get(export::download_student_results_handler),
        )
        .route("/export/results", get(export::export_results_handler))
        .route("/export/students", get(export::export_students_handler))
        .route(
            "/admin/settings",
            put(account::update_admin_settings_handler).delete(account::delete_admin_account_handler),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
