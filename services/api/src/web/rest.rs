//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the JSON CRUD endpoints under `/api` and the
//! master definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::access::{precheck_student_access, require_staff, resolve_caller_role};
use crate::web::models::*;
use crate::web::state::AppState;
use crate::web::{account, auth, dashboard, export};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use records_core::domain::{
    Course, CourseResult, Identity, Lecturer, NewCourse, NewLecturer, NewResult, NewStudent,
    ResultDetail, Student,
};
use records_core::ports::{PortError, PortResult};
use records_core::roles::{authorize_self_access, can_manage_result, Role};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        auth::register_student_handler,
        auth::register_lecturer_handler,
        auth::register_admin_handler,
        auth::activate_handler,
        dashboard::landing_dashboard_handler,
        dashboard::admin_dashboard_handler,
        dashboard::lecturer_dashboard_handler,
        dashboard::student_dashboard_handler,
        dashboard::me_handler,
        list_students_handler,
        create_student_handler,
        get_student_handler,
        update_student_handler,
        delete_student_handler,
        list_courses_handler,
        create_course_handler,
        get_course_handler,
        update_course_handler,
        delete_course_handler,
        list_lecturers_handler,
        create_lecturer_handler,
        get_lecturer_handler,
        update_lecturer_handler,
        delete_lecturer_handler,
        list_results_handler,
        create_result_handler,
        get_result_handler,
        update_result_handler,
        delete_result_handler,
        account::update_profile_handler,
        account::update_admin_settings_handler,
        account::delete_admin_account_handler,
        export::download_student_results_handler,
        export::export_results_handler,
        export::export_students_handler,
    ),
    components(
        schemas(
            auth::LoginRequest, auth::AuthResponse, auth::StudentRegistration,
            auth::LecturerRegistration, auth::AdminRegistration, auth::RegistrationResponse,
            account::AdminSettingsPayload,
            StudentView, StudentPayload, ProfilePayload, StudentPage, StudentBrief,
            CourseView, CoursePayload, CoursePage,
            LecturerView, LecturerPayload, LecturerPage,
            ResultView, ResultPayload, ResultPage,
            DashboardView, GlobalDashboard, LecturerDashboard, StudentDashboard,
            RecentResultView, TopPerformerView, SemesterSummaryView,
            IdentityView, MeResponse,
        )
    ),
    tags(
        (name = "University Records API", description = "Students, courses, lecturers, results and role dashboards.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Helpers
//=========================================================================================

/// Students are listed for staff and lecturers only.
fn can_browse_students(identity: &Identity, role: &Role) -> bool {
    identity.has_staff_override() || matches!(role, Role::Lecturer(_))
}

/// Whether `role` may read `result`: staff see everything, lecturers see the
/// courses they teach, students see their own.
fn can_view_result(identity: &Identity, role: &Role, result: &CourseResult) -> bool {
    if identity.has_staff_override() {
        return true;
    }
    match role {
        Role::Lecturer(l) => l.teaches(result.course_id),
        Role::Student(s) => s.id == result.student_id,
        _ => false,
    }
}

fn student_from_payload(p: StudentPayload) -> Result<NewStudent, ApiError> {
    Ok(NewStudent {
        student_number: required_text("student_id", &p.student_id, 20)?,
        first_name: required_text("first_name", &p.first_name, 100)?,
        last_name: required_text("last_name", &p.last_name, 100)?,
        email: optional_email("email", p.email.as_deref())?,
        program: optional_text("program", p.program.as_deref(), 128)?,
        department: optional_text("department", p.department.as_deref(), 128)?,
        faculty: optional_text("faculty", p.faculty.as_deref(), 128)?,
        enrollment_date: p.enrollment_date,
        is_active: p.is_active,
        identity_id: p.identity_id,
    })
}

fn course_from_payload(p: CoursePayload) -> Result<NewCourse, ApiError> {
    if p.credits == 0 {
        return Err(ApiError::validation("credits", "Credits must be a positive integer"));
    }
    Ok(NewCourse {
        code: required_text("code", &p.code, 20)?,
        name: required_text("name", &p.name, 200)?,
        credits: p.credits,
        description: p.description.trim().to_string(),
        semester: bounded_text("semester", &p.semester, 32)?,
        is_active: p.is_active,
    })
}

/// A referenced record that does not exist is a field error; any other
/// storage failure passes through unchanged.
fn referenced<T>(found: PortResult<T>, field: &str, message: impl Into<String>) -> Result<T, ApiError> {
    match found {
        Ok(record) => Ok(record),
        Err(PortError::NotFound(_)) => Err(ApiError::validation(field, message)),
        Err(e) => Err(e.into()),
    }
}

async fn lecturer_from_payload(state: &AppState, p: LecturerPayload) -> Result<NewLecturer, ApiError> {
    referenced(
        state.repo.get_identity(p.identity_id).await,
        "identity_id",
        "Unknown identity",
    )?;
    let mut course_ids = p.course_ids;
    course_ids.sort();
    course_ids.dedup();
    for course_id in &course_ids {
        referenced(
            state.repo.get_course(*course_id).await,
            "course_ids",
            format!("Unknown course {}", course_id),
        )?;
    }
    Ok(NewLecturer {
        identity_id: p.identity_id,
        staff_id: required_text("staff_id", &p.staff_id, 20)?,
        department: bounded_text("department", &p.department, 100)?,
        is_admin_assistant: p.is_admin_assistant,
        course_ids,
    })
}

async fn result_from_payload(state: &AppState, p: ResultPayload) -> Result<(NewResult, Student), ApiError> {
    let grade = parse_grade(&p.grade)?;
    let semester = required_text("semester", &p.semester, 32)?;
    let student = referenced(
        state.repo.get_student(p.student_id).await,
        "student_id",
        "Unknown student",
    )?;
    referenced(
        state.repo.get_course(p.course_id).await,
        "course_id",
        "Unknown course",
    )?;
    Ok((
        NewResult {
            student_id: p.student_id,
            course_id: p.course_id,
            grade,
            semester,
            remarks: p.remarks.trim().to_string(),
        },
        student,
    ))
}

//=========================================================================================
// Students
//=========================================================================================

/// List students, ordered by student ID.
#[utoipa::path(
    get,
    path = "/api/students",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of students", body = StudentPage),
        (status = 403, description = "Caller may not browse students")
    )
)]
pub async fn list_students_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<StudentPage>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    if !can_browse_students(&identity, &role) {
        return Err(ApiError::Forbidden);
    }
    let students = state.repo.list_students(query.search()).await?;
    let (count, page, results) = paginate(students, query.page)?;
    Ok(Json(StudentPage {
        count,
        page,
        results: results.iter().map(StudentView::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/students",
    request_body = StudentPayload,
    responses(
        (status = 201, description = "Student created", body = StudentView),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Student ID already exists")
    )
)]
pub async fn create_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<StudentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&identity)?;
    let student = state.repo.create_student(student_from_payload(payload)?).await?;
    info!(student_id = %student.id, by = %identity.username, "Student created");
    Ok((StatusCode::CREATED, Json(StudentView::from(&student))))
}

#[utoipa::path(
    get,
    path = "/api/students/{id}",
    params(("id" = Uuid, Path, description = "Student primary key")),
    responses(
        (status = 200, description = "The student", body = StudentView),
        (status = 403, description = "Not the caller's own record"),
        (status = 404, description = "No such student")
    )
)]
pub async fn get_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<StudentView>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    if !can_browse_students(&identity, &role) {
        precheck_student_access(&identity, &role, id)?;
    }
    let student = state.repo.get_student(id).await?;
    if !can_browse_students(&identity, &role) && !authorize_self_access(&identity, &role, &student) {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(StudentView::from(&student)))
}

#[utoipa::path(
    put,
    path = "/api/students/{id}",
    params(("id" = Uuid, Path, description = "Student primary key")),
    request_body = StudentPayload,
    responses(
        (status = 200, description = "Student updated", body = StudentView),
        (status = 404, description = "No such student"),
        (status = 409, description = "Student ID already exists")
    )
)]
pub async fn update_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StudentPayload>,
) -> Result<Json<StudentView>, ApiError> {
    require_staff(&identity)?;
    let fields = student_from_payload(payload)?;
    let existing = state.repo.get_student(id).await?;
    let student = state
        .repo
        .update_student(&Student {
            id: existing.id,
            student_number: fields.student_number,
            first_name: fields.first_name,
            last_name: fields.last_name,
            email: fields.email,
            program: fields.program,
            department: fields.department,
            faculty: fields.faculty,
            enrollment_date: fields.enrollment_date,
            is_active: fields.is_active,
            identity_id: fields.identity_id,
        })
        .await?;
    Ok(Json(StudentView::from(&student)))
}

#[utoipa::path(
    delete,
    path = "/api/students/{id}",
    params(("id" = Uuid, Path, description = "Student primary key")),
    responses(
        (status = 204, description = "Student and their results deleted"),
        (status = 404, description = "No such student")
    )
)]
pub async fn delete_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_staff(&identity)?;
    state.repo.delete_student(id).await?;
    info!(student_id = %id, by = %identity.username, "Student deleted");
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Courses
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/courses",
    params(ListQuery),
    responses((status = 200, description = "One page of courses", body = CoursePage))
)]
pub async fn list_courses_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<CoursePage>, ApiError> {
    let courses = state.repo.list_courses(query.search()).await?;
    let (count, page, results) = paginate(courses, query.page)?;
    Ok(Json(CoursePage {
        count,
        page,
        results: results.iter().map(CourseView::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/courses",
    request_body = CoursePayload,
    responses(
        (status = 201, description = "Course created", body = CourseView),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Course code already exists")
    )
)]
pub async fn create_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CoursePayload>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&identity)?;
    let course = state.repo.create_course(course_from_payload(payload)?).await?;
    info!(code = %course.code, by = %identity.username, "Course created");
    Ok((StatusCode::CREATED, Json(CourseView::from(&course))))
}

#[utoipa::path(
    get,
    path = "/api/courses/{id}",
    params(("id" = Uuid, Path, description = "Course primary key")),
    responses(
        (status = 200, description = "The course", body = CourseView),
        (status = 404, description = "No such course")
    )
)]
pub async fn get_course_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseView>, ApiError> {
    let course = state.repo.get_course(id).await?;
    Ok(Json(CourseView::from(&course)))
}

#[utoipa::path(
    put,
    path = "/api/courses/{id}",
    params(("id" = Uuid, Path, description = "Course primary key")),
    request_body = CoursePayload,
    responses(
        (status = 200, description = "Course updated", body = CourseView),
        (status = 404, description = "No such course"),
        (status = 409, description = "Course code already exists")
    )
)]
pub async fn update_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CoursePayload>,
) -> Result<Json<CourseView>, ApiError> {
    require_staff(&identity)?;
    let fields = course_from_payload(payload)?;
    let course = state
        .repo
        .update_course(&Course {
            id,
            code: fields.code,
            name: fields.name,
            credits: fields.credits,
            description: fields.description,
            semester: fields.semester,
            is_active: fields.is_active,
        })
        .await?;
    Ok(Json(CourseView::from(&course)))
}

#[utoipa::path(
    delete,
    path = "/api/courses/{id}",
    params(("id" = Uuid, Path, description = "Course primary key")),
    responses(
        (status = 204, description = "Course deleted"),
        (status = 404, description = "No such course"),
        (status = 409, description = "Course still has results")
    )
)]
pub async fn delete_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_staff(&identity)?;
    state.repo.delete_course(id).await?;
    info!(course_id = %id, by = %identity.username, "Course deleted");
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Lecturers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/lecturers",
    params(ListQuery),
    responses((status = 200, description = "One page of lecturers", body = LecturerPage))
)]
pub async fn list_lecturers_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<LecturerPage>, ApiError> {
    let lecturers = state.repo.list_lecturers(query.search()).await?;
    let (count, page, results) = paginate(lecturers, query.page)?;
    Ok(Json(LecturerPage {
        count,
        page,
        results: results.iter().map(LecturerView::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/lecturers",
    request_body = LecturerPayload,
    responses(
        (status = 201, description = "Lecturer created", body = LecturerView),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Staff ID or identity already used")
    )
)]
pub async fn create_lecturer_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<LecturerPayload>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&identity)?;
    let new = lecturer_from_payload(&state, payload).await?;
    let lecturer = state.repo.create_lecturer(new).await?;
    info!(staff_id = %lecturer.staff_id, by = %identity.username, "Lecturer created");
    Ok((StatusCode::CREATED, Json(LecturerView::from(&lecturer))))
}

#[utoipa::path(
    get,
    path = "/api/lecturers/{id}",
    params(("id" = Uuid, Path, description = "Lecturer primary key")),
    responses(
        (status = 200, description = "The lecturer", body = LecturerView),
        (status = 404, description = "No such lecturer")
    )
)]
pub async fn get_lecturer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LecturerView>, ApiError> {
    let lecturer = state.repo.get_lecturer(id).await?;
    Ok(Json(LecturerView::from(&lecturer)))
}

#[utoipa::path(
    put,
    path = "/api/lecturers/{id}",
    params(("id" = Uuid, Path, description = "Lecturer primary key")),
    request_body = LecturerPayload,
    responses(
        (status = 200, description = "Lecturer updated", body = LecturerView),
        (status = 404, description = "No such lecturer"),
        (status = 409, description = "Staff ID or identity already used")
    )
)]
pub async fn update_lecturer_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LecturerPayload>,
) -> Result<Json<LecturerView>, ApiError> {
    require_staff(&identity)?;
    let fields = lecturer_from_payload(&state, payload).await?;
    let lecturer = state
        .repo
        .update_lecturer(&Lecturer {
            id,
            identity_id: fields.identity_id,
            staff_id: fields.staff_id,
            department: fields.department,
            is_admin_assistant: fields.is_admin_assistant,
            course_ids: fields.course_ids,
        })
        .await?;
    Ok(Json(LecturerView::from(&lecturer)))
}

#[utoipa::path(
    delete,
    path = "/api/lecturers/{id}",
    params(("id" = Uuid, Path, description = "Lecturer primary key")),
    responses(
        (status = 204, description = "Lecturer deleted"),
        (status = 404, description = "No such lecturer")
    )
)]
pub async fn delete_lecturer_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_staff(&identity)?;
    state.repo.delete_lecturer(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Results
//=========================================================================================

/// List results visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/results",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of results", body = ResultPage),
        (status = 403, description = "Caller has no role")
    )
)]
pub async fn list_results_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ResultPage>, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    if matches!(role, Role::Unresolved(_)) && !identity.has_staff_override() {
        return Err(ApiError::Forbidden);
    }
    let (details, students) = futures::try_join!(
        state.repo.list_results(query.search()),
        state.repo.list_students(None),
    )?;
    let students: HashMap<Uuid, Student> = students.into_iter().map(|s| (s.id, s)).collect();

    let visible: Vec<ResultDetail> = details
        .into_iter()
        .filter(|d| can_view_result(&identity, &role, &d.result))
        .collect();
    let (count, page, results) = paginate(visible, query.page)?;
    Ok(Json(ResultPage {
        count,
        page,
        results: results
            .iter()
            .filter_map(|d| students.get(&d.result.student_id).map(|s| ResultView::new(d, s)))
            .collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/results",
    request_body = ResultPayload,
    responses(
        (status = 201, description = "Result recorded", body = ResultView),
        (status = 400, description = "Invalid grade or unknown student/course"),
        (status = 403, description = "Caller may not grade this course"),
        (status = 409, description = "A result for this student, course and semester exists")
    )
)]
pub async fn create_result_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ResultPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    if !can_manage_result(&identity, &role, payload.course_id) {
        return Err(ApiError::Forbidden);
    }
    let (new, student) = result_from_payload(&state, payload).await?;
    let detail = state.repo.create_result(new).await?;
    info!(
        result_id = %detail.result.id,
        grade = %detail.grade(),
        by = %identity.username,
        "Result recorded"
    );
    Ok((StatusCode::CREATED, Json(ResultView::new(&detail, &student))))
}

#[utoipa::path(
    get,
    path = "/api/results/{id}",
    params(("id" = Uuid, Path, description = "Result primary key")),
    responses(
        (status = 200, description = "The result", body = ResultView),
        (status = 403, description = "Result not visible to the caller"),
        (status = 404, description = "No such result")
    )
)]
pub async fn get_result_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResultView>, ApiError> {
    let detail = state.repo.get_result(id).await?;
    let role = resolve_caller_role(&state, &identity).await?;
    if !can_view_result(&identity, &role, &detail.result) {
        return Err(ApiError::Forbidden);
    }
    let student = state.repo.get_student(detail.result.student_id).await?;
    Ok(Json(ResultView::new(&detail, &student)))
}

#[utoipa::path(
    put,
    path = "/api/results/{id}",
    params(("id" = Uuid, Path, description = "Result primary key")),
    request_body = ResultPayload,
    responses(
        (status = 200, description = "Result updated", body = ResultView),
        (status = 400, description = "Invalid grade or unknown student/course"),
        (status = 403, description = "Caller may not grade this course"),
        (status = 404, description = "No such result"),
        (status = 409, description = "A result for this student, course and semester exists")
    )
)]
pub async fn update_result_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResultPayload>,
) -> Result<Json<ResultView>, ApiError> {
    let existing = state.repo.get_result(id).await?;
    let role = resolve_caller_role(&state, &identity).await?;
    if !can_manage_result(&identity, &role, existing.result.course_id)
        || !can_manage_result(&identity, &role, payload.course_id)
    {
        return Err(ApiError::Forbidden);
    }
    let (fields, student) = result_from_payload(&state, payload).await?;
    let detail = state
        .repo
        .update_result(&CourseResult {
            id,
            student_id: fields.student_id,
            course_id: fields.course_id,
            grade: fields.grade,
            semester: fields.semester,
            remarks: fields.remarks,
            recorded_at: existing.result.recorded_at,
        })
        .await?;
    Ok(Json(ResultView::new(&detail, &student)))
}

#[utoipa::path(
    delete,
    path = "/api/results/{id}",
    params(("id" = Uuid, Path, description = "Result primary key")),
    responses(
        (status = 204, description = "Result deleted"),
        (status = 403, description = "Caller may not grade this course"),
        (status = 404, description = "No such result")
    )
)]
pub async fn delete_result_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let existing = state.repo.get_result(id).await?;
    let role = resolve_caller_role(&state, &identity).await?;
    if !can_manage_result(&identity, &role, existing.result.course_id) {
        return Err(ApiError::Forbidden);
    }
    state.repo.delete_result(id).await?;
    info!(result_id = %id, by = %identity.username, "Result deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_references_are_field_errors() {
        let missing: PortResult<()> = Err(PortError::NotFound("Course".to_string()));
        match referenced(missing, "course_id", "Unknown course") {
            Err(ApiError::Validation { field, .. }) => assert_eq!(field, "course_id"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn storage_failures_are_not_hidden_as_bad_input() {
        let outage: PortResult<()> = Err(PortError::Unexpected("connection reset".to_string()));
        assert!(matches!(
            referenced(outage, "student_id", "Unknown student"),
            Err(ApiError::Port(PortError::Unexpected(_)))
        ));
        assert_eq!(referenced(Ok(7), "student_id", "Unknown student").unwrap(), 7);
    }
}
