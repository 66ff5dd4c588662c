//! services/api/src/web/models.rs
//!
//! JSON request and response bodies for the HTTP surface, and their conversions
//! from the core domain types. Incoming payloads are validated here before any
//! port is called.

use chrono::{DateTime, NaiveDate, Utc};
use records_core::dashboard::{
    DashboardSnapshot, GlobalSnapshot, LecturerSnapshot, RecentResult, StudentSnapshot,
    TopPerformer,
};
use records_core::domain::{Course, Identity, Lecturer, ResultDetail, Student};
use records_core::grading::{sort_chronologically, Grade, SemesterSummary};
use records_core::roles::{Role, Unresolved};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;

pub const PAGE_SIZE: usize = 10;

static EMAIL_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$"));

//=========================================================================================
// Field Validation
//=========================================================================================

/// Trims `value` and checks it is non-empty and at most `max` characters.
pub fn required_text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(field, "This field is required"));
    }
    bounded_text(field, value, max)
}

pub fn bounded_text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(ApiError::validation(
            field,
            format!("Ensure this field has no more than {} characters", max),
        ));
    }
    Ok(value.to_string())
}

/// Blank optional text becomes `None`.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => bounded_text(field, v, max).map(Some),
        None => Ok(None),
    }
}

pub fn optional_email(field: &str, value: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(email) = optional_text(field, value, 254)? else {
        return Ok(None);
    };
    let re = EMAIL_RE
        .as_ref()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !re.is_match(&email) {
        return Err(ApiError::validation(field, "Enter a valid email address"));
    }
    Ok(Some(email))
}

pub fn required_email(field: &str, value: &str) -> Result<String, ApiError> {
    optional_email(field, Some(value))?
        .ok_or_else(|| ApiError::validation(field, "This field is required"))
}

pub fn parse_grade(value: &str) -> Result<Grade, ApiError> {
    value
        .parse::<Grade>()
        .map_err(|e| ApiError::validation("grade", e.to_string()))
}

//=========================================================================================
// Lists and Pagination
//=========================================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive substring filter.
    pub search: Option<String>,
    /// 1-based page number, ten items per page.
    pub page: Option<usize>,
}

impl ListQuery {
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Slices one page out of `items`. An out-of-range page is a 404, except that
/// page 1 of an empty list is just empty.
pub fn paginate<T>(items: Vec<T>, page: Option<usize>) -> Result<(usize, usize, Vec<T>), ApiError> {
    let invalid = || {
        ApiError::Port(records_core::ports::PortError::NotFound(
            "Invalid page".to_string(),
        ))
    };
    let page = page.unwrap_or(1);
    let count = items.len();
    let start = page
        .checked_sub(1)
        .and_then(|p| p.checked_mul(PAGE_SIZE))
        .ok_or_else(invalid)?;
    if page > 1 && start >= count {
        return Err(invalid());
    }
    let results = items.into_iter().skip(start).take(PAGE_SIZE).collect();
    Ok((count, page, results))
}

#[derive(Serialize, ToSchema)]
pub struct StudentPage {
    pub count: usize,
    pub page: usize,
    pub results: Vec<StudentView>,
}

#[derive(Serialize, ToSchema)]
pub struct CoursePage {
    pub count: usize,
    pub page: usize,
    pub results: Vec<CourseView>,
}

#[derive(Serialize, ToSchema)]
pub struct LecturerPage {
    pub count: usize,
    pub page: usize,
    pub results: Vec<LecturerView>,
}

#[derive(Serialize, ToSchema)]
pub struct ResultPage {
    pub count: usize,
    pub page: usize,
    pub results: Vec<ResultView>,
}

//=========================================================================================
// Students
//=========================================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentView {
    pub id: Uuid,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub program: Option<String>,
    pub department: Option<String>,
    pub faculty: Option<String>,
    pub enrollment_date: Option<NaiveDate>,
    pub is_active: bool,
    pub identity_id: Option<Uuid>,
}

impl From<&Student> for StudentView {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id,
            student_id: s.student_number.clone(),
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            full_name: s.full_name(),
            email: s.email.clone(),
            program: s.program.clone(),
            department: s.department.clone(),
            faculty: s.faculty.clone(),
            enrollment_date: s.enrollment_date,
            is_active: s.is_active,
            identity_id: s.identity_id,
        }
    }
}

/// Create/replace body for a student record (staff only).
#[derive(Debug, Deserialize, ToSchema)]
pub struct StudentPayload {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub program: Option<String>,
    pub department: Option<String>,
    pub faculty: Option<String>,
    pub enrollment_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub identity_id: Option<Uuid>,
}

/// The fields a student may change on their own record.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfilePayload {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub program: Option<String>,
    pub department: Option<String>,
    pub faculty: Option<String>,
}

//=========================================================================================
// Courses
//=========================================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CourseView {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub credits: u16,
    pub description: String,
    pub semester: String,
    pub is_active: bool,
}

impl From<&Course> for CourseView {
    fn from(c: &Course) -> Self {
        Self {
            id: c.id,
            code: c.code.clone(),
            name: c.name.clone(),
            credits: c.credits,
            description: c.description.clone(),
            semester: c.semester.clone(),
            is_active: c.is_active,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CoursePayload {
    pub code: String,
    pub name: String,
    #[serde(default = "default_credits")]
    pub credits: u16,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

//=========================================================================================
// Lecturers
//=========================================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LecturerView {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub staff_id: String,
    pub department: String,
    pub is_admin_assistant: bool,
    pub course_ids: Vec<Uuid>,
}

impl From<&Lecturer> for LecturerView {
    fn from(l: &Lecturer) -> Self {
        Self {
            id: l.id,
            identity_id: l.identity_id,
            staff_id: l.staff_id.clone(),
            department: l.department.clone(),
            is_admin_assistant: l.is_admin_assistant,
            course_ids: l.course_ids.clone(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LecturerPayload {
    pub identity_id: Uuid,
    pub staff_id: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub is_admin_assistant: bool,
    #[serde(default)]
    pub course_ids: Vec<Uuid>,
}

//=========================================================================================
// Results
//=========================================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentBrief {
    pub id: Uuid,
    pub student_id: String,
    pub full_name: String,
}

impl From<&Student> for StudentBrief {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id,
            student_id: s.student_number.clone(),
            full_name: s.full_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResultView {
    pub id: Uuid,
    pub student: StudentBrief,
    pub course: CourseView,
    pub grade: String,
    /// Coarse letter band (A, B, C, D or F).
    pub grade_band: String,
    pub grade_points: f64,
    pub semester: String,
    pub remarks: String,
    pub recorded_at: DateTime<Utc>,
}

impl ResultView {
    pub fn new(detail: &ResultDetail, student: &Student) -> Self {
        Self {
            id: detail.result.id,
            student: StudentBrief::from(student),
            course: CourseView::from(&detail.course),
            grade: detail.grade().to_string(),
            grade_band: detail.grade().band().to_string(),
            grade_points: detail.grade().points(),
            semester: detail.result.semester.clone(),
            remarks: detail.result.remarks.clone(),
            recorded_at: detail.result.recorded_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResultPayload {
    pub student_id: Uuid,
    pub course_id: Uuid,
    /// One of A+, A, A-, B+, B, B-, C+, C, C-, D, F.
    pub grade: String,
    pub semester: String,
    #[serde(default)]
    pub remarks: String,
}

//=========================================================================================
// Dashboards
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct RecentResultView {
    pub result_id: Uuid,
    pub student_id: Uuid,
    pub student_number: String,
    pub student_name: String,
    pub course_code: String,
    pub course_name: String,
    pub grade: String,
    pub semester: String,
    pub recorded_at: DateTime<Utc>,
}

impl From<&RecentResult> for RecentResultView {
    fn from(r: &RecentResult) -> Self {
        Self {
            result_id: r.result_id,
            student_id: r.student_id,
            student_number: r.student_number.clone(),
            student_name: r.student_name.clone(),
            course_code: r.course_code.clone(),
            course_name: r.course_name.clone(),
            grade: r.grade.to_string(),
            semester: r.semester.clone(),
            recorded_at: r.recorded_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopPerformerView {
    pub student: StudentBrief,
    pub gpa: f64,
}

impl From<&TopPerformer> for TopPerformerView {
    fn from(t: &TopPerformer) -> Self {
        Self {
            student: StudentBrief::from(&t.student),
            gpa: t.gpa,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SemesterSummaryView {
    pub semester: String,
    pub count: usize,
    pub total_points: f64,
    pub average: f64,
}

impl From<&SemesterSummary> for SemesterSummaryView {
    fn from(s: &SemesterSummary) -> Self {
        Self {
            semester: s.semester.clone(),
            count: s.count,
            total_points: s.total_points,
            average: s.average,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GlobalDashboard {
    pub current_semester: String,
    pub total_students: usize,
    pub total_courses: usize,
    pub total_lecturers: usize,
    pub total_results: usize,
    pub recent_results: Vec<RecentResultView>,
    pub top_performers: Vec<TopPerformerView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LecturerDashboard {
    pub current_semester: String,
    pub lecturer: LecturerView,
    pub total_students: usize,
    pub total_courses: usize,
    pub total_results: usize,
    pub recent_results: Vec<RecentResultView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudentDashboard {
    pub current_semester: String,
    pub student: StudentView,
    pub gpa: f64,
    pub total_results: usize,
    pub semester_summary: Vec<SemesterSummaryView>,
    pub recent_results: Vec<RecentResultView>,
}

/// The dashboard body, tagged by which view was assembled.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum DashboardView {
    Global(GlobalDashboard),
    Lecturer(LecturerDashboard),
    Student(StudentDashboard),
}

fn recent(items: &[RecentResult]) -> Vec<RecentResultView> {
    items.iter().map(RecentResultView::from).collect()
}

impl DashboardView {
    pub fn from_snapshot(snapshot: &DashboardSnapshot, current_semester: String) -> Self {
        match snapshot {
            DashboardSnapshot::Global(GlobalSnapshot {
                total_students,
                total_courses,
                total_lecturers,
                total_results,
                recent_results,
                top_performers,
            }) => DashboardView::Global(GlobalDashboard {
                current_semester,
                total_students: *total_students,
                total_courses: *total_courses,
                total_lecturers: *total_lecturers,
                total_results: *total_results,
                recent_results: recent(recent_results),
                top_performers: top_performers.iter().map(TopPerformerView::from).collect(),
            }),
            DashboardSnapshot::Lecturer(LecturerSnapshot {
                lecturer,
                total_students,
                total_courses,
                total_results,
                recent_results,
            }) => DashboardView::Lecturer(LecturerDashboard {
                current_semester,
                lecturer: LecturerView::from(lecturer),
                total_students: *total_students,
                total_courses: *total_courses,
                total_results: *total_results,
                recent_results: recent(recent_results),
            }),
            DashboardSnapshot::Student(StudentSnapshot {
                student,
                gpa,
                total_results,
                semester_summary,
                recent_results,
            }) => {
                let mut semester_summary = semester_summary.clone();
                sort_chronologically(&mut semester_summary);
                DashboardView::Student(StudentDashboard {
                    current_semester,
                    student: StudentView::from(student),
                    gpa: *gpa,
                    total_results: *total_results,
                    semester_summary: semester_summary.iter().map(SemesterSummaryView::from).collect(),
                    recent_results: recent(recent_results),
                })
            }
        }
    }
}

//=========================================================================================
// Identity
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityView {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl From<&Identity> for IdentityView {
    fn from(i: &Identity) -> Self {
        Self {
            id: i.id,
            username: i.username.clone(),
            email: i.email.clone(),
            first_name: i.first_name.clone(),
            last_name: i.last_name.clone(),
            is_active: i.is_active,
            is_staff: i.is_staff,
            is_superuser: i.is_superuser,
        }
    }
}

/// Who the caller is and where they should land.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub identity: IdentityView,
    pub role: String,
    pub dashboard: String,
    /// Set when the role could not be resolved, e.g. `ambiguous_email`.
    pub unresolved_reason: Option<String>,
    pub student_id: Option<Uuid>,
    pub lecturer_id: Option<Uuid>,
}

impl MeResponse {
    pub fn new(identity: &Identity, role: &Role) -> Self {
        let unresolved_reason = match role {
            Role::Unresolved(Unresolved::NoMatch) => Some("no_match".to_string()),
            Role::Unresolved(Unresolved::AmbiguousEmail { .. }) => {
                Some("ambiguous_email".to_string())
            }
            _ => None,
        };
        Self {
            identity: IdentityView::from(identity),
            role: role.name().to_string(),
            dashboard: role.dashboard_path().to_string(),
            unresolved_reason,
            student_id: role.student().map(|s| s.id),
            lecturer_id: role.lecturer().map(|l| l.id),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_credits() -> u16 {
    3
}
