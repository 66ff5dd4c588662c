//! crates/records_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core relies on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or mailers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dashboard::RecordSet;
use crate::domain::{
    Course, CourseResult, Identity, IdentityCredentials, Lecturer, NewCourse, NewIdentity,
    NewLecturer, NewResult, NewStudent, ResultDetail, Student,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, mail).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint was violated; carries the conflicting field.
    #[error("A record with this {0} already exists")]
    Conflict(String),
    /// A delete was refused because other records still reference the target.
    #[error("Cannot delete {0}: it is still referenced by existing results")]
    Protected(String),
    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistent storage for identities and university records.
///
/// Implementations must enforce the uniqueness constraints (username, student
/// number, course code, staff id, and the (student, course, semester) triple),
/// cascade result removal when a student is deleted, and refuse to delete a
/// course that still has results.
#[async_trait]
pub trait RecordsRepository: Send + Sync {
    // --- Identities ---
    async fn create_identity(&self, identity: NewIdentity) -> PortResult<Identity>;

    async fn get_identity(&self, identity_id: Uuid) -> PortResult<Identity>;

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<IdentityCredentials>;

    /// Case-insensitive email lookup.
    async fn find_identities_by_email(&self, email: &str) -> PortResult<Vec<Identity>>;

    async fn list_identities(&self) -> PortResult<Vec<Identity>>;

    async fn activate_identity(&self, identity_id: Uuid) -> PortResult<()>;

    async fn update_identity(&self, identity: &Identity) -> PortResult<Identity>;

    /// Removes the identity, its lecturer record and sessions; unlinks its student.
    async fn delete_identity(&self, identity_id: Uuid) -> PortResult<()>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        identity_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Activation Tokens ---
    async fn create_activation_token(
        &self,
        token: &str,
        identity_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the identity the token was issued for and invalidates it.
    async fn consume_activation_token(&self, token: &str) -> PortResult<Uuid>;

    // --- Students ---
    async fn list_students(&self, search: Option<&str>) -> PortResult<Vec<Student>>;

    async fn get_student(&self, student_id: Uuid) -> PortResult<Student>;

    async fn get_student_by_number(&self, student_number: &str) -> PortResult<Option<Student>>;

    async fn create_student(&self, student: NewStudent) -> PortResult<Student>;

    async fn update_student(&self, student: &Student) -> PortResult<Student>;

    /// Deletes the student together with all of its results.
    async fn delete_student(&self, student_id: Uuid) -> PortResult<()>;

    async fn find_student_by_identity(&self, identity_id: Uuid) -> PortResult<Option<Student>>;

    /// Case-insensitive email lookup.
    async fn find_students_by_email(&self, email: &str) -> PortResult<Vec<Student>>;

    async fn link_student_identity(&self, student_id: Uuid, identity_id: Uuid) -> PortResult<()>;

    async fn fetch_all_active_students(&self) -> PortResult<Vec<Student>>;

    // --- Courses ---
    async fn list_courses(&self, search: Option<&str>) -> PortResult<Vec<Course>>;

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course>;

    async fn create_course(&self, course: NewCourse) -> PortResult<Course>;

    async fn update_course(&self, course: &Course) -> PortResult<Course>;

    /// Fails with [`PortError::Protected`] while results reference the course.
    async fn delete_course(&self, course_id: Uuid) -> PortResult<()>;

    // --- Lecturers ---
    async fn list_lecturers(&self, search: Option<&str>) -> PortResult<Vec<Lecturer>>;

    async fn get_lecturer(&self, lecturer_id: Uuid) -> PortResult<Lecturer>;

    async fn create_lecturer(&self, lecturer: NewLecturer) -> PortResult<Lecturer>;

    async fn update_lecturer(&self, lecturer: &Lecturer) -> PortResult<Lecturer>;

    async fn delete_lecturer(&self, lecturer_id: Uuid) -> PortResult<()>;

    async fn find_lecturer_by_identity(&self, identity_id: Uuid) -> PortResult<Option<Lecturer>>;

    // --- Results ---
    async fn list_results(&self, search: Option<&str>) -> PortResult<Vec<ResultDetail>>;

    async fn get_result(&self, result_id: Uuid) -> PortResult<ResultDetail>;

    /// Fails with [`PortError::Conflict`] if the (student, course, semester) triple exists.
    async fn create_result(&self, result: NewResult) -> PortResult<ResultDetail>;

    async fn update_result(&self, result: &CourseResult) -> PortResult<ResultDetail>;

    async fn delete_result(&self, result_id: Uuid) -> PortResult<()>;

    /// The student's results, newest first.
    async fn fetch_results_for_student(&self, student_id: Uuid) -> PortResult<Vec<ResultDetail>>;

    async fn count_results_for_courses(&self, course_ids: &[Uuid]) -> PortResult<usize>;

    /// At most `limit` results recorded against any of `course_ids`, newest first.
    async fn fetch_recent_results_for_courses(
        &self,
        course_ids: &[Uuid],
        limit: usize,
    ) -> PortResult<Vec<ResultDetail>>;

    /// A consistent snapshot of every record, for dashboard assembly.
    async fn fetch_record_set(&self) -> PortResult<RecordSet>;
}

/// An outgoing account-activation email.
#[derive(Debug, Clone)]
pub struct ActivationMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait ActivationNotifier: Send + Sync {
    /// Delivers the activation message to the new account's email address.
    async fn send_activation(&self, message: &ActivationMessage) -> PortResult<()>;
}
