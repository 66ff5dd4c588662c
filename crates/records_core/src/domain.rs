//! crates/records_core/src/domain.rs
//!
//! Defines the pure, core data structures for the records service.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::grading::Grade;

/// A student enrolled at the university.
///
/// GPA is never stored on the record; it is derived from the student's
/// results on every read (see [`crate::grading::compute_gpa`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub id: Uuid,
    /// The public student number, unique across all students.
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub program: Option<String>,
    pub department: Option<String>,
    pub faculty: Option<String>,
    pub enrollment_date: Option<NaiveDate>,
    pub is_active: bool,
    /// Direct link to the identity that owns this record, if any.
    pub identity_id: Option<Uuid>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields required to insert a student.
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub program: Option<String>,
    pub department: Option<String>,
    pub faculty: Option<String>,
    pub enrollment_date: Option<NaiveDate>,
    pub is_active: bool,
    pub identity_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub id: Uuid,
    /// Unique course code, e.g. `CS101`.
    pub code: String,
    pub name: String,
    /// Credit weight, always positive.
    pub credits: u16,
    pub description: String,
    pub semester: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub code: String,
    pub name: String,
    pub credits: u16,
    pub description: String,
    pub semester: String,
    pub is_active: bool,
}

/// A single grade entry, unique per (student, course, semester).
#[derive(Debug, Clone, PartialEq)]
pub struct CourseResult {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub grade: Grade,
    pub semester: String,
    pub remarks: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResult {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub grade: Grade,
    pub semester: String,
    pub remarks: String,
}

/// A result joined with the course it was recorded against.
///
/// This is what the aggregators consume, since GPA needs the course credit weight.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDetail {
    pub result: CourseResult,
    pub course: Course,
}

impl ResultDetail {
    pub fn grade(&self) -> Grade {
        self.result.grade
    }

    pub fn credits(&self) -> u16 {
        self.course.credits
    }

    pub fn semester(&self) -> &str {
        &self.result.semester
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lecturer {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub staff_id: String,
    pub department: String,
    pub is_admin_assistant: bool,
    /// Courses taught by this lecturer.
    pub course_ids: Vec<Uuid>,
}

impl Lecturer {
    pub fn teaches(&self, course_id: Uuid) -> bool {
        self.course_ids.contains(&course_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewLecturer {
    pub identity_id: Uuid,
    pub staff_id: String,
    pub department: String,
    pub is_admin_assistant: bool,
    pub course_ids: Vec<Uuid>,
}

// Represents an authenticated account - used throughout app
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// False until the account has been activated through the emailed link.
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Identity {
    /// Staff and superusers may act on any student's records.
    pub fn has_staff_override(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct IdentityCredentials {
    pub identity_id: Uuid,
    pub username: String,
    pub hashed_password: String,
    pub is_active: bool,
}
