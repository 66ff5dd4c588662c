//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RecordsRepository` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Integrity rules (uniqueness, cascades, course protection) live in the schema
//! under `migrations/`; this adapter translates constraint failures into `PortError`s.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use records_core::dashboard::RecordSet;
use records_core::domain::{
    Course, CourseResult, Identity, IdentityCredentials, Lecturer, NewCourse, NewIdentity,
    NewLecturer, NewResult, NewStudent, ResultDetail, Student,
};
use records_core::grading::Grade;
use records_core::ports::{PortError, PortResult, RecordsRepository};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RecordsRepository` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// Error Translation
//=========================================================================================

/// Maps a named unique constraint to the API field it protects.
fn conflict_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("identities_username_key") => "username",
        Some("students_student_number_key") => "student_id",
        Some("students_identity_id_key") | Some("lecturers_identity_id_key") => "identity_id",
        Some("courses_code_key") => "code",
        Some("lecturers_staff_id_key") => "staff_id",
        Some("results_student_course_semester_key") => "student_id, course_id, semester",
        _ => "unique field",
    }
}

fn map_write_error(e: sqlx::Error) -> PortError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return PortError::Conflict(conflict_field(db.constraint()).to_string());
        }
        if db.is_foreign_key_violation() {
            return PortError::NotFound(format!(
                "Referenced record not found ({})",
                db.constraint().unwrap_or("foreign key")
            ));
        }
        if db.is_check_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("credits") => "credits",
                Some(c) if c.contains("grade") => "grade",
                _ => "value",
            };
            return PortError::Invalid {
                field: field.to_string(),
                message: db.message().to_string(),
            };
        }
    }
    PortError::Unexpected(e.to_string())
}

fn map_read_error(e: sqlx::Error, what: &str, key: impl std::fmt::Display) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, key)),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn credits_to_db(credits: u16) -> PortResult<i16> {
    i16::try_from(credits).map_err(|_| PortError::Invalid {
        field: "credits".to_string(),
        message: format!("{} is out of range", credits),
    })
}

/// `%term%` for ILIKE, with the pattern metacharacters escaped.
fn like_pattern(search: Option<&str>) -> Option<String> {
    search.map(|s| {
        let escaped = s
            .trim()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{}%", escaped)
    })
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct IdentityRecord {
    id: Uuid,
    username: String,
    email: Option<String>,
    first_name: String,
    last_name: String,
    is_active: bool,
    is_staff: bool,
    is_superuser: bool,
}
impl IdentityRecord {
    fn to_domain(self) -> Identity {
        Identity {
            id: self.id,
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            is_active: self.is_active,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    username: String,
    hashed_password: String,
    is_active: bool,
}

#[derive(FromRow)]
struct StudentRecord {
    id: Uuid,
    student_number: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    program: Option<String>,
    department: Option<String>,
    faculty: Option<String>,
    enrollment_date: Option<NaiveDate>,
    is_active: bool,
    identity_id: Option<Uuid>,
}
impl StudentRecord {
    fn to_domain(self) -> Student {
        Student {
            id: self.id,
            student_number: self.student_number,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            program: self.program,
            department: self.department,
            faculty: self.faculty,
            enrollment_date: self.enrollment_date,
            is_active: self.is_active,
            identity_id: self.identity_id,
        }
    }
}

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    code: String,
    name: String,
    credits: i16,
    description: String,
    semester: String,
    is_active: bool,
}
impl CourseRecord {
    fn to_domain(self) -> PortResult<Course> {
        Ok(Course {
            id: self.id,
            credits: u16::try_from(self.credits)
                .map_err(|_| PortError::Unexpected(format!("Course {} has negative credits", self.code)))?,
            code: self.code,
            name: self.name,
            description: self.description,
            semester: self.semester,
            is_active: self.is_active,
        })
    }
}

#[derive(FromRow)]
struct LecturerRecord {
    id: Uuid,
    identity_id: Uuid,
    staff_id: String,
    department: String,
    is_admin_assistant: bool,
    course_ids: Vec<Uuid>,
}
impl LecturerRecord {
    fn to_domain(self) -> Lecturer {
        Lecturer {
            id: self.id,
            identity_id: self.identity_id,
            staff_id: self.staff_id,
            department: self.department,
            is_admin_assistant: self.is_admin_assistant,
            course_ids: self.course_ids,
        }
    }
}

#[derive(FromRow)]
struct ResultRecord {
    id: Uuid,
    student_id: Uuid,
    course_id: Uuid,
    grade: String,
    semester: String,
    remarks: String,
    recorded_at: DateTime<Utc>,
    course_code: String,
    course_name: String,
    course_credits: i16,
    course_description: String,
    course_semester: String,
    course_is_active: bool,
}
impl ResultRecord {
    fn to_domain(self) -> PortResult<ResultDetail> {
        let grade = self
            .grade
            .parse::<Grade>()
            .map_err(|e| PortError::Unexpected(format!("Result {}: {}", self.id, e)))?;
        let course = CourseRecord {
            id: self.course_id,
            code: self.course_code,
            name: self.course_name,
            credits: self.course_credits,
            description: self.course_description,
            semester: self.course_semester,
            is_active: self.course_is_active,
        }
        .to_domain()?;
        Ok(ResultDetail {
            result: CourseResult {
                id: self.id,
                student_id: self.student_id,
                course_id: self.course_id,
                grade,
                semester: self.semester,
                remarks: self.remarks,
                recorded_at: self.recorded_at,
            },
            course,
        })
    }
}

fn results_to_domain(records: Vec<ResultRecord>) -> PortResult<Vec<ResultDetail>> {
    records.into_iter().map(ResultRecord::to_domain).collect()
}

fn courses_to_domain(records: Vec<CourseRecord>) -> PortResult<Vec<Course>> {
    records.into_iter().map(CourseRecord::to_domain).collect()
}

//=========================================================================================
// Shared SQL
//=========================================================================================

const IDENTITY_COLUMNS: &str =
    "id, username, email, first_name, last_name, is_active, is_staff, is_superuser";

const STUDENT_COLUMNS: &str = "id, student_number, first_name, last_name, email, program, \
     department, faculty, enrollment_date, is_active, identity_id";

const COURSE_COLUMNS: &str = "id, code, name, credits, description, semester, is_active";

const RESULT_SELECT: &str = "SELECT r.id, r.student_id, r.course_id, r.grade, r.semester, \
     r.remarks, r.recorded_at, c.code AS course_code, c.name AS course_name, \
     c.credits AS course_credits, c.description AS course_description, \
     c.semester AS course_semester, c.is_active AS course_is_active \
     FROM results r JOIN courses c ON c.id = r.course_id";

const LECTURER_SELECT: &str = "SELECT l.id, l.identity_id, l.staff_id, l.department, \
     l.is_admin_assistant, COALESCE(array_agg(lc.course_id ORDER BY lc.course_id) \
     FILTER (WHERE lc.course_id IS NOT NULL), '{}') AS course_ids \
     FROM lecturers l \
     LEFT JOIN lecturer_courses lc ON lc.lecturer_id = l.id \
     LEFT JOIN identities i ON i.id = l.identity_id";

const STUDENT_ORDER: &str = "ORDER BY student_number, last_name, first_name";

//=========================================================================================
// `RecordsRepository` Trait Implementation
//=========================================================================================

impl DbAdapter {
    async fn replace_lecturer_courses(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        lecturer_id: Uuid,
        course_ids: &[Uuid],
    ) -> PortResult<()> {
        sqlx::query("DELETE FROM lecturer_courses WHERE lecturer_id = $1")
            .bind(lecturer_id)
            .execute(&mut **tx)
            .await
            .map_err(unexpected)?;
        sqlx::query(
            "INSERT INTO lecturer_courses (lecturer_id, course_id) \
             SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(lecturer_id)
        .bind(course_ids.to_vec())
        .execute(&mut **tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }
}

#[async_trait]
impl RecordsRepository for DbAdapter {
    // --- Identities ---

    async fn create_identity(&self, new: NewIdentity) -> PortResult<Identity> {
        let sql = format!(
            "INSERT INTO identities (id, username, email, first_name, last_name, hashed_password, \
             is_active, is_staff, is_superuser) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {IDENTITY_COLUMNS}"
        );
        let record = sqlx::query_as::<_, IdentityRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.hashed_password)
            .bind(new.is_active)
            .bind(new.is_staff)
            .bind(new.is_superuser)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(record.to_domain())
    }

    async fn get_identity(&self, identity_id: Uuid) -> PortResult<Identity> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1");
        let record = sqlx::query_as::<_, IdentityRecord>(&sql)
            .bind(identity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Identity", identity_id))?;
        Ok(record.to_domain())
    }

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<IdentityCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, username, hashed_password, is_active FROM identities WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_read_error(e, "Identity", username))?;
        Ok(IdentityCredentials {
            identity_id: record.id,
            username: record.username,
            hashed_password: record.hashed_password,
            is_active: record.is_active,
        })
    }

    async fn find_identities_by_email(&self, email: &str) -> PortResult<Vec<Identity>> {
        let sql = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE lower(trim(email)) = lower(trim($1)) \
             ORDER BY created_at"
        );
        let records = sqlx::query_as::<_, IdentityRecord>(&sql)
            .bind(email)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_identities(&self) -> PortResult<Vec<Identity>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY created_at");
        let records = sqlx::query_as::<_, IdentityRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn activate_identity(&self, identity_id: Uuid) -> PortResult<()> {
        let done = sqlx::query("UPDATE identities SET is_active = TRUE WHERE id = $1")
            .bind(identity_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if done.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Identity {} not found", identity_id)));
        }
        Ok(())
    }

    async fn update_identity(&self, identity: &Identity) -> PortResult<Identity> {
        let sql = format!(
            "UPDATE identities SET username = $2, email = $3, first_name = $4, last_name = $5, \
             is_active = $6, is_staff = $7, is_superuser = $8 WHERE id = $1 \
             RETURNING {IDENTITY_COLUMNS}"
        );
        let record = sqlx::query_as::<_, IdentityRecord>(&sql)
            .bind(identity.id)
            .bind(&identity.username)
            .bind(&identity.email)
            .bind(&identity.first_name)
            .bind(&identity.last_name)
            .bind(identity.is_active)
            .bind(identity.is_staff)
            .bind(identity.is_superuser)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Identity {} not found", identity.id))
                }
                other => map_write_error(other),
            })?;
        Ok(record.to_domain())
    }

    async fn delete_identity(&self, identity_id: Uuid) -> PortResult<()> {
        // Sessions, tokens and the lecturer row cascade; the student link is set to NULL.
        let done = sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(identity_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if done.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Identity {} not found", identity_id)));
        }
        Ok(())
    }

    // --- Auth Sessions ---

    async fn create_auth_session(
        &self,
        session_id: &str,
        identity_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, identity_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(identity_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT identity_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Activation Tokens ---

    async fn create_activation_token(
        &self,
        token: &str,
        identity_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO activation_tokens (token, identity_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(token)
        .bind(identity_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn consume_activation_token(&self, token: &str) -> PortResult<Uuid> {
        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            "DELETE FROM activation_tokens WHERE token = $1 RETURNING identity_id, expires_at",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        match row {
            Some((identity_id, expires_at)) if expires_at > Utc::now() => Ok(identity_id),
            _ => Err(PortError::NotFound("Activation token not found or expired".to_string())),
        }
    }

    // --- Students ---

    async fn list_students(&self, search: Option<&str>) -> PortResult<Vec<Student>> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE $1::text IS NULL \
             OR student_number ILIKE $1 OR first_name ILIKE $1 OR last_name ILIKE $1 \
             OR email ILIKE $1 {STUDENT_ORDER}"
        );
        let records = sqlx::query_as::<_, StudentRecord>(&sql)
            .bind(like_pattern(search))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_student(&self, student_id: Uuid) -> PortResult<Student> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1");
        let record = sqlx::query_as::<_, StudentRecord>(&sql)
            .bind(student_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Student", student_id))?;
        Ok(record.to_domain())
    }

    async fn get_student_by_number(&self, student_number: &str) -> PortResult<Option<Student>> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE student_number = $1");
        let record = sqlx::query_as::<_, StudentRecord>(&sql)
            .bind(student_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn create_student(&self, new: NewStudent) -> PortResult<Student> {
        let sql = format!(
            "INSERT INTO students ({STUDENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {STUDENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, StudentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.student_number)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.email)
            .bind(&new.program)
            .bind(&new.department)
            .bind(&new.faculty)
            .bind(new.enrollment_date)
            .bind(new.is_active)
            .bind(new.identity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(record.to_domain())
    }

    async fn update_student(&self, student: &Student) -> PortResult<Student> {
        let sql = format!(
            "UPDATE students SET student_number = $2, first_name = $3, last_name = $4, \
             email = $5, program = $6, department = $7, faculty = $8, enrollment_date = $9, \
             is_active = $10, identity_id = $11 WHERE id = $1 RETURNING {STUDENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, StudentRecord>(&sql)
            .bind(student.id)
            .bind(&student.student_number)
            .bind(&student.first_name)
            .bind(&student.last_name)
            .bind(&student.email)
            .bind(&student.program)
            .bind(&student.department)
            .bind(&student.faculty)
            .bind(student.enrollment_date)
            .bind(student.is_active)
            .bind(student.identity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Student {} not found", student.id))
                }
                other => map_write_error(other),
            })?;
        Ok(record.to_domain())
    }

    async fn delete_student(&self, student_id: Uuid) -> PortResult<()> {
        let done = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(student_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if done.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Student {} not found", student_id)));
        }
        Ok(())
    }

    async fn find_student_by_identity(&self, identity_id: Uuid) -> PortResult<Option<Student>> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE identity_id = $1");
        let record = sqlx::query_as::<_, StudentRecord>(&sql)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn find_students_by_email(&self, email: &str) -> PortResult<Vec<Student>> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students \
             WHERE lower(trim(email)) = lower(trim($1)) {STUDENT_ORDER}"
        );
        let records = sqlx::query_as::<_, StudentRecord>(&sql)
            .bind(email)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn link_student_identity(&self, student_id: Uuid, identity_id: Uuid) -> PortResult<()> {
        let done = sqlx::query("UPDATE students SET identity_id = $2 WHERE id = $1")
            .bind(student_id)
            .bind(identity_id)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        if done.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Student {} not found", student_id)));
        }
        Ok(())
    }

    async fn fetch_all_active_students(&self) -> PortResult<Vec<Student>> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE is_active {STUDENT_ORDER}");
        let records = sqlx::query_as::<_, StudentRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Courses ---

    async fn list_courses(&self, search: Option<&str>) -> PortResult<Vec<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses \
             WHERE $1::text IS NULL OR code ILIKE $1 OR name ILIKE $1 ORDER BY code"
        );
        let records = sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(like_pattern(search))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        courses_to_domain(records)
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1");
        sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(course_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Course", course_id))?
            .to_domain()
    }

    async fn create_course(&self, new: NewCourse) -> PortResult<Course> {
        let sql = format!(
            "INSERT INTO courses ({COURSE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COURSE_COLUMNS}"
        );
        sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.code)
            .bind(&new.name)
            .bind(credits_to_db(new.credits)?)
            .bind(&new.description)
            .bind(&new.semester)
            .bind(new.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?
            .to_domain()
    }

    async fn update_course(&self, course: &Course) -> PortResult<Course> {
        let sql = format!(
            "UPDATE courses SET code = $2, name = $3, credits = $4, description = $5, \
             semester = $6, is_active = $7 WHERE id = $1 RETURNING {COURSE_COLUMNS}"
        );
        sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(course.id)
            .bind(&course.code)
            .bind(&course.name)
            .bind(credits_to_db(course.credits)?)
            .bind(&course.description)
            .bind(&course.semester)
            .bind(course.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Course {} not found", course.id))
                }
                other => map_write_error(other),
            })?
            .to_domain()
    }

    async fn delete_course(&self, course_id: Uuid) -> PortResult<()> {
        let course = self.get_course(course_id).await?;
        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(course_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_foreign_key_violation() => {
                    PortError::Protected(format!("course {}", course.code))
                }
                _ => unexpected(e),
            })?;
        Ok(())
    }

    // --- Lecturers ---

    async fn list_lecturers(&self, search: Option<&str>) -> PortResult<Vec<Lecturer>> {
        let sql = format!(
            "{LECTURER_SELECT} WHERE $1::text IS NULL OR l.staff_id ILIKE $1 \
             OR i.first_name ILIKE $1 OR i.last_name ILIKE $1 \
             GROUP BY l.id ORDER BY l.staff_id"
        );
        let records = sqlx::query_as::<_, LecturerRecord>(&sql)
            .bind(like_pattern(search))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_lecturer(&self, lecturer_id: Uuid) -> PortResult<Lecturer> {
        let sql = format!("{LECTURER_SELECT} WHERE l.id = $1 GROUP BY l.id");
        let record = sqlx::query_as::<_, LecturerRecord>(&sql)
            .bind(lecturer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Lecturer", lecturer_id))?;
        Ok(record.to_domain())
    }

    async fn create_lecturer(&self, new: NewLecturer) -> PortResult<Lecturer> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let lecturer_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO lecturers (id, identity_id, staff_id, department, is_admin_assistant) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(lecturer_id)
        .bind(new.identity_id)
        .bind(&new.staff_id)
        .bind(&new.department)
        .bind(new.is_admin_assistant)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;
        Self::replace_lecturer_courses(&mut tx, lecturer_id, &new.course_ids).await?;
        tx.commit().await.map_err(unexpected)?;
        self.get_lecturer(lecturer_id).await
    }

    async fn update_lecturer(&self, lecturer: &Lecturer) -> PortResult<Lecturer> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let done = sqlx::query(
            "UPDATE lecturers SET identity_id = $2, staff_id = $3, department = $4, \
             is_admin_assistant = $5 WHERE id = $1",
        )
        .bind(lecturer.id)
        .bind(lecturer.identity_id)
        .bind(&lecturer.staff_id)
        .bind(&lecturer.department)
        .bind(lecturer.is_admin_assistant)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;
        if done.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lecturer {} not found", lecturer.id)));
        }
        Self::replace_lecturer_courses(&mut tx, lecturer.id, &lecturer.course_ids).await?;
        tx.commit().await.map_err(unexpected)?;
        self.get_lecturer(lecturer.id).await
    }

    async fn delete_lecturer(&self, lecturer_id: Uuid) -> PortResult<()> {
        let done = sqlx::query("DELETE FROM lecturers WHERE id = $1")
            .bind(lecturer_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if done.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lecturer {} not found", lecturer_id)));
        }
        Ok(())
    }

    async fn find_lecturer_by_identity(&self, identity_id: Uuid) -> PortResult<Option<Lecturer>> {
        let sql = format!("{LECTURER_SELECT} WHERE l.identity_id = $1 GROUP BY l.id");
        let record = sqlx::query_as::<_, LecturerRecord>(&sql)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    // --- Results ---

    async fn list_results(&self, search: Option<&str>) -> PortResult<Vec<ResultDetail>> {
        let sql = format!(
            "{RESULT_SELECT} JOIN students s ON s.id = r.student_id \
             WHERE $1::text IS NULL OR s.student_number ILIKE $1 OR s.first_name ILIKE $1 \
             OR s.last_name ILIKE $1 OR c.code ILIKE $1 OR r.semester ILIKE $1 \
             OR r.grade = upper(trim($2)) \
             ORDER BY r.recorded_at DESC"
        );
        let records = sqlx::query_as::<_, ResultRecord>(&sql)
            .bind(like_pattern(search))
            .bind(search)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        results_to_domain(records)
    }

    async fn get_result(&self, result_id: Uuid) -> PortResult<ResultDetail> {
        let sql = format!("{RESULT_SELECT} WHERE r.id = $1");
        sqlx::query_as::<_, ResultRecord>(&sql)
            .bind(result_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Result", result_id))?
            .to_domain()
    }

    async fn create_result(&self, new: NewResult) -> PortResult<ResultDetail> {
        let result_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO results (id, student_id, course_id, grade, semester, remarks) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(result_id)
        .bind(new.student_id)
        .bind(new.course_id)
        .bind(new.grade.as_str())
        .bind(&new.semester)
        .bind(&new.remarks)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        self.get_result(result_id).await
    }

    async fn update_result(&self, result: &CourseResult) -> PortResult<ResultDetail> {
        let done = sqlx::query(
            "UPDATE results SET student_id = $2, course_id = $3, grade = $4, semester = $5, \
             remarks = $6 WHERE id = $1",
        )
        .bind(result.id)
        .bind(result.student_id)
        .bind(result.course_id)
        .bind(result.grade.as_str())
        .bind(&result.semester)
        .bind(&result.remarks)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        if done.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Result {} not found", result.id)));
        }
        self.get_result(result.id).await
    }

    async fn delete_result(&self, result_id: Uuid) -> PortResult<()> {
        let done = sqlx::query("DELETE FROM results WHERE id = $1")
            .bind(result_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if done.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Result {} not found", result_id)));
        }
        Ok(())
    }

    async fn fetch_results_for_student(&self, student_id: Uuid) -> PortResult<Vec<ResultDetail>> {
        let sql = format!("{RESULT_SELECT} WHERE r.student_id = $1 ORDER BY r.recorded_at DESC");
        let records = sqlx::query_as::<_, ResultRecord>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        results_to_domain(records)
    }

    async fn count_results_for_courses(&self, course_ids: &[Uuid]) -> PortResult<usize> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM results WHERE course_id = ANY($1)",
        )
        .bind(course_ids.to_vec())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count as usize)
    }

    async fn fetch_recent_results_for_courses(
        &self,
        course_ids: &[Uuid],
        limit: usize,
    ) -> PortResult<Vec<ResultDetail>> {
        let sql = format!(
            "{RESULT_SELECT} WHERE r.course_id = ANY($1) ORDER BY r.recorded_at DESC LIMIT $2"
        );
        let records = sqlx::query_as::<_, ResultRecord>(&sql)
            .bind(course_ids.to_vec())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        results_to_domain(records)
    }

    async fn fetch_record_set(&self) -> PortResult<RecordSet> {
        // One repeatable-read transaction so the counts and rankings agree.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let students_sql = format!("SELECT {STUDENT_COLUMNS} FROM students {STUDENT_ORDER}");
        let students = sqlx::query_as::<_, StudentRecord>(&students_sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(unexpected)?;

        let courses_sql = format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY code");
        let courses = sqlx::query_as::<_, CourseRecord>(&courses_sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(unexpected)?;

        let lecturers_sql = format!("{LECTURER_SELECT} GROUP BY l.id ORDER BY l.staff_id");
        let lecturers = sqlx::query_as::<_, LecturerRecord>(&lecturers_sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(unexpected)?;

        let results_sql = format!("{RESULT_SELECT} ORDER BY r.recorded_at DESC");
        let results = sqlx::query_as::<_, ResultRecord>(&results_sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;

        Ok(RecordSet {
            students: students.into_iter().map(|r| r.to_domain()).collect(),
            courses: courses_to_domain(courses)?,
            lecturers: lecturers.into_iter().map(|r| r.to_domain()).collect(),
            results: results_to_domain(results)?,
            result_count: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_names_map_to_api_fields() {
        assert_eq!(conflict_field(Some("courses_code_key")), "code");
        assert_eq!(conflict_field(Some("students_student_number_key")), "student_id");
        assert_eq!(
            conflict_field(Some("results_student_course_semester_key")),
            "student_id, course_id, semester"
        );
        assert_eq!(conflict_field(None), "unique field");
    }

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(like_pattern(Some(" 50%_off ")).as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(like_pattern(None), None);
    }
}
