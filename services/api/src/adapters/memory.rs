//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `RecordsRepository` port. It enforces the
//! same uniqueness, cascade and protection rules as the PostgreSQL schema, with
//! every write serialized behind a single `RwLock`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use records_core::dashboard::RecordSet;
use records_core::domain::{
    Course, CourseResult, Identity, IdentityCredentials, Lecturer, NewCourse, NewIdentity,
    NewLecturer, NewResult, NewStudent, ResultDetail, Student,
};
use records_core::ports::{PortError, PortResult, RecordsRepository};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Default)]
struct Store {
    identities: Vec<(Identity, String)>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    activation_tokens: HashMap<String, (Uuid, DateTime<Utc>)>,
    students: Vec<Student>,
    courses: Vec<Course>,
    lecturers: Vec<Lecturer>,
    results: Vec<CourseResult>,
}

/// A repository adapter that keeps every record in memory.
#[derive(Default)]
pub struct MemoryAdapter {
    store: RwLock<Store>,
}

impl MemoryAdapter {
    /// Creates a new, empty `MemoryAdapter`.
    pub fn new() -> Self {
        Self::default()
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn email_eq(stored: Option<&str>, email: &str) -> bool {
    stored.is_some_and(|s| s.trim().eq_ignore_ascii_case(email.trim()))
}

fn not_found(what: &str, id: Uuid) -> PortError {
    PortError::NotFound(format!("{} {} not found", what, id))
}

fn sort_students(students: &mut [Student]) {
    students.sort_by(|a, b| {
        (&a.student_number, &a.last_name, &a.first_name)
            .cmp(&(&b.student_number, &b.last_name, &b.first_name))
    });
}

impl Store {
    fn detail(&self, result: &CourseResult) -> PortResult<ResultDetail> {
        let course = self
            .courses
            .iter()
            .find(|c| c.id == result.course_id)
            .cloned()
            .ok_or_else(|| not_found("Course", result.course_id))?;
        Ok(ResultDetail {
            result: result.clone(),
            course,
        })
    }

    /// Results newest first, joined with their course.
    fn details<'a>(
        &self,
        results: impl Iterator<Item = &'a CourseResult>,
    ) -> PortResult<Vec<ResultDetail>> {
        let mut details = results
            .map(|r| self.detail(r))
            .collect::<PortResult<Vec<_>>>()?;
        details.sort_by(|a, b| b.result.recorded_at.cmp(&a.result.recorded_at));
        Ok(details)
    }

    fn identity_name(&self, identity_id: Uuid) -> String {
        self.identities
            .iter()
            .find(|(i, _)| i.id == identity_id)
            .map(|(i, _)| i.full_name())
            .unwrap_or_default()
    }

    fn check_student_unique(&self, student_number: &str, identity_id: Option<Uuid>, except: Option<Uuid>) -> PortResult<()> {
        let others = self.students.iter().filter(|s| Some(s.id) != except);
        for s in others {
            if s.student_number == student_number {
                return Err(PortError::Conflict("student_id".to_string()));
            }
            if identity_id.is_some() && s.identity_id == identity_id {
                return Err(PortError::Conflict("identity_id".to_string()));
            }
        }
        Ok(())
    }

    fn check_course_unique(&self, code: &str, credits: u16, except: Option<Uuid>) -> PortResult<()> {
        if credits == 0 {
            return Err(PortError::Invalid {
                field: "credits".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }
        if self
            .courses
            .iter()
            .any(|c| Some(c.id) != except && c.code == code)
        {
            return Err(PortError::Conflict("code".to_string()));
        }
        Ok(())
    }

    fn check_lecturer(&self, staff_id: &str, identity_id: Uuid, course_ids: &[Uuid], except: Option<Uuid>) -> PortResult<()> {
        if !self.identities.iter().any(|(i, _)| i.id == identity_id) {
            return Err(not_found("Identity", identity_id));
        }
        for l in self.lecturers.iter().filter(|l| Some(l.id) != except) {
            if l.staff_id == staff_id {
                return Err(PortError::Conflict("staff_id".to_string()));
            }
            if l.identity_id == identity_id {
                return Err(PortError::Conflict("identity_id".to_string()));
            }
        }
        if let Some(missing) = course_ids
            .iter()
            .find(|id| !self.courses.iter().any(|c| c.id == **id))
        {
            return Err(not_found("Course", *missing));
        }
        Ok(())
    }

    fn check_result(&self, student_id: Uuid, course_id: Uuid, semester: &str, except: Option<Uuid>) -> PortResult<()> {
        if !self.students.iter().any(|s| s.id == student_id) {
            return Err(not_found("Student", student_id));
        }
        if !self.courses.iter().any(|c| c.id == course_id) {
            return Err(not_found("Course", course_id));
        }
        let duplicate = self.results.iter().any(|r| {
            Some(r.id) != except
                && r.student_id == student_id
                && r.course_id == course_id
                && r.semester == semester
        });
        if duplicate {
            return Err(PortError::Conflict("student_id, course_id, semester".to_string()));
        }
        Ok(())
    }
}

//=========================================================================================
// `RecordsRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordsRepository for MemoryAdapter {
    // --- Identities ---

    async fn create_identity(&self, new: NewIdentity) -> PortResult<Identity> {
        let mut store = self.store.write().await;
        if store.identities.iter().any(|(i, _)| i.username == new.username) {
            return Err(PortError::Conflict("username".to_string()));
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            is_active: new.is_active,
            is_staff: new.is_staff,
            is_superuser: new.is_superuser,
        };
        store
            .identities
            .push((identity.clone(), new.hashed_password));
        Ok(identity)
    }

    async fn get_identity(&self, identity_id: Uuid) -> PortResult<Identity> {
        let store = self.store.read().await;
        store
            .identities
            .iter()
            .find(|(i, _)| i.id == identity_id)
            .map(|(i, _)| i.clone())
            .ok_or_else(|| not_found("Identity", identity_id))
    }

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<IdentityCredentials> {
        let store = self.store.read().await;
        store
            .identities
            .iter()
            .find(|(i, _)| i.username == username)
            .map(|(i, hash)| IdentityCredentials {
                identity_id: i.id,
                username: i.username.clone(),
                hashed_password: hash.clone(),
                is_active: i.is_active,
            })
            .ok_or_else(|| PortError::NotFound(format!("Identity {} not found", username)))
    }

    async fn find_identities_by_email(&self, email: &str) -> PortResult<Vec<Identity>> {
        let store = self.store.read().await;
        Ok(store
            .identities
            .iter()
            .filter(|(i, _)| email_eq(i.email.as_deref(), email))
            .map(|(i, _)| i.clone())
            .collect())
    }

    async fn list_identities(&self) -> PortResult<Vec<Identity>> {
        let store = self.store.read().await;
        Ok(store.identities.iter().map(|(i, _)| i.clone()).collect())
    }

    async fn activate_identity(&self, identity_id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        let (identity, _) = store
            .identities
            .iter_mut()
            .find(|(i, _)| i.id == identity_id)
            .ok_or_else(|| not_found("Identity", identity_id))?;
        identity.is_active = true;
        Ok(())
    }

    async fn update_identity(&self, identity: &Identity) -> PortResult<Identity> {
        let mut store = self.store.write().await;
        if store
            .identities
            .iter()
            .any(|(i, _)| i.id != identity.id && i.username == identity.username)
        {
            return Err(PortError::Conflict("username".to_string()));
        }
        let (stored, _) = store
            .identities
            .iter_mut()
            .find(|(i, _)| i.id == identity.id)
            .ok_or_else(|| not_found("Identity", identity.id))?;
        *stored = identity.clone();
        Ok(identity.clone())
    }

    async fn delete_identity(&self, identity_id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        let before = store.identities.len();
        store.identities.retain(|(i, _)| i.id != identity_id);
        if store.identities.len() == before {
            return Err(not_found("Identity", identity_id));
        }
        store.lecturers.retain(|l| l.identity_id != identity_id);
        store.sessions.retain(|_, (owner, _)| *owner != identity_id);
        store.activation_tokens.retain(|_, (owner, _)| *owner != identity_id);
        for s in store
            .students
            .iter_mut()
            .filter(|s| s.identity_id == Some(identity_id))
        {
            s.identity_id = None;
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
        let mut store = self.store.write().await;
        let now = Utc::now();
        store.sessions.retain(|_, (_, expires)| *expires > now);
        store
            .sessions
            .insert(session_id.to_string(), (identity_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let now = Utc::now();
        {
            let store = self.store.read().await;
            match store.sessions.get(session_id) {
                Some((identity_id, expires_at)) if *expires_at > now => return Ok(*identity_id),
                None => return Err(PortError::Unauthorized),
                Some(_) => {}
            }
        }
        // Expired: drop it along with any other stale sessions.
        let mut store = self.store.write().await;
        store.sessions.retain(|_, (_, expires)| *expires > now);
        Err(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut store = self.store.write().await;
        store.sessions.remove(session_id);
        Ok(())
    }

    // --- Activation Tokens ---

    async fn create_activation_token(
        &self,
        token: &str,
        identity_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        store.activation_tokens.retain(|_, (_, expires)| *expires > now);
        store
            .activation_tokens
            .insert(token.to_string(), (identity_id, expires_at));
        Ok(())
    }

    async fn consume_activation_token(&self, token: &str) -> PortResult<Uuid> {
        let mut store = self.store.write().await;
        match store.activation_tokens.remove(token) {
            Some((identity_id, expires_at)) if expires_at > Utc::now() => Ok(identity_id),
            _ => Err(PortError::NotFound("Activation token not found or expired".to_string())),
        }
    }

    // --- Students ---

    async fn list_students(&self, search: Option<&str>) -> PortResult<Vec<Student>> {
        let store = self.store.read().await;
        let mut students: Vec<Student> = store
            .students
            .iter()
            .filter(|s| {
                search.map_or(true, |q| {
                    contains_ci(&s.student_number, q)
                        || contains_ci(&s.first_name, q)
                        || contains_ci(&s.last_name, q)
                        || s.email.as_deref().is_some_and(|e| contains_ci(e, q))
                })
            })
            .cloned()
            .collect();
        sort_students(&mut students);
        Ok(students)
    }

    async fn get_student(&self, student_id: Uuid) -> PortResult<Student> {
        let store = self.store.read().await;
        store
            .students
            .iter()
            .find(|s| s.id == student_id)
            .cloned()
            .ok_or_else(|| not_found("Student", student_id))
    }

    async fn get_student_by_number(&self, student_number: &str) -> PortResult<Option<Student>> {
        let store = self.store.read().await;
        Ok(store
            .students
            .iter()
            .find(|s| s.student_number == student_number)
            .cloned())
    }

    async fn create_student(&self, new: NewStudent) -> PortResult<Student> {
        let mut store = self.store.write().await;
        store.check_student_unique(&new.student_number, new.identity_id, None)?;
        let student = Student {
            id: Uuid::new_v4(),
            student_number: new.student_number,
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            program: new.program,
            department: new.department,
            faculty: new.faculty,
            enrollment_date: new.enrollment_date,
            is_active: new.is_active,
            identity_id: new.identity_id,
        };
        store.students.push(student.clone());
        Ok(student)
    }

    async fn update_student(&self, student: &Student) -> PortResult<Student> {
        let mut store = self.store.write().await;
        store.check_student_unique(&student.student_number, student.identity_id, Some(student.id))?;
        let stored = store
            .students
            .iter_mut()
            .find(|s| s.id == student.id)
            .ok_or_else(|| not_found("Student", student.id))?;
        *stored = student.clone();
        Ok(student.clone())
    }

    async fn delete_student(&self, student_id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        let before = store.students.len();
        store.students.retain(|s| s.id != student_id);
        if store.students.len() == before {
            return Err(not_found("Student", student_id));
        }
        store.results.retain(|r| r.student_id != student_id);
        Ok(())
    }

    async fn find_student_by_identity(&self, identity_id: Uuid) -> PortResult<Option<Student>> {
        let store = self.store.read().await;
        Ok(store
            .students
            .iter()
            .find(|s| s.identity_id == Some(identity_id))
            .cloned())
    }

    async fn find_students_by_email(&self, email: &str) -> PortResult<Vec<Student>> {
        let store = self.store.read().await;
        let mut students: Vec<Student> = store
            .students
            .iter()
            .filter(|s| email_eq(s.email.as_deref(), email))
            .cloned()
            .collect();
        sort_students(&mut students);
        Ok(students)
    }

    async fn link_student_identity(&self, student_id: Uuid, identity_id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        if !store.identities.iter().any(|(i, _)| i.id == identity_id) {
            return Err(not_found("Identity", identity_id));
        }
        if store
            .students
            .iter()
            .any(|s| s.id != student_id && s.identity_id == Some(identity_id))
        {
            return Err(PortError::Conflict("identity_id".to_string()));
        }
        let student = store
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| not_found("Student", student_id))?;
        student.identity_id = Some(identity_id);
        Ok(())
    }

    async fn fetch_all_active_students(&self) -> PortResult<Vec<Student>> {
        let store = self.store.read().await;
        let mut students: Vec<Student> = store.students.iter().filter(|s| s.is_active).cloned().collect();
        sort_students(&mut students);
        Ok(students)
    }

    // --- Courses ---

    async fn list_courses(&self, search: Option<&str>) -> PortResult<Vec<Course>> {
        let store = self.store.read().await;
        let mut courses: Vec<Course> = store
            .courses
            .iter()
            .filter(|c| search.map_or(true, |q| contains_ci(&c.code, q) || contains_ci(&c.name, q)))
            .cloned()
            .collect();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(courses)
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        let store = self.store.read().await;
        store
            .courses
            .iter()
            .find(|c| c.id == course_id)
            .cloned()
            .ok_or_else(|| not_found("Course", course_id))
    }

    async fn create_course(&self, new: NewCourse) -> PortResult<Course> {
        let mut store = self.store.write().await;
        store.check_course_unique(&new.code, new.credits, None)?;
        let course = Course {
            id: Uuid::new_v4(),
            code: new.code,
            name: new.name,
            credits: new.credits,
            description: new.description,
            semester: new.semester,
            is_active: new.is_active,
        };
        store.courses.push(course.clone());
        Ok(course)
    }

    async fn update_course(&self, course: &Course) -> PortResult<Course> {
        let mut store = self.store.write().await;
        store.check_course_unique(&course.code, course.credits, Some(course.id))?;
        let stored = store
            .courses
            .iter_mut()
            .find(|c| c.id == course.id)
            .ok_or_else(|| not_found("Course", course.id))?;
        *stored = course.clone();
        Ok(course.clone())
    }

    async fn delete_course(&self, course_id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        let course = store
            .courses
            .iter()
            .find(|c| c.id == course_id)
            .cloned()
            .ok_or_else(|| not_found("Course", course_id))?;
        if store.results.iter().any(|r| r.course_id == course_id) {
            return Err(PortError::Protected(format!("course {}", course.code)));
        }
        store.courses.retain(|c| c.id != course_id);
        for l in store.lecturers.iter_mut() {
            l.course_ids.retain(|id| *id != course_id);
        }
        Ok(())
    }

    // --- Lecturers ---

    async fn list_lecturers(&self, search: Option<&str>) -> PortResult<Vec<Lecturer>> {
        let store = self.store.read().await;
        let mut lecturers: Vec<Lecturer> = store
            .lecturers
            .iter()
            .filter(|l| {
                search.map_or(true, |q| {
                    contains_ci(&l.staff_id, q) || contains_ci(&store.identity_name(l.identity_id), q)
                })
            })
            .cloned()
            .collect();
        lecturers.sort_by(|a, b| a.staff_id.cmp(&b.staff_id));
        Ok(lecturers)
    }

    async fn get_lecturer(&self, lecturer_id: Uuid) -> PortResult<Lecturer> {
        let store = self.store.read().await;
        store
            .lecturers
            .iter()
            .find(|l| l.id == lecturer_id)
            .cloned()
            .ok_or_else(|| not_found("Lecturer", lecturer_id))
    }

    async fn create_lecturer(&self, new: NewLecturer) -> PortResult<Lecturer> {
        let mut store = self.store.write().await;
        store.check_lecturer(&new.staff_id, new.identity_id, &new.course_ids, None)?;
        let mut course_ids = new.course_ids;
        course_ids.sort();
        course_ids.dedup();
        let lecturer = Lecturer {
            id: Uuid::new_v4(),
            identity_id: new.identity_id,
            staff_id: new.staff_id,
            department: new.department,
            is_admin_assistant: new.is_admin_assistant,
            course_ids,
        };
        store.lecturers.push(lecturer.clone());
        Ok(lecturer)
    }

    async fn update_lecturer(&self, lecturer: &Lecturer) -> PortResult<Lecturer> {
        let mut store = self.store.write().await;
        store.check_lecturer(
            &lecturer.staff_id,
            lecturer.identity_id,
            &lecturer.course_ids,
            Some(lecturer.id),
        )?;
        let stored = store
            .lecturers
            .iter_mut()
            .find(|l| l.id == lecturer.id)
            .ok_or_else(|| not_found("Lecturer", lecturer.id))?;
        *stored = lecturer.clone();
        Ok(lecturer.clone())
    }

    async fn delete_lecturer(&self, lecturer_id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        let before = store.lecturers.len();
        store.lecturers.retain(|l| l.id != lecturer_id);
        if store.lecturers.len() == before {
            return Err(not_found("Lecturer", lecturer_id));
        }
        Ok(())
    }

    async fn find_lecturer_by_identity(&self, identity_id: Uuid) -> PortResult<Option<Lecturer>> {
        let store = self.store.read().await;
        Ok(store
            .lecturers
            .iter()
            .find(|l| l.identity_id == identity_id)
            .cloned())
    }

    // --- Results ---

    async fn list_results(&self, search: Option<&str>) -> PortResult<Vec<ResultDetail>> {
        let store = self.store.read().await;
        let matching = store.results.iter().filter(|r| {
            let Some(q) = search else { return true };
            let student = store.students.iter().find(|s| s.id == r.student_id);
            let course = store.courses.iter().find(|c| c.id == r.course_id);
            student.is_some_and(|s| {
                contains_ci(&s.student_number, q)
                    || contains_ci(&s.first_name, q)
                    || contains_ci(&s.last_name, q)
            }) || course.is_some_and(|c| contains_ci(&c.code, q))
                || r.grade.as_str().eq_ignore_ascii_case(q.trim())
                || contains_ci(&r.semester, q)
        });
        store.details(matching)
    }

    async fn get_result(&self, result_id: Uuid) -> PortResult<ResultDetail> {
        let store = self.store.read().await;
        let result = store
            .results
            .iter()
            .find(|r| r.id == result_id)
            .ok_or_else(|| not_found("Result", result_id))?;
        store.detail(result)
    }

    async fn create_result(&self, new: NewResult) -> PortResult<ResultDetail> {
        let mut store = self.store.write().await;
        store.check_result(new.student_id, new.course_id, &new.semester, None)?;
        let result = CourseResult {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            course_id: new.course_id,
            grade: new.grade,
            semester: new.semester,
            remarks: new.remarks,
            recorded_at: Utc::now(),
        };
        store.results.push(result.clone());
        store.detail(&result)
    }

    async fn update_result(&self, result: &CourseResult) -> PortResult<ResultDetail> {
        let mut store = self.store.write().await;
        store.check_result(result.student_id, result.course_id, &result.semester, Some(result.id))?;
        let stored = store
            .results
            .iter_mut()
            .find(|r| r.id == result.id)
            .ok_or_else(|| not_found("Result", result.id))?;
        // The recorded timestamp is fixed at creation.
        let recorded_at = stored.recorded_at;
        *stored = CourseResult {
            recorded_at,
            ..result.clone()
        };
        let updated = stored.clone();
        store.detail(&updated)
    }

    async fn delete_result(&self, result_id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        let before = store.results.len();
        store.results.retain(|r| r.id != result_id);
        if store.results.len() == before {
            return Err(not_found("Result", result_id));
        }
        Ok(())
    }

    async fn fetch_results_for_student(&self, student_id: Uuid) -> PortResult<Vec<ResultDetail>> {
        let store = self.store.read().await;
        store.details(store.results.iter().filter(|r| r.student_id == student_id))
    }

    async fn count_results_for_courses(&self, course_ids: &[Uuid]) -> PortResult<usize> {
        let store = self.store.read().await;
        Ok(store
            .results
            .iter()
            .filter(|r| course_ids.contains(&r.course_id))
            .count())
    }

    async fn fetch_recent_results_for_courses(
        &self,
        course_ids: &[Uuid],
        limit: usize,
    ) -> PortResult<Vec<ResultDetail>> {
        let store = self.store.read().await;
        let mut details =
            store.details(store.results.iter().filter(|r| course_ids.contains(&r.course_id)))?;
        details.truncate(limit);
        Ok(details)
    }

    async fn fetch_record_set(&self) -> PortResult<RecordSet> {
        let store = self.store.read().await;
        let mut students = store.students.clone();
        sort_students(&mut students);
        let mut courses = store.courses.clone();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(RecordSet {
            students,
            courses,
            lecturers: store.lecturers.clone(),
            results: store.details(store.results.iter())?,
            result_count: None,
        })
    }
}
