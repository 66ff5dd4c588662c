//! services/api/src/web/export.rs
//!
//! CSV downloads. Every file starts with a UTF-8 byte order mark so spreadsheet
//! applications pick the right encoding.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Extension,
};
use records_core::domain::{Identity, ResultDetail, Student};
use records_core::grading::display_gpa;
use records_core::roles::authorize_self_access;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::access::{precheck_student_access, require_staff, resolve_caller_role};
use crate::web::state::AppState;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

//=========================================================================================
// CSV Encoding
//=========================================================================================

/// Writes one table of rows to `buf`. Tables written back to back share the
/// same terminator so a blank separator line can go between them.
fn write_table<I, R>(buf: &mut Vec<u8>, rows: I) -> Result<(), ApiError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(buf);
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn points(detail: &ResultDetail) -> String {
    format!("{:.1}", detail.grade().points())
}

/// The single-student download: a profile block, a blank line, then one row per result.
pub fn student_results_csv(student: &Student, results: &[ResultDetail]) -> Result<Vec<u8>, ApiError> {
    let mut buf = UTF8_BOM.to_vec();
    write_table(
        &mut buf,
        [
            vec![
                "Student ID".to_string(),
                "Full Name".to_string(),
                "Program".to_string(),
                "Department".to_string(),
                "Faculty".to_string(),
            ],
            vec![
                student.student_number.clone(),
                student.full_name(),
                student.program.clone().unwrap_or_default(),
                student.department.clone().unwrap_or_default(),
                student.faculty.clone().unwrap_or_default(),
            ],
        ],
    )?;
    buf.extend_from_slice(b"\r\n");

    let header = [
        "Course Code",
        "Course Name",
        "Grade",
        "Grade Points",
        "Semester",
        "Recorded At",
        "Remarks",
    ]
    .map(str::to_string)
    .to_vec();
    let rows = results.iter().map(|r| {
        vec![
            r.course.code.clone(),
            r.course.name.clone(),
            r.grade().to_string(),
            points(r),
            r.result.semester.clone(),
            r.result.recorded_at.to_rfc3339(),
            r.result.remarks.clone(),
        ]
    });
    write_table(&mut buf, std::iter::once(header).chain(rows))?;
    Ok(buf)
}

/// Every result, grouped by student number.
pub fn all_results_csv(students: &[Student], results: &[ResultDetail]) -> Result<Vec<u8>, ApiError> {
    let by_id: HashMap<Uuid, &Student> = students.iter().map(|s| (s.id, s)).collect();
    let mut rows: Vec<(&Student, &ResultDetail)> = results
        .iter()
        .filter_map(|r| by_id.get(&r.result.student_id).map(|s| (*s, r)))
        .collect();
    rows.sort_by(|a, b| a.0.student_number.cmp(&b.0.student_number));

    let header = [
        "Student ID",
        "Student Name",
        "Course Code",
        "Course Name",
        "Grade",
        "Grade Points",
        "Semester",
        "Recorded At",
    ]
    .map(str::to_string)
    .to_vec();
    let body = rows.into_iter().map(|(s, r)| {
        vec![
            s.student_number.clone(),
            s.full_name(),
            r.course.code.clone(),
            r.course.name.clone(),
            r.grade().to_string(),
            points(r),
            r.result.semester.clone(),
            r.result.recorded_at.to_rfc3339(),
        ]
    });

    let mut buf = UTF8_BOM.to_vec();
    write_table(&mut buf, std::iter::once(header).chain(body))?;
    Ok(buf)
}

/// The student roster with each student's GPA.
pub fn students_csv(students: &[Student], results: &[ResultDetail]) -> Result<Vec<u8>, ApiError> {
    let mut by_student: HashMap<Uuid, Vec<ResultDetail>> = HashMap::new();
    for r in results {
        by_student.entry(r.result.student_id).or_default().push(r.clone());
    }

    let header = [
        "Student ID",
        "First Name",
        "Last Name",
        "Email",
        "Program",
        "Department",
        "Faculty",
        "Enrollment Date",
        "Active",
        "GPA",
    ]
    .map(str::to_string)
    .to_vec();
    let body = students.iter().map(|s| {
        let own = by_student.get(&s.id).map(Vec::as_slice).unwrap_or_default();
        vec![
            s.student_number.clone(),
            s.first_name.clone(),
            s.last_name.clone(),
            s.email.clone().unwrap_or_default(),
            s.program.clone().unwrap_or_default(),
            s.department.clone().unwrap_or_default(),
            s.faculty.clone().unwrap_or_default(),
            s.enrollment_date.map(|d| d.to_string()).unwrap_or_default(),
            if s.is_active { "yes" } else { "no" }.to_string(),
            display_gpa(own),
        ]
    });

    let mut buf = UTF8_BOM.to_vec();
    write_table(&mut buf, std::iter::once(header).chain(body))?;
    Ok(buf)
}

fn attachment(filename: &str, body: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Download one student's results. Students may only download their own.
#[utoipa::path(
    get,
    path = "/students/{id}/download",
    params(("id" = Uuid, Path, description = "Student primary key")),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 403, description = "Not the caller's own record"),
        (status = 404, description = "No such student")
    )
)]
pub async fn download_student_results_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let role = resolve_caller_role(&state, &identity).await?;
    precheck_student_access(&identity, &role, id)?;
    let student = state.repo.get_student(id).await?;
    if !authorize_self_access(&identity, &role, &student) {
        return Err(ApiError::Forbidden);
    }
    let results = state.repo.fetch_results_for_student(student.id).await?;
    let body = student_results_csv(&student, &results)?;
    Ok(attachment(
        &format!("results_{}.csv", student.student_number),
        body,
    ))
}

#[utoipa::path(
    get,
    path = "/export/results",
    responses(
        (status = 200, description = "CSV of every result", content_type = "text/csv"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn export_results_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&identity)?;
    let records = state.repo.fetch_record_set().await?;
    let body = all_results_csv(&records.students, &records.results)?;
    info!(by = %identity.username, rows = records.results.len(), "Exported results");
    Ok(attachment("results_export.csv", body))
}

#[utoipa::path(
    get,
    path = "/export/students",
    responses(
        (status = 200, description = "CSV of every student with GPA", content_type = "text/csv"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn export_students_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&identity)?;
    let records = state.repo.fetch_record_set().await?;
    let body = students_csv(&records.students, &records.results)?;
    info!(by = %identity.username, rows = records.students.len(), "Exported students");
    Ok(attachment("students_export.csv", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use records_core::domain::{Course, CourseResult};
    use records_core::grading::Grade;

    fn student() -> Student {
        Student {
            id: Uuid::new_v4(),
            student_number: "S001".to_string(),
            first_name: "Zoë".to_string(),
            last_name: "Smith".to_string(),
            email: None,
            program: Some("Computing".to_string()),
            department: None,
            faculty: None,
            enrollment_date: None,
            is_active: true,
            identity_id: None,
        }
    }

    fn result(student_id: Uuid, grade: Grade) -> ResultDetail {
        let course_id = Uuid::new_v4();
        ResultDetail {
            result: CourseResult {
                id: Uuid::new_v4(),
                student_id,
                course_id,
                grade,
                semester: "2024-1".to_string(),
                remarks: "good, steady".to_string(),
                recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            },
            course: Course {
                id: course_id,
                code: "CS101".to_string(),
                name: "Intro".to_string(),
                credits: 3,
                description: String::new(),
                semester: "2024-1".to_string(),
                is_active: true,
            },
        }
    }

    #[test]
    fn student_download_has_bom_and_two_tables() {
        let s = student();
        let bytes = student_results_csv(&s, &[result(s.id, Grade::A)]).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines[0], "Student ID,Full Name,Program,Department,Faculty");
        assert_eq!(lines[1], "S001,Zoë Smith,Computing,,");
        assert_eq!(lines[2], "");
        assert!(lines[3].starts_with("Course Code,Course Name,Grade,Grade Points"));
        assert!(lines[4].starts_with("CS101,Intro,A,4.0,2024-1,"));
        assert!(lines[4].ends_with(",\"good, steady\""));
    }

    #[test]
    fn roster_shows_na_for_students_without_results() {
        let s = student();
        let bytes = students_csv(&[s], &[]).unwrap();
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with(",yes,N/A"));
    }
}
