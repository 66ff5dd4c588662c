//! crates/records_core/src/dashboard.rs
//!
//! Assembles the per-role dashboard snapshot from an already-fetched record set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Course, Lecturer, ResultDetail, Student};
use crate::grading::{compute_gpa, summarize_by_semester, Grade, SemesterSummary};
use crate::roles::Role;

/// Length of every "recent results" list.
pub const RECENT_LIMIT: usize = 5;
const TOP_LIMIT: usize = 5;

/// Everything the dashboards read, fetched once per request.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    /// In default student ordering; ranking ties keep this order.
    pub students: Vec<Student>,
    pub courses: Vec<Course>,
    pub lecturers: Vec<Lecturer>,
    pub results: Vec<ResultDetail>,
    /// Set when `results` is only the newest slice of a larger scoped total.
    pub result_count: Option<usize>,
}

/// A result flattened for display in a "recent activity" list.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentResult {
    pub result_id: Uuid,
    pub student_id: Uuid,
    pub student_number: String,
    pub student_name: String,
    pub course_code: String,
    pub course_name: String,
    pub grade: Grade,
    pub semester: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopPerformer {
    pub student: Student,
    pub gpa: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSnapshot {
    pub total_students: usize,
    pub total_courses: usize,
    pub total_lecturers: usize,
    pub total_results: usize,
    pub recent_results: Vec<RecentResult>,
    pub top_performers: Vec<TopPerformer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LecturerSnapshot {
    pub lecturer: Lecturer,
    pub total_students: usize,
    pub total_courses: usize,
    /// Results recorded against courses this lecturer teaches.
    pub total_results: usize,
    pub recent_results: Vec<RecentResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentSnapshot {
    pub student: Student,
    pub gpa: f64,
    pub total_results: usize,
    pub semester_summary: Vec<SemesterSummary>,
    pub recent_results: Vec<RecentResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardSnapshot {
    Global(GlobalSnapshot),
    Lecturer(LecturerSnapshot),
    Student(StudentSnapshot),
}

/// Builds the snapshot for `role`. `Unresolved` identities get the global view,
/// which is only appropriate for the landing page.
pub fn build_dashboard_snapshot(role: &Role, records: &RecordSet) -> DashboardSnapshot {
    match role {
        Role::Administrator | Role::Unresolved(_) => DashboardSnapshot::Global(global(records)),
        Role::Lecturer(lecturer) => DashboardSnapshot::Lecturer(for_lecturer(lecturer, records)),
        Role::Student(student) => DashboardSnapshot::Student(for_student(student, records)),
    }
}

fn active_students(records: &RecordSet) -> usize {
    records.students.iter().filter(|s| s.is_active).count()
}

fn active_courses(records: &RecordSet) -> usize {
    records.courses.iter().filter(|c| c.is_active).count()
}

fn global(records: &RecordSet) -> GlobalSnapshot {
    GlobalSnapshot {
        total_students: active_students(records),
        total_courses: active_courses(records),
        total_lecturers: records.lecturers.len(),
        total_results: records.results.len(),
        recent_results: recent(records, records.results.iter()),
        top_performers: top_performers(records),
    }
}

fn for_lecturer(lecturer: &Lecturer, records: &RecordSet) -> LecturerSnapshot {
    let taught: Vec<&ResultDetail> = records
        .results
        .iter()
        .filter(|r| lecturer.teaches(r.course.id))
        .collect();

    LecturerSnapshot {
        lecturer: lecturer.clone(),
        total_students: active_students(records),
        total_courses: active_courses(records),
        total_results: records.result_count.unwrap_or(taught.len()),
        recent_results: recent(records, taught.into_iter()),
    }
}

fn for_student(student: &Student, records: &RecordSet) -> StudentSnapshot {
    let own: Vec<&ResultDetail> = records
        .results
        .iter()
        .filter(|r| r.result.student_id == student.id)
        .collect();

    StudentSnapshot {
        student: student.clone(),
        gpa: compute_gpa(own.iter().copied()),
        total_results: own.len(),
        semester_summary: summarize_by_semester(own.iter().copied()),
        recent_results: recent(records, own.into_iter()),
    }
}

/// The most recently recorded results, newest first.
fn recent<'a>(
    records: &RecordSet,
    results: impl Iterator<Item = &'a ResultDetail>,
) -> Vec<RecentResult> {
    let mut sorted: Vec<&ResultDetail> = results.collect();
    sorted.sort_by(|a, b| b.result.recorded_at.cmp(&a.result.recorded_at));

    let students: HashMap<Uuid, &Student> = records.students.iter().map(|s| (s.id, s)).collect();

    sorted
        .into_iter()
        .take(RECENT_LIMIT)
        .map(|r| {
            let student = students.get(&r.result.student_id);
            RecentResult {
                result_id: r.result.id,
                student_id: r.result.student_id,
                student_number: student.map(|s| s.student_number.clone()).unwrap_or_default(),
                student_name: student.map(|s| s.full_name()).unwrap_or_default(),
                course_code: r.course.code.clone(),
                course_name: r.course.name.clone(),
                grade: r.result.grade,
                semester: r.result.semester.clone(),
                recorded_at: r.result.recorded_at,
            }
        })
        .collect()
}

/// Active students ranked by GPA, highest first. The sort is stable so equal
/// GPAs keep the record set's student ordering.
fn top_performers(records: &RecordSet) -> Vec<TopPerformer> {
    let mut by_student: HashMap<Uuid, Vec<&ResultDetail>> = HashMap::new();
    for r in &records.results {
        by_student.entry(r.result.student_id).or_default().push(r);
    }

    let mut ranked: Vec<TopPerformer> = records
        .students
        .iter()
        .filter(|s| s.is_active)
        .map(|s| TopPerformer {
            student: s.clone(),
            gpa: by_student
                .get(&s.id)
                .map(|rs| compute_gpa(rs.iter().copied()))
                .unwrap_or(0.0),
        })
        .collect();

    ranked.sort_by(|a, b| b.gpa.total_cmp(&a.gpa));
    ranked.truncate(TOP_LIMIT);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::Grade;
    use crate::domain::CourseResult;
    use crate::roles::Unresolved;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        records: RecordSet,
        base: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                records: RecordSet::default(),
                base: Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
            }
        }

        fn student(&mut self, number: &str, active: bool) -> Student {
            let s = Student {
                id: Uuid::new_v4(),
                student_number: number.to_string(),
                first_name: "First".to_string(),
                last_name: number.to_string(),
                email: None,
                program: None,
                department: None,
                faculty: None,
                enrollment_date: None,
                is_active: active,
                identity_id: None,
            };
            self.records.students.push(s.clone());
            s
        }

        fn course(&mut self, code: &str, credits: u16, active: bool) -> Course {
            let c = Course {
                id: Uuid::new_v4(),
                code: code.to_string(),
                name: format!("{code} name"),
                credits,
                description: String::new(),
                semester: String::new(),
                is_active: active,
            };
            self.records.courses.push(c.clone());
            c
        }

        /// Records a result `minutes` after the fixture's base time.
        fn result(&mut self, student: &Student, course: &Course, grade: Grade, semester: &str, minutes: i64) {
            self.records.results.push(ResultDetail {
                result: CourseResult {
                    id: Uuid::new_v4(),
                    student_id: student.id,
                    course_id: course.id,
                    grade,
                    semester: semester.to_string(),
                    remarks: String::new(),
                    recorded_at: self.base + Duration::minutes(minutes),
                },
                course: course.clone(),
            });
        }
    }

    fn global_of(snapshot: DashboardSnapshot) -> GlobalSnapshot {
        match snapshot {
            DashboardSnapshot::Global(g) => g,
            other => panic!("expected global snapshot, got {other:?}"),
        }
    }

    #[test]
    fn global_view_counts_only_active_records() {
        let mut f = Fixture::new();
        let a = f.student("S001", true);
        f.student("S002", false);
        let cs = f.course("CS101", 3, true);
        f.course("OLD100", 3, false);
        f.result(&a, &cs, Grade::A, "2025-1", 0);

        let g = global_of(build_dashboard_snapshot(&Role::Administrator, &f.records));
        assert_eq!(g.total_students, 1);
        assert_eq!(g.total_courses, 1);
        assert_eq!(g.total_lecturers, 0);
        assert_eq!(g.total_results, 1);
    }

    #[test]
    fn recent_results_are_newest_first_and_capped() {
        let mut f = Fixture::new();
        let s = f.student("S001", true);
        let c = f.course("CS101", 3, true);
        for i in 0..7 {
            f.result(&s, &c, Grade::B, &format!("sem-{i}"), i);
        }

        let g = global_of(build_dashboard_snapshot(&Role::Administrator, &f.records));
        let semesters: Vec<&str> = g.recent_results.iter().map(|r| r.semester.as_str()).collect();
        assert_eq!(semesters, ["sem-6", "sem-5", "sem-4", "sem-3", "sem-2"]);
        assert_eq!(g.recent_results[0].student_number, "S001");
        assert_eq!(g.recent_results[0].course_code, "CS101");
    }

    #[test]
    fn top_performers_rank_by_gpa_with_stable_ties() {
        let mut f = Fixture::new();
        let c = f.course("CS101", 3, true);
        let names = ["S1", "S2", "S3", "S4", "S5", "S6", "S7"];
        let grades = [Grade::B, Grade::A, Grade::B, Grade::C, Grade::A, Grade::F, Grade::A];
        for (i, (name, grade)) in names.iter().zip(grades).enumerate() {
            let s = f.student(name, true);
            f.result(&s, &c, grade, "2025-1", i as i64);
        }
        let inactive = f.student("S8", false);
        f.result(&inactive, &c, Grade::APlus, "2025-1", 99);

        let g = global_of(build_dashboard_snapshot(&Role::Administrator, &f.records));
        let order: Vec<&str> = g
            .top_performers
            .iter()
            .map(|t| t.student.student_number.as_str())
            .collect();
        assert_eq!(order, ["S2", "S5", "S7", "S1", "S3"]);
        assert_eq!(g.top_performers[0].gpa, 4.0);
    }

    #[test]
    fn students_without_results_rank_at_zero() {
        let mut f = Fixture::new();
        f.student("S1", true);
        let g = global_of(build_dashboard_snapshot(&Role::Administrator, &f.records));
        assert_eq!(g.top_performers.len(), 1);
        assert_eq!(g.top_performers[0].gpa, 0.0);
    }

    #[test]
    fn unresolved_identity_sees_global_view() {
        let f = Fixture::new();
        let snapshot = build_dashboard_snapshot(&Role::Unresolved(Unresolved::NoMatch), &f.records);
        assert!(matches!(snapshot, DashboardSnapshot::Global(_)));
    }

    #[test]
    fn lecturer_view_scopes_results_to_taught_courses() {
        let mut f = Fixture::new();
        let s = f.student("S1", true);
        let taught = f.course("CS101", 3, true);
        let other = f.course("MA101", 4, true);
        f.result(&s, &taught, Grade::A, "2025-1", 0);
        f.result(&s, &taught, Grade::B, "2025-2", 1);
        f.result(&s, &other, Grade::C, "2025-1", 2);

        let lecturer = Lecturer {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            staff_id: "L1".to_string(),
            department: "Computing".to_string(),
            is_admin_assistant: false,
            course_ids: vec![taught.id],
        };
        f.records.lecturers.push(lecturer.clone());

        match build_dashboard_snapshot(&Role::Lecturer(lecturer.clone()), &f.records) {
            DashboardSnapshot::Lecturer(l) => {
                assert_eq!(l.total_results, 2);
                assert_eq!(l.total_students, 1);
                assert_eq!(l.total_courses, 2);
                assert!(l.recent_results.iter().all(|r| r.course_code == "CS101"));
            }
            other => panic!("expected lecturer snapshot, got {other:?}"),
        }

        // Only the newest slice was fetched; the stored total still wins.
        f.records.results.retain(|r| r.course.id == taught.id);
        f.records.results.truncate(1);
        f.records.result_count = Some(12);
        match build_dashboard_snapshot(&Role::Lecturer(lecturer), &f.records) {
            DashboardSnapshot::Lecturer(l) => {
                assert_eq!(l.total_results, 12);
                assert_eq!(l.recent_results.len(), 1);
            }
            other => panic!("expected lecturer snapshot, got {other:?}"),
        }
    }

    #[test]
    fn student_view_summarises_own_results() {
        let mut f = Fixture::new();
        let me = f.student("S1", true);
        let someone = f.student("S2", true);
        let c3 = f.course("CS101", 3, true);
        let c1 = f.course("MA101", 1, true);
        f.result(&me, &c3, Grade::B, "2025-1", 0);
        f.result(&me, &c1, Grade::C, "2025-2", 1);
        f.result(&someone, &c3, Grade::F, "2025-1", 2);

        match build_dashboard_snapshot(&Role::Student(me.clone()), &f.records) {
            DashboardSnapshot::Student(s) => {
                assert_eq!(s.student, me);
                assert_eq!(s.gpa, 2.75);
                assert_eq!(s.total_results, 2);
                assert_eq!(s.semester_summary.len(), 2);
                assert_eq!(s.recent_results[0].semester, "2025-2");
            }
            other => panic!("expected student snapshot, got {other:?}"),
        }
    }
}
