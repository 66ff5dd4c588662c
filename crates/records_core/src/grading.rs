//! crates/records_core/src/grading.rs
//!
//! The grade scale and the aggregates derived from it: credit-weighted GPA and
//! per-semester summaries. Everything here is pure and recomputed on each call.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::domain::ResultDetail;

//=========================================================================================
// Grade Scale
//=========================================================================================

/// The closed set of letter grades a result can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
    APlus,
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    D,
    F,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a recognised grade")]
pub struct GradeParseError(pub String);

impl Grade {
    pub const ALL: [Grade; 11] = [
        Grade::APlus,
        Grade::A,
        Grade::AMinus,
        Grade::BPlus,
        Grade::B,
        Grade::BMinus,
        Grade::CPlus,
        Grade::C,
        Grade::CMinus,
        Grade::D,
        Grade::F,
    ];

    /// Grade points in tenths. Every point value on the scale has one decimal
    /// place, so sums stay exact in integers.
    fn tenths(self) -> u32 {
        match self {
            Grade::APlus | Grade::A => 40,
            Grade::AMinus => 37,
            Grade::BPlus => 33,
            Grade::B => 30,
            Grade::BMinus => 27,
            Grade::CPlus => 23,
            Grade::C => 20,
            Grade::CMinus => 17,
            Grade::D => 10,
            Grade::F => 0,
        }
    }

    pub fn points(self) -> f64 {
        f64::from(self.tenths()) / 10.0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    /// The coarse letter band (A/B/C/D/F) used by compact list views.
    pub fn band(self) -> char {
        match self {
            Grade::APlus | Grade::A | Grade::AMinus => 'A',
            Grade::BPlus | Grade::B | Grade::BMinus => 'B',
            Grade::CPlus | Grade::C | Grade::CMinus => 'C',
            Grade::D => 'D',
            Grade::F => 'F',
        }
    }
}

impl FromStr for Grade {
    type Err = GradeParseError;

    /// Exact match only: no surrounding whitespace, no case folding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grade::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| GradeParseError(s.to_string()))
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// GPA Aggregator
//=========================================================================================

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Credit-weighted GPA rounded to two decimals.
///
/// Returns 0.0 for an empty result set or when the credits sum to zero.
pub fn compute_gpa<'a, I>(results: I) -> f64
where
    I: IntoIterator<Item = &'a ResultDetail>,
{
    let (weighted, credits) = results
        .into_iter()
        .fold((0u64, 0u64), |(weighted, credits), r| {
            let c = u64::from(r.credits());
            (weighted + u64::from(r.grade().tenths()) * c, credits + c)
        });

    if credits == 0 {
        return 0.0;
    }
    round2(weighted as f64 / (credits as f64 * 10.0))
}

/// Renders a GPA for presentation: "N/A" when there is nothing to average.
pub fn display_gpa(results: &[ResultDetail]) -> String {
    let credits: u32 = results.iter().map(|r| u32::from(r.credits())).sum();
    if credits == 0 {
        "N/A".to_string()
    } else {
        format!("{:.2}", compute_gpa(results))
    }
}

//=========================================================================================
// Semester Summarizer
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SemesterSummary {
    pub semester: String,
    pub count: usize,
    /// Unweighted sum of grade points.
    pub total_points: f64,
    pub average: f64,
}

/// Groups results by exact semester label, in order of first appearance.
pub fn summarize_by_semester<'a, I>(results: I) -> Vec<SemesterSummary>
where
    I: IntoIterator<Item = &'a ResultDetail>,
{
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, (usize, u32)> = HashMap::new();

    for r in results {
        let entry = groups.entry(r.semester()).or_insert_with(|| {
            order.push(r.semester());
            (0, 0)
        });
        entry.0 += 1;
        entry.1 += r.grade().tenths();
    }

    order
        .into_iter()
        .map(|label| {
            let (count, tenths) = groups[label];
            let total_points = f64::from(tenths) / 10.0;
            SemesterSummary {
                semester: label.to_string(),
                count,
                total_points,
                average: total_points / count as f64,
            }
        })
        .collect()
}

/// Parses a canonical `YYYY-N` semester label into `(year, term)`.
pub fn parse_semester(label: &str) -> Option<(i32, u8)> {
    let (year, term) = label.split_once('-')?;
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let term = match term {
        "1" => 1,
        "2" => 2,
        _ => return None,
    };
    Some((year.parse().ok()?, term))
}

/// Orders canonical labels chronologically; labels that do not parse keep
/// their relative order and go last.
pub fn sort_chronologically(summaries: &mut [SemesterSummary]) {
    summaries.sort_by_key(|s| match parse_semester(&s.semester) {
        Some(key) => (false, key),
        None => (true, (0, 0)),
    });
}

/// The semester label in effect on `date`: August onwards is term 2.
pub fn current_semester(date: NaiveDate) -> String {
    let term = if date.month() >= 8 { 2 } else { 1 };
    format!("{}-{}", date.year(), term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Course, CourseResult};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn detail(grade: Grade, credits: u16, semester: &str) -> ResultDetail {
        let course_id = Uuid::new_v4();
        ResultDetail {
            result: CourseResult {
                id: Uuid::new_v4(),
                student_id: Uuid::nil(),
                course_id,
                grade,
                semester: semester.to_string(),
                remarks: String::new(),
                recorded_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            },
            course: Course {
                id: course_id,
                code: format!("C{credits}"),
                name: "Course".to_string(),
                credits,
                description: String::new(),
                semester: String::new(),
                is_active: true,
            },
        }
    }

    #[test]
    fn grade_points_follow_the_scale() {
        assert_eq!(Grade::APlus.points(), 4.0);
        assert_eq!(Grade::A.points(), 4.0);
        assert_eq!(Grade::AMinus.points(), 3.7);
        assert_eq!(Grade::BPlus.points(), 3.3);
        assert_eq!(Grade::CMinus.points(), 1.7);
        assert_eq!(Grade::D.points(), 1.0);
        assert_eq!(Grade::F.points(), 0.0);
    }

    #[test]
    fn every_grade_round_trips_through_its_label() {
        for g in Grade::ALL {
            assert_eq!(g.as_str().parse::<Grade>(), Ok(g));
        }
    }

    #[test]
    fn unknown_grades_are_rejected() {
        for bad in ["E", "a", "A++", "", "4.0", "D+", " A ", "B\n"] {
            assert_eq!(bad.parse::<Grade>(), Err(GradeParseError(bad.to_string())));
        }
    }

    #[test]
    fn band_collapses_plus_and_minus() {
        assert_eq!(Grade::AMinus.band(), 'A');
        assert_eq!(Grade::BPlus.band(), 'B');
        assert_eq!(Grade::CMinus.band(), 'C');
        assert_eq!(Grade::F.band(), 'F');
    }

    #[test]
    fn gpa_of_nothing_is_zero() {
        assert_eq!(compute_gpa(&Vec::<ResultDetail>::new()), 0.0);
    }

    #[test]
    fn gpa_single_result() {
        assert_eq!(compute_gpa(&[detail(Grade::A, 3, "2025-1")]), 4.0);
    }

    #[test]
    fn gpa_is_credit_weighted() {
        let results = [detail(Grade::B, 3, "2025-1"), detail(Grade::C, 1, "2025-1")];
        assert_eq!(compute_gpa(&results), 2.75);
    }

    #[test]
    fn gpa_rounds_to_two_places() {
        // (3.7*3 + 3.3*4 + 2.7*2) / 9 = 3.3
        let results = [
            detail(Grade::AMinus, 3, "2025-1"),
            detail(Grade::BPlus, 4, "2025-1"),
            detail(Grade::BMinus, 2, "2025-2"),
        ];
        assert_eq!(compute_gpa(&results), 3.3);

        // (4.0*1 + 3.7*1 + 3.3*1) / 3 = 3.6666..
        let results = [
            detail(Grade::A, 1, "2025-1"),
            detail(Grade::AMinus, 1, "2025-1"),
            detail(Grade::BPlus, 1, "2025-1"),
        ];
        assert_eq!(compute_gpa(&results), 3.67);
    }

    #[test]
    fn gpa_with_zero_credits_is_zero() {
        let results = [detail(Grade::A, 0, "2025-1"), detail(Grade::B, 0, "2025-1")];
        assert_eq!(compute_gpa(&results), 0.0);
    }

    #[test]
    fn gpa_ignores_result_order() {
        let mut results = vec![
            detail(Grade::AMinus, 3, "2024-2"),
            detail(Grade::CPlus, 4, "2025-1"),
            detail(Grade::BMinus, 2, "2025-1"),
            detail(Grade::D, 1, "2025-2"),
            detail(Grade::BPlus, 3, "2025-2"),
        ];
        let expected = compute_gpa(&results);
        results.reverse();
        assert_eq!(compute_gpa(&results), expected);
        results.rotate_left(2);
        assert_eq!(compute_gpa(&results), expected);
        results.swap(0, 3);
        assert_eq!(compute_gpa(&results), expected);
    }

    #[test]
    fn display_gpa_marks_empty_sets() {
        assert_eq!(display_gpa(&[]), "N/A");
        assert_eq!(display_gpa(&[detail(Grade::B, 3, "2025-1")]), "3.00");
    }

    #[test]
    fn semester_groups_are_disjoint_and_cover_every_result() {
        let results = vec![
            detail(Grade::A, 3, "2025-1"),
            detail(Grade::C, 4, "2024-2"),
            detail(Grade::B, 1, "2025-1"),
            detail(Grade::F, 2, "Fall 2025"),
        ];
        let summary = summarize_by_semester(&results);

        let labels: Vec<&str> = summary.iter().map(|s| s.semester.as_str()).collect();
        assert_eq!(labels, ["2025-1", "2024-2", "Fall 2025"]);
        assert_eq!(summary.iter().map(|s| s.count).sum::<usize>(), results.len());

        let first = &summary[0];
        assert_eq!(first.count, 2);
        assert_eq!(first.total_points, 7.0);
        assert_eq!(first.average, 3.5);
    }

    #[test]
    fn semester_average_is_not_credit_weighted() {
        let results = [detail(Grade::B, 3, "2025-1"), detail(Grade::C, 1, "2025-1")];
        let summary = summarize_by_semester(&results);
        assert_eq!(summary[0].average, 2.5);
        assert_ne!(summary[0].average, compute_gpa(&results));
    }

    #[test]
    fn labels_are_not_normalised() {
        let results = [detail(Grade::A, 3, "2025-1"), detail(Grade::A, 3, "2025-01")];
        assert_eq!(summarize_by_semester(&results).len(), 2);
    }

    #[test]
    fn chronological_sort_puts_unparsed_labels_last() {
        let results = vec![
            detail(Grade::A, 3, "Summer school"),
            detail(Grade::A, 3, "2025-1"),
            detail(Grade::A, 3, "2024-2"),
            detail(Grade::A, 3, "legacy"),
            detail(Grade::A, 3, "2024-1"),
        ];
        let mut summary = summarize_by_semester(&results);
        sort_chronologically(&mut summary);
        let labels: Vec<&str> = summary.iter().map(|s| s.semester.as_str()).collect();
        assert_eq!(labels, ["2024-1", "2024-2", "2025-1", "Summer school", "legacy"]);
    }

    #[test]
    fn parse_semester_accepts_only_canonical_labels() {
        assert_eq!(parse_semester("2025-2"), Some((2025, 2)));
        assert_eq!(parse_semester("2025-3"), None);
        assert_eq!(parse_semester("25-1"), None);
        assert_eq!(parse_semester("Fall 2025"), None);
        assert_eq!(parse_semester("+202-1"), None);
        assert_eq!(parse_semester("2025-+1"), None);
        assert_eq!(parse_semester("2025-01"), None);
        assert_eq!(parse_semester(" 2025-1"), None);
    }

    #[test]
    fn current_semester_switches_in_august() {
        let july = NaiveDate::from_ymd_opt(2025, 7, 31).unwrap();
        let august = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        assert_eq!(current_semester(july), "2025-1");
        assert_eq!(current_semester(august), "2025-2");
    }
}
