//! crates/records_core/src/roles.rs
//!
//! Maps an authenticated identity to exactly one role and answers the
//! authorization questions that depend on it.

use uuid::Uuid;

use crate::domain::{Identity, Lecturer, Student};

//=========================================================================================
// Role Types
//=========================================================================================

/// The role an identity acts under. Produced only by [`resolve_role`].
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    Administrator,
    Lecturer(Lecturer),
    Student(Student),
    Unresolved(Unresolved),
}

/// Why no role could be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    NoMatch,
    /// Several student records share the identity's email. Needs an
    /// administrator to link the right one.
    AmbiguousEmail { matches: usize },
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Lecturer(_) => "lecturer",
            Role::Student(_) => "student",
            Role::Unresolved(_) => "unresolved",
        }
    }

    /// Where a freshly logged-in identity should land.
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Administrator => "/dashboard/admin",
            Role::Lecturer(_) => "/dashboard/lecturer",
            Role::Student(_) => "/dashboard/student",
            Role::Unresolved(_) => "/dashboard",
        }
    }

    pub fn student(&self) -> Option<&Student> {
        match self {
            Role::Student(s) => Some(s),
            _ => None,
        }
    }

    pub fn lecturer(&self) -> Option<&Lecturer> {
        match self {
            Role::Lecturer(l) => Some(l),
            _ => None,
        }
    }
}

/// Controls the legacy email fallback in rule 3 of [`resolve_role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionPolicy {
    pub email_fallback: bool,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            email_fallback: true,
        }
    }
}

/// Records that might belong to an identity, gathered by the caller from storage.
#[derive(Debug, Clone, Default)]
pub struct RoleCandidates {
    pub lecturer: Option<Lecturer>,
    pub linked_student: Option<Student>,
    pub email_matches: Vec<Student>,
}

impl RoleCandidates {
    /// Builds the candidate set by scanning in-memory snapshots.
    pub fn from_records(identity: &Identity, students: &[Student], lecturers: &[Lecturer]) -> Self {
        let lecturer = lecturers
            .iter()
            .find(|l| l.identity_id == identity.id)
            .cloned();
        let linked_student = students
            .iter()
            .find(|s| s.identity_id == Some(identity.id))
            .cloned();
        let email_matches = match identity.email.as_deref() {
            Some(email) => students
                .iter()
                .filter(|s| emails_match(s.email.as_deref(), email))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Self {
            lecturer,
            linked_student,
            email_matches,
        }
    }
}

fn emails_match(stored: Option<&str>, email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && stored.is_some_and(|s| s.trim().eq_ignore_ascii_case(email))
}

//=========================================================================================
// Resolution and Authorization
//=========================================================================================

/// Resolves the role of `identity`. The first matching rule wins:
///
/// 1. superuser → `Administrator`
/// 2. a lecturer linked to the identity → `Lecturer`
/// 3. a student linked to the identity, or else exactly one unclaimed student
///    whose email matches (activated identities only) → `Student`
/// 4. otherwise `Unresolved`
pub fn resolve_role(identity: &Identity, candidates: RoleCandidates, policy: ResolutionPolicy) -> Role {
    if identity.is_superuser {
        return Role::Administrator;
    }

    if let Some(lecturer) = candidates
        .lecturer
        .filter(|l| l.identity_id == identity.id)
    {
        return Role::Lecturer(lecturer);
    }

    if let Some(student) = candidates
        .linked_student
        .filter(|s| s.identity_id == Some(identity.id))
    {
        return Role::Student(student);
    }

    if !policy.email_fallback || !identity.is_active {
        return Role::Unresolved(Unresolved::NoMatch);
    }
    let Some(email) = identity.email.as_deref() else {
        return Role::Unresolved(Unresolved::NoMatch);
    };

    // A record already claimed by another identity is never a fallback match.
    let mut matches: Vec<Student> = candidates
        .email_matches
        .into_iter()
        .filter(|s| emails_match(s.email.as_deref(), email))
        .filter(|s| s.identity_id.map_or(true, |owner| owner == identity.id))
        .collect();

    match matches.len() {
        0 => Role::Unresolved(Unresolved::NoMatch),
        1 => Role::Student(matches.remove(0)),
        n => Role::Unresolved(Unresolved::AmbiguousEmail { matches: n }),
    }
}

/// Whether `identity` may act on `target`'s own data (profile edits, result
/// downloads). Staff always may; otherwise only the student themself.
pub fn authorize_self_access(identity: &Identity, role: &Role, target: &Student) -> bool {
    if identity.has_staff_override() {
        return true;
    }
    role.student().is_some_and(|s| s.id == target.id)
}

/// Creating, editing or deleting students, courses and lecturers.
pub fn can_manage_records(identity: &Identity) -> bool {
    identity.has_staff_override()
}

/// Recording or changing a grade for `course_id`: staff, or a lecturer teaching it.
pub fn can_manage_result(identity: &Identity, role: &Role, course_id: Uuid) -> bool {
    if identity.has_staff_override() {
        return true;
    }
    role.lecturer().is_some_and(|l| l.teaches(course_id))
}

//=========================================================================================
// Identity Backfill
//=========================================================================================

/// Outcome of matching unlinked students to identities by email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillPlan {
    /// `(student_id, identity_id)` pairs to link.
    pub links: Vec<(Uuid, Uuid)>,
    pub skipped_no_email: usize,
    pub skipped_ambiguous: usize,
    pub unmatched: usize,
}

/// Plans the one-time migration that gives email-only students a direct
/// identity link. Ambiguous emails are skipped, never guessed.
pub fn plan_identity_backfill(students: &[Student], identities: &[Identity]) -> BackfillPlan {
    let mut plan = BackfillPlan::default();

    for student in students.iter().filter(|s| s.identity_id.is_none()) {
        let Some(email) = student.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            plan.skipped_no_email += 1;
            continue;
        };

        let mut found = identities
            .iter()
            .filter(|i| emails_match(i.email.as_deref(), email));
        match (found.next(), found.next()) {
            (Some(identity), None) => plan.links.push((student.id, identity.id)),
            (Some(_), Some(_)) => plan.skipped_ambiguous += 1,
            _ => plan.unmatched += 1,
        }
    }

    plan
}
