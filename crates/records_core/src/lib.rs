pub mod dashboard;
pub mod domain;
pub mod grading;
pub mod ports;
pub mod roles;

pub use dashboard::{build_dashboard_snapshot, DashboardSnapshot, RecordSet};
pub use domain::{
    Course, CourseResult, Identity, IdentityCredentials, Lecturer, NewCourse, NewIdentity,
    NewLecturer, NewResult, NewStudent, ResultDetail, Student,
};
pub use grading::{compute_gpa, summarize_by_semester, Grade, GradeParseError, SemesterSummary};
pub use ports::{ActivationMessage, ActivationNotifier, PortError, PortResult, RecordsRepository};
pub use roles::{authorize_self_access, resolve_role, ResolutionPolicy, Role, RoleCandidates, Unresolved};
