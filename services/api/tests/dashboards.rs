mod common;

use api_lib::config::Config;
use axum::http::StatusCode;
use common::TestApp;
use records_core::domain::NewResult;
use records_core::grading::Grade;
use records_core::ports::RecordsRepository;
use serde_json::json;

#[tokio::test]
async fn student_dashboard_reports_weighted_gpa_and_semesters() {
    let app = TestApp::new();
    let identity = app.identity("jane", Some("jane@etu.edu"), false, false).await;
    let student = app.student("S001", Some("jane@etu.edu"), Some(&identity)).await;
    let heavy = app.course("CS101", 3).await;
    let light = app.course("CS102", 5).await;
    for (course, grade, semester) in [(&heavy, Grade::A, "2024-1"), (&light, Grade::C, "2024-2")] {
        app.repo
            .create_result(NewResult {
                student_id: student.id,
                course_id: course.id,
                grade,
                semester: semester.to_string(),
                remarks: String::new(),
            })
            .await
            .unwrap();
    }
    let cookie = app.login("jane").await;

    let response = app.get("/dashboard/student", &cookie).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["view"], "student");
    assert_eq!(body["gpa"], 2.75);
    assert_eq!(body["total_results"], 2);
    assert_eq!(body["semester_summary"].as_array().unwrap().len(), 2);

    // The landing page gives the same view.
    let landing = app.get("/dashboard", &cookie).await;
    assert_eq!(landing.json()["view"], "student");

    // Other role dashboards are refused outright.
    assert_eq!(app.get("/dashboard/admin", &cookie).await.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/dashboard/lecturer", &cookie).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_dashboard_counts_and_ranks() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let course = app.course("CS101", 3).await;
    let strong = app.student("S001", None, None).await;
    let weak = app.student("S002", None, None).await;
    for (student, grade) in [(&strong, Grade::A), (&weak, Grade::D)] {
        app.repo
            .create_result(NewResult {
                student_id: student.id,
                course_id: course.id,
                grade,
                semester: "2024-1".to_string(),
                remarks: String::new(),
            })
            .await
            .unwrap();
    }

    let body = app.get("/dashboard/admin", &admin).await.json();
    assert_eq!(body["view"], "global");
    assert_eq!(body["total_students"], 2);
    assert_eq!(body["total_courses"], 1);
    assert_eq!(body["total_results"], 2);
    assert_eq!(body["top_performers"][0]["student"]["student_id"], "S001");
    assert_eq!(body["top_performers"][0]["gpa"], 4.0);
}

#[tokio::test]
async fn ambiguous_email_is_unresolved_and_scoped_access_is_forbidden() {
    let app = TestApp::new();
    app.identity("twin", Some("twin@etu.edu"), false, false).await;
    let first = app.student("S001", Some("twin@etu.edu"), None).await;
    app.student("S002", Some("TWIN@etu.edu"), None).await;
    let cookie = app.login("twin").await;

    let me = app.get("/me", &cookie).await.json();
    assert_eq!(me["role"], "unresolved");
    assert_eq!(me["unresolved_reason"], "ambiguous_email");
    assert_eq!(me["dashboard"], "/dashboard");

    // The landing page falls back to the global view...
    let landing = app.get("/dashboard", &cookie).await;
    assert_eq!(landing.json()["view"], "global");

    // ...but nothing scoped to a student is reachable.
    let download = app.get(&format!("/students/{}/download", first.id), &cookie).await;
    assert_eq!(download.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/dashboard/student", &cookie).await.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/api/results", &cookie).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn email_fallback_can_be_switched_off() {
    let app = TestApp::with_config(Config {
        allow_email_role_fallback: false,
        ..Config::default()
    });
    app.identity("legacy", Some("legacy@etu.edu"), false, false).await;
    app.student("S001", Some("legacy@etu.edu"), None).await;
    let cookie = app.login("legacy").await;
    assert_eq!(app.get("/me", &cookie).await.json()["role"], "unresolved");

    let app = TestApp::new();
    app.identity("legacy", Some("legacy@etu.edu"), false, false).await;
    app.student("S001", Some("legacy@etu.edu"), None).await;
    let cookie = app.login("legacy").await;
    assert_eq!(app.get("/me", &cookie).await.json()["role"], "student");
}

#[tokio::test]
async fn students_download_only_their_own_results() {
    let app = TestApp::new();
    let jane = app.identity("jane", Some("jane@etu.edu"), false, false).await;
    let own = app.student("S001", Some("jane@etu.edu"), Some(&jane)).await;
    let other = app.student("S002", Some("john@etu.edu"), None).await;
    let cookie = app.login("jane").await;

    let mine = app.get(&format!("/students/{}/download", own.id), &cookie).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert!(mine.body.starts_with(b"\xEF\xBB\xBF"));
    assert_eq!(
        mine.headers.get("content-disposition").unwrap(),
        "attachment; filename=\"results_S001.csv\""
    );

    let theirs = app.get(&format!("/students/{}/download", other.id), &cookie).await;
    assert_eq!(theirs.status, StatusCode::FORBIDDEN);

    // Staff may download anyone's, and run the full exports.
    let admin = app.admin().await;
    let any = app.get(&format!("/students/{}/download", other.id), &admin).await;
    assert_eq!(any.status, StatusCode::OK);
    assert_eq!(app.get("/export/results", &admin).await.status, StatusCode::OK);
    assert_eq!(app.get("/export/students", &cookie).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn profile_edit_is_self_service() {
    let app = TestApp::new();
    let jane = app.identity("jane", Some("jane@etu.edu"), false, false).await;
    let own = app.student("S001", Some("jane@etu.edu"), Some(&jane)).await;
    let other = app.student("S002", None, None).await;
    let cookie = app.login("jane").await;

    let body = json!({ "first_name": "Janet", "last_name": "Smith", "program": "Maths" });
    let updated = app.put(&format!("/students/{}/profile", own.id), &cookie, body.clone()).await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["first_name"], "Janet");
    assert_eq!(updated.json()["student_id"], "S001");

    let denied = app.put(&format!("/students/{}/profile", other.id), &cookie, body).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_settings_edit_and_delete_own_account() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let updated = app
        .put(
            "/admin/settings",
            &admin,
            json!({ "first_name": "Ada", "last_name": "Admin", "email": "ada@etu.edu" }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["email"], "ada@etu.edu");

    let deleted = app.delete("/admin/settings", &admin).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert!(app.repo.list_identities().await.unwrap().is_empty());
    assert_eq!(app.get("/me", &admin).await.status, StatusCode::UNAUTHORIZED);

    let app = TestApp::new();
    app.identity("staff", None, true, false).await;
    let staff = app.login("staff").await;
    let refused = app.put("/admin/settings", &staff, json!({ "first_name": "X" })).await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_student_ids_are_forbidden_not_missing_for_students() {
    let app = TestApp::new();
    let jane = app.identity("jane", Some("jane@etu.edu"), false, false).await;
    app.student("S001", Some("jane@etu.edu"), Some(&jane)).await;
    let cookie = app.login("jane").await;
    let unknown = uuid::Uuid::new_v4();

    let record = app.get(&format!("/api/students/{}", unknown), &cookie).await;
    assert_eq!(record.status, StatusCode::FORBIDDEN);
    let download = app.get(&format!("/students/{}/download", unknown), &cookie).await;
    assert_eq!(download.status, StatusCode::FORBIDDEN);
    let body = json!({ "first_name": "Janet", "last_name": "Smith" });
    let profile = app.put(&format!("/students/{}/profile", unknown), &cookie, body).await;
    assert_eq!(profile.status, StatusCode::FORBIDDEN);

    // Staff still learn that the record does not exist.
    let admin = app.admin().await;
    let missing = app.get(&format!("/api/students/{}", unknown), &admin).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lecturer_dashboard_counts_only_taught_courses() {
    let app = TestApp::new();
    let prof = app.identity("prof", Some("prof@etu.edu"), false, false).await;
    let taught = app.course("CS101", 3).await;
    let other = app.course("MA101", 4).await;
    app.lecturer(&prof, "L001", &[&taught]).await;

    for n in 0..7 {
        let student = app.student(&format!("S00{}", n), None, None).await;
        for course in [&taught, &other] {
            app.repo
                .create_result(NewResult {
                    student_id: student.id,
                    course_id: course.id,
                    grade: Grade::B,
                    semester: "2024-1".to_string(),
                    remarks: String::new(),
                })
                .await
                .unwrap();
        }
        if n == 0 {
            app.repo
                .update_student(&records_core::domain::Student { is_active: false, ..student })
                .await
                .unwrap();
        }
    }
    let cookie = app.login("prof").await;

    let response = app.get("/dashboard/lecturer", &cookie).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["view"], "lecturer");
    assert_eq!(body["total_results"], 7);
    assert_eq!(body["total_students"], 6);
    assert_eq!(body["total_courses"], 2);
    let recent = body["recent_results"].as_array().unwrap();
    assert_eq!(recent.len(), 5);
    for r in recent {
        assert_eq!(r["course_code"], "CS101");
        assert!(!r["student_number"].as_str().unwrap().is_empty());
    }
}
