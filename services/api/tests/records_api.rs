mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn staff_manage_courses_with_validation_and_conflicts() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let created = app
        .post(
            "/api/courses",
            Some(&admin),
            json!({ "code": "CS101", "name": "Intro to Computing", "credits": 4 }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json()["credits"], 4);

    let zero = app
        .post("/api/courses", Some(&admin), json!({ "code": "CS102", "name": "Zero", "credits": 0 }))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
    assert_eq!(zero.json()["field"], "credits");

    let dup = app
        .post("/api/courses", Some(&admin), json!({ "code": "CS101", "name": "Again" }))
        .await;
    assert_eq!(dup.status, StatusCode::CONFLICT);
    assert_eq!(dup.json()["field"], "code");

    let id = created.json()["id"].as_str().unwrap().to_string();
    let renamed = app
        .put(
            &format!("/api/courses/{}", id),
            &admin,
            json!({ "code": "CS101", "name": "Computing I", "credits": 3 }),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.json()["name"], "Computing I");
}

#[tokio::test]
async fn students_cannot_mutate_records() {
    let app = TestApp::new();
    let identity = app.identity("jane", Some("jane@etu.edu"), false, false).await;
    app.student("S001", Some("jane@etu.edu"), Some(&identity)).await;
    let cookie = app.login("jane").await;

    let response = app
        .post("/api/courses", Some(&cookie), json!({ "code": "X1", "name": "Nope" }))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let listing = app.get("/api/students", &cookie).await;
    assert_eq!(listing.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn results_reject_bad_grades_and_duplicate_triples() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let student = app.student("S001", None, None).await;
    let course = app.course("CS101", 3).await;

    let body = |grade: &str| {
        json!({
            "student_id": student.id,
            "course_id": course.id,
            "grade": grade,
            "semester": "2024-1",
        })
    };

    let invalid = app.post("/api/results", Some(&admin), body("E")).await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.json()["field"], "grade");

    let first = app.post("/api/results", Some(&admin), body("B+")).await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.json()["grade_points"], 3.3);
    assert_eq!(first.json()["student"]["student_id"], "S001");

    let dup = app.post("/api/results", Some(&admin), body("A")).await;
    assert_eq!(dup.status, StatusCode::CONFLICT);
    assert_eq!(dup.json()["field"], "student_id, course_id, semester");

    // The course is now protected; the student cascades.
    let protected = app.delete(&format!("/api/courses/{}", course.id), &admin).await;
    assert_eq!(protected.status, StatusCode::CONFLICT);

    let removed = app.delete(&format!("/api/students/{}", student.id), &admin).await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);
    let results = app.get("/api/results", &admin).await;
    assert_eq!(results.json()["count"], 0);

    let now_free = app.delete(&format!("/api/courses/{}", course.id), &admin).await;
    assert_eq!(now_free.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn lecturers_grade_only_the_courses_they_teach() {
    let app = TestApp::new();
    let prof = app.identity("prof", Some("prof@etu.edu"), false, false).await;
    let taught = app.course("CS101", 3).await;
    let other = app.course("MA101", 3).await;
    app.lecturer(&prof, "L001", &[&taught]).await;
    let student = app.student("S001", None, None).await;
    let cookie = app.login("prof").await;

    let body = |course_id: uuid::Uuid| {
        json!({
            "student_id": student.id,
            "course_id": course_id,
            "grade": "A",
            "semester": "2024-1",
        })
    };

    let allowed = app.post("/api/results", Some(&cookie), body(taught.id)).await;
    assert_eq!(allowed.status, StatusCode::CREATED);

    let denied = app.post("/api/results", Some(&cookie), body(other.id)).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    // Lecturers only see results in their own courses.
    let listing = app.get("/api/results", &cookie).await;
    assert_eq!(listing.json()["count"], 1);
}

#[tokio::test]
async fn lists_search_and_paginate_by_ten() {
    let app = TestApp::new();
    let admin = app.admin().await;
    for n in 0..12 {
        app.student(&format!("S{:03}", n), None, None).await;
    }

    let first = app.get("/api/students", &admin).await;
    let body = first.json();
    assert_eq!(body["count"], 12);
    assert_eq!(body["results"].as_array().unwrap().len(), 10);
    assert_eq!(body["results"][0]["student_id"], "S000");

    let second = app.get("/api/students?page=2", &admin).await;
    assert_eq!(second.json()["results"].as_array().unwrap().len(), 2);

    let beyond = app.get("/api/students?page=3", &admin).await;
    assert_eq!(beyond.status, StatusCode::NOT_FOUND);

    let searched = app.get("/api/students?search=s011", &admin).await;
    assert_eq!(searched.json()["count"], 1);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let missing = uuid::Uuid::new_v4();
    for path in ["students", "courses", "lecturers", "results"] {
        let response = app.get(&format!("/api/{}/{}", path, missing), &admin).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "GET /api/{}", path);
    }
}
