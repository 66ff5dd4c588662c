mod common;

use api_lib::config::Config;
use axum::http::StatusCode;
use common::{TestApp, PASSWORD};
use records_core::ports::{ActivationMessage, ActivationNotifier, PortError, PortResult, RecordsRepository};
use serde_json::json;
use std::sync::Arc;

fn student_registration(username: &str, student_id: &str, email: &str) -> serde_json::Value {
    json!({
        "username": username,
        "email": email,
        "password": PASSWORD,
        "password_confirm": PASSWORD,
        "student_id": student_id,
        "first_name": "Jane",
        "last_name": "Smith",
        "program": "Computing",
    })
}

/// The token is the last path segment of the emailed link.
fn token_from_outbox(app: &TestApp) -> String {
    let sent = app.outbox.sent();
    let body = &sent.last().expect("no activation email sent").body;
    let link = body
        .lines()
        .find(|l| l.contains("/activate/"))
        .expect("no activation link in email");
    link.trim().rsplit('/').next().unwrap().to_string()
}

#[tokio::test]
async fn student_registration_requires_activation_before_login() {
    let app = TestApp::new();

    let registered = app
        .post("/register/student", None, student_registration("jane", "S100", "jane@etu.edu"))
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);

    let creds = app.repo.get_credentials_by_username("jane").await.unwrap();
    assert!(!creds.is_active);

    let early = app
        .post("/auth/login", None, json!({ "username": "jane", "password": PASSWORD }))
        .await;
    assert_eq!(early.status, StatusCode::UNAUTHORIZED);

    let sent = app.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "jane@etu.edu");
    assert!(sent[0].subject.contains("ETU Results"));

    let token = token_from_outbox(&app);
    let activated = app
        .request(axum::http::Method::GET, &format!("/activate/{}", token), None, None)
        .await;
    assert_eq!(activated.status, StatusCode::OK);
    assert_eq!(activated.json()["role"], "student");
    assert_eq!(activated.json()["redirect"], "/dashboard/student");
    assert!(activated.session_cookie().is_some());

    // Tokens are single use.
    let again = app
        .request(axum::http::Method::GET, &format!("/activate/{}", token), None, None)
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);

    let cookie = app.login("jane").await;
    let me = app.get("/me", &cookie).await;
    assert_eq!(me.json()["role"], "student");
}

#[tokio::test]
async fn duplicate_student_id_is_a_conflict_on_that_field() {
    let app = TestApp::new();
    app.post("/register/student", None, student_registration("jane", "S100", "jane@etu.edu"))
        .await;

    let dup = app
        .post("/register/student", None, student_registration("john", "S100", "john@etu.edu"))
        .await;
    assert_eq!(dup.status, StatusCode::CONFLICT);
    assert_eq!(dup.json()["field"], "student_id");

    let dup_user = app
        .post("/register/student", None, student_registration("jane", "S200", "other@etu.edu"))
        .await;
    assert_eq!(dup_user.status, StatusCode::CONFLICT);
    assert_eq!(dup_user.json()["field"], "username");
    assert_eq!(app.repo.list_identities().await.unwrap().len(), 1);
}

#[tokio::test]
async fn mismatched_passwords_are_rejected() {
    let app = TestApp::new();
    let mut body = student_registration("jane", "S100", "jane@etu.edu");
    body["password_confirm"] = json!("something-else");
    let response = app.post("/register/student", None, body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["field"], "password_confirm");
}

#[tokio::test]
async fn lecturer_registration_lands_on_lecturer_dashboard() {
    let app = TestApp::new();
    let response = app
        .post(
            "/register/lecturer",
            None,
            json!({
                "username": "prof",
                "email": "prof@etu.edu",
                "password": PASSWORD,
                "password_confirm": PASSWORD,
                "staff_id": "L001",
                "department": "Computing",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let token = token_from_outbox(&app);
    let activated = app
        .request(axum::http::Method::GET, &format!("/activate/{}", token), None, None)
        .await;
    assert_eq!(activated.json()["redirect"], "/dashboard/lecturer");
}

#[tokio::test]
async fn admin_registration_checks_the_configured_code() {
    let app = TestApp::with_config(Config {
        admin_registration_code: Some("letmein".to_string()),
        make_admin_superuser_on_registration: true,
        ..Config::default()
    });
    let body = |code: &str| {
        json!({
            "username": "root",
            "email": "root@etu.edu",
            "password": PASSWORD,
            "password_confirm": PASSWORD,
            "registration_code": code,
        })
    };

    let wrong = app.post("/register/admin", None, body("nope")).await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.json()["field"], "registration_code");

    let ok = app.post("/register/admin", None, body("letmein")).await;
    assert_eq!(ok.status, StatusCode::CREATED);
    let identity_id = ok.json()["identity_id"].as_str().unwrap().parse().unwrap();
    let identity = app.repo.get_identity(identity_id).await.unwrap();
    assert!(identity.is_staff && identity.is_superuser && !identity.is_active);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let app = TestApp::new();
    app.identity("staff", Some("staff@etu.edu"), true, false).await;
    let cookie = app.login("staff").await;
    assert_eq!(app.get("/me", &cookie).await.status, StatusCode::OK);

    let out = app
        .request(axum::http::Method::POST, "/auth/logout", Some(&cookie), None)
        .await;
    assert_eq!(out.status, StatusCode::OK);
    assert_eq!(app.get("/me", &cookie).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_and_missing_cookie_are_unauthorized() {
    let app = TestApp::new();
    app.identity("staff", None, true, false).await;
    let bad = app
        .post("/auth/login", None, json!({ "username": "staff", "password": "wrong-one" }))
        .await;
    assert_eq!(bad.status, StatusCode::UNAUTHORIZED);

    let anonymous = app
        .request(axum::http::Method::GET, "/dashboard", None, None)
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

/// A mail relay that is always down.
struct BrokenMailer;

#[async_trait::async_trait]
impl ActivationNotifier for BrokenMailer {
    async fn send_activation(&self, _message: &ActivationMessage) -> PortResult<()> {
        Err(PortError::Unexpected("smtp relay unreachable".to_string()))
    }
}

#[tokio::test]
async fn failed_activation_email_undoes_the_registration() {
    let app = TestApp::with_notifier(Arc::new(BrokenMailer));
    let body = student_registration("jane", "S100", "jane@etu.edu");

    let first = app.post("/register/student", None, body.clone()).await;
    assert_eq!(first.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.repo.list_identities().await.unwrap().is_empty());
    assert!(app.repo.get_student_by_number("S100").await.unwrap().is_none());

    let retry = app.post("/register/student", None, body).await;
    assert_eq!(retry.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.repo.list_identities().await.unwrap().is_empty());

    let lecturer = app
        .post(
            "/register/lecturer",
            None,
            json!({
                "username": "prof",
                "email": "prof@etu.edu",
                "password": PASSWORD,
                "password_confirm": PASSWORD,
                "staff_id": "L001",
            }),
        )
        .await;
    assert_eq!(lecturer.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.repo.list_lecturers(None).await.unwrap().is_empty());

    let admin = app
        .post(
            "/register/admin",
            None,
            json!({
                "username": "root",
                "email": "root@etu.edu",
                "password": PASSWORD,
                "password_confirm": PASSWORD,
            }),
        )
        .await;
    assert_eq!(admin.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.repo.list_identities().await.unwrap().is_empty());
}
