//! Shared harness for the router tests: an in-memory app plus request helpers.

#![allow(dead_code)]

use api_lib::adapters::{MemoryAdapter, OutboxNotifier};
use api_lib::config::Config;
use api_lib::web::{self, state::AppState};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use records_core::domain::{Course, Identity, Lecturer, NewCourse, NewIdentity, NewLecturer, NewStudent, Student};
use records_core::ports::{ActivationNotifier, RecordsRepository};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "s3cret-pass";

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryAdapter>,
    pub outbox: Arc<OutboxNotifier>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    /// The `session=...` pair from `Set-Cookie`, ready to send back.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)?
            .to_str()
            .ok()?
            .split(';')
            .next()
            .map(str::to_string)
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let outbox = Arc::new(OutboxNotifier::new());
        Self::build(config, outbox.clone(), outbox)
    }

    /// An app whose activation emails go to `notifier` instead of the outbox.
    pub fn with_notifier(notifier: Arc<dyn ActivationNotifier>) -> Self {
        Self::build(Config::default(), notifier, Arc::new(OutboxNotifier::new()))
    }

    fn build(config: Config, notifier: Arc<dyn ActivationNotifier>, outbox: Arc<OutboxNotifier>) -> Self {
        let repo = Arc::new(MemoryAdapter::new());
        let state = Arc::new(AppState::new(repo.clone(), notifier, Arc::new(config)));
        Self {
            router: web::router(state),
            repo,
            outbox,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, cookie, Some(body)).await
    }

    pub async fn put(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(cookie), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, cookie: &str) -> TestResponse {
        self.request(Method::DELETE, uri, Some(cookie), None).await
    }

    //=====================================================================================
    // Seeding
    //=====================================================================================

    /// Inserts an activated identity whose password is [`PASSWORD`].
    pub async fn identity(&self, username: &str, email: Option<&str>, staff: bool, superuser: bool) -> Identity {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = Argon2::default()
            .hash_password(PASSWORD.as_bytes(), &salt)
            .unwrap()
            .to_string();
        self.repo
            .create_identity(NewIdentity {
                username: username.to_string(),
                email: email.map(str::to_string),
                first_name: String::new(),
                last_name: String::new(),
                hashed_password,
                is_active: true,
                is_staff: staff,
                is_superuser: superuser,
            })
            .await
            .unwrap()
    }

    pub async fn login(&self, username: &str) -> String {
        let response = self
            .post(
                "/auth/login",
                None,
                serde_json::json!({ "username": username, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed for {}", username);
        response.session_cookie().unwrap()
    }

    /// A superuser, logged in.
    pub async fn admin(&self) -> String {
        self.identity("admin", Some("admin@etu.edu"), true, true).await;
        self.login("admin").await
    }

    pub async fn student(&self, number: &str, email: Option<&str>, identity: Option<&Identity>) -> Student {
        self.repo
            .create_student(NewStudent {
                student_number: number.to_string(),
                first_name: "Student".to_string(),
                last_name: number.to_string(),
                email: email.map(str::to_string),
                is_active: true,
                identity_id: identity.map(|i| i.id),
                ..NewStudent::default()
            })
            .await
            .unwrap()
    }

    pub async fn course(&self, code: &str, credits: u16) -> Course {
        self.repo
            .create_course(NewCourse {
                code: code.to_string(),
                name: format!("{} course", code),
                credits,
                description: String::new(),
                semester: "2024-1".to_string(),
                is_active: true,
            })
            .await
            .unwrap()
    }

    pub async fn lecturer(&self, identity: &Identity, staff_id: &str, courses: &[&Course]) -> Lecturer {
        self.repo
            .create_lecturer(NewLecturer {
                identity_id: identity.id,
                staff_id: staff_id.to_string(),
                department: "Computing".to_string(),
                is_admin_assistant: false,
                course_ids: courses.iter().map(|c| c.id).collect(),
            })
            .await
            .unwrap()
    }
}
