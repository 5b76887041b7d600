//! Integration tests for the /auth/v1 HTTP API

use actix_web::{test, web, App};
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;

use passgate::auth::server::routes;
use passgate::auth::{AuthServer, Clock, ManualClock, MemoryCredentialStore, MemoryMailer};
use passgate::common::config::AppConfig;

struct Harness {
    store: MemoryCredentialStore,
    mailer: Arc<MemoryMailer>,
    clock: Arc<ManualClock>,
    server: AuthServer,
}

fn harness_with(mailer: MemoryMailer) -> Harness {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some("integration-test-secret-0123456789abcdef".to_string());
    config.auth.site_url = "https://app.example.com".to_string();

    let store = MemoryCredentialStore::new();
    let mailer = Arc::new(mailer);
    let clock = Arc::new(ManualClock::default());
    let server = AuthServer::with_components(
        &config,
        Arc::new(store.clone()),
        mailer.clone(),
        clock.clone(),
    )
    .unwrap();

    Harness {
        store,
        mailer,
        clock,
        server,
    }
}

fn harness() -> Harness {
    harness_with(MemoryMailer::new())
}

macro_rules! app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($harness.server.state()))
                .configure(routes),
        )
        .await
    };
}

fn registration() -> Value {
    json!({
        "first_name": "a",
        "last_name": "b",
        "email": "a@b.com",
        "password": "password1"
    })
}

fn post(uri: &str, body: &Value) -> test::TestRequest {
    test::TestRequest::post().uri(uri).set_json(body)
}

#[actix_web::test]
async fn test_register_login_scenario() {
    let h = harness();
    let app = app!(h);

    let resp = test::call_service(
        &app,
        post("/auth/v1/register", &registration()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["email"], "a@b.com");
    assert_eq!(body["email_sent"], true);

    let record = h.store.get("a@b.com").await.unwrap();
    assert_eq!(body["user_id"], record.id.to_string());
    assert!(record.password_hash.starts_with("$argon2id$v=19$"));
    assert_ne!(record.password_hash, "password1");
    assert_eq!(
        record.verification_expires_at,
        Some(h.clock.now() + Duration::hours(3))
    );

    let login = json!({"email": "a@b.com", "password": "password1"});
    let resp = test::call_service(&app, post("/auth/v1/login", &login).to_request()).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 900);
    let token = body["access_token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/auth/v1/user")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let profile: Value = test::read_body_json(resp).await;
    assert_eq!(profile["email"], "a@b.com");
    assert_eq!(profile["email_verified"], false);
    assert!(profile.get("password_hash").is_none());
}

#[actix_web::test]
async fn test_failed_logins_are_indistinguishable() {
    let h = harness();
    let app = app!(h);
    test::call_service(&app, post("/auth/v1/register", &registration()).to_request()).await;

    let wrong = json!({"email": "a@b.com", "password": "password2"});
    let resp = test::call_service(&app, post("/auth/v1/login", &wrong).to_request()).await;
    assert_eq!(resp.status(), 401);
    let wrong_body: Value = test::read_body_json(resp).await;

    let unknown = json!({"email": "nobody@b.com", "password": "password1"});
    let resp = test::call_service(&app, post("/auth/v1/login", &unknown).to_request()).await;
    assert_eq!(resp.status(), 401);
    let unknown_body: Value = test::read_body_json(resp).await;

    assert_eq!(wrong_body["code"], "invalid_credentials");
    assert_eq!(wrong_body, unknown_body);
}

#[actix_web::test]
async fn test_duplicate_registration() {
    let h = harness();
    let app = app!(h);

    let resp = test::call_service(
        &app,
        post("/auth/v1/register", &registration()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);

    let resp = test::call_service(
        &app,
        post("/auth/v1/register", &registration()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "user_already_exists");
    assert_eq!(h.store.len().await, 1);
}

#[actix_web::test]
async fn test_validation_errors() {
    let h = harness();
    let app = app!(h);

    let resp = test::call_service(
        &app,
        post("/auth/v1/register", &json!({"email": "a@b.com"})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "missing_fields");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("first_name"));
    assert!(message.contains("password"));

    let mut short = registration();
    short["password"] = json!("short");
    let resp = test::call_service(&app, post("/auth/v1/register", &short).to_request()).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/auth/v1/register")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "invalid_json");

    assert!(h.store.is_empty().await);
}

#[actix_web::test]
async fn test_wrong_method() {
    let h = harness();
    let app = app!(h);

    let req = test::TestRequest::get().uri("/auth/v1/register").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 405);

    let req = test::TestRequest::post().uri("/auth/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 405);
}

#[actix_web::test]
async fn test_email_verification_flow() {
    let h = harness();
    let app = app!(h);
    test::call_service(&app, post("/auth/v1/register", &registration()).to_request()).await;

    let mail = h.mailer.last_to("a@b.com").unwrap();
    let code = h.store.get("a@b.com").await.unwrap().verification_code.unwrap();
    assert!(mail.text.contains(&code));
    assert!(mail.text.contains("https://app.example.com/auth/v1/verify?"));

    let verify = json!({"email": "a@b.com", "code": code});
    let resp = test::call_service(&app, post("/auth/v1/verify", &verify).to_request()).await;
    assert_eq!(resp.status(), 200);
    assert!(h.store.get("a@b.com").await.unwrap().is_verified());

    let resp = test::call_service(&app, post("/auth/v1/verify", &verify).to_request()).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "invalid_token");
}

#[actix_web::test]
async fn test_emailed_link_verifies() {
    let h = harness();
    let app = app!(h);
    test::call_service(&app, post("/auth/v1/register", &registration()).to_request()).await;

    let mail = h.mailer.last_to("a@b.com").unwrap();
    let link = mail
        .text
        .split_whitespace()
        .find(|word| word.contains("/auth/v1/verify?"))
        .unwrap();
    let path = link.strip_prefix("https://app.example.com").unwrap();

    let req = test::TestRequest::get().uri(path).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert!(h.store.get("a@b.com").await.unwrap().is_verified());

    let req = test::TestRequest::get().uri(path).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_expired_verification_code() {
    let h = harness();
    let app = app!(h);
    test::call_service(&app, post("/auth/v1/register", &registration()).to_request()).await;
    let code = h.store.get("a@b.com").await.unwrap().verification_code.unwrap();

    h.clock.advance(Duration::hours(3));
    let verify = json!({"email": "a@b.com", "code": code});
    let resp = test::call_service(&app, post("/auth/v1/verify", &verify).to_request()).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_resend_does_not_enumerate() {
    let h = harness();
    let app = app!(h);
    test::call_service(&app, post("/auth/v1/register", &registration()).to_request()).await;

    let known = test::call_service(
        &app,
        post("/auth/v1/resend", &json!({"email": "a@b.com"})).to_request(),
    )
    .await;
    assert_eq!(known.status(), 202);
    let known_body: Value = test::read_body_json(known).await;

    let unknown = test::call_service(
        &app,
        post("/auth/v1/resend", &json!({"email": "x@b.com"})).to_request(),
    )
    .await;
    assert_eq!(unknown.status(), 202);
    let unknown_body: Value = test::read_body_json(unknown).await;

    assert_eq!(known_body, unknown_body);
    assert_eq!(h.mailer.sent().len(), 2);
}

#[actix_web::test]
async fn test_mail_failure_still_registers() {
    let h = harness_with(MemoryMailer::failing());
    let app = app!(h);

    let resp = test::call_service(
        &app,
        post("/auth/v1/register", &registration()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["email_sent"], false);
    assert!(h.store.get("a@b.com").await.is_some());
}

#[actix_web::test]
async fn test_user_requires_valid_token() {
    let h = harness();
    let app = app!(h);
    test::call_service(&app, post("/auth/v1/register", &registration()).to_request()).await;

    let req = test::TestRequest::get().uri("/auth/v1/user").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/auth/v1/user")
        .insert_header(("Authorization", "Bearer not.a.token"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let login = json!({"email": "a@b.com", "password": "password1"});
    let resp = test::call_service(&app, post("/auth/v1/login", &login).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    let token = body["access_token"].as_str().unwrap().to_string();

    h.clock.advance(Duration::seconds(900));
    let req = test::TestRequest::get()
        .uri("/auth/v1/user")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn test_health() {
    let h = harness();
    let app = app!(h);

    let req = test::TestRequest::get().uri("/auth/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
}
