#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use actix_web::{test, App};
use papyrus::auth::{create_jwt, Role};
use papyrus::captcha::HttpCaptchaVerifier;
use papyrus::clock::SystemClock;
use papyrus::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use papyrus::repo::inmem::InMemRepo;
use papyrus::repo::{CommentRepo, Repo};
use papyrus::{config, AppState, SecurityHeaders};
use serial_test::serial;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("PAPYRUS_DATA_DIR", tmp.path().to_str().unwrap());
}

fn admin_token() -> String {
    create_jwt("admin-1", vec![Role::Admin]).unwrap()
}
fn author_token() -> String {
    create_jwt("author-1", vec![Role::Author]).unwrap()
}

/// App with CAPTCHA required and a mock verifier service behind it.
async fn captcha_state(mock_uri: &str) -> (AppState, Arc<dyn Repo>) {
    let repo: Arc<dyn Repo> = Arc::new(InMemRepo::new());
    let verifier = HttpCaptchaVerifier::new(format!("{mock_uri}/siteverify"), "secret-key".into());
    let state = AppState {
        repo: repo.clone(),
        clock: Arc::new(SystemClock),
        captcha: Arc::new(verifier),
        rate_limiter: RateLimiterFacade::new(
            InMemoryRateLimiter::new(false),
            RateLimitConfig::from_env(),
        ),
    };
    (state, repo)
}

macro_rules! prepare_app {
    ($state:expr) => {{
        let app = test::init_service(
            App::new()
                .wrap(SecurityHeaders::from_env())
                .app_data(actix_web::web::Data::new($state))
                .configure(config),
        )
        .await;

        // require CAPTCHA site-wide
        let req = test::TestRequest::put()
            .uri("/api/v1/admin/settings")
            .insert_header(("Authorization", format!("Bearer {}", admin_token())))
            .set_json(serde_json::json!({"captcha_required": true}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        // published target content
        let req = test::TestRequest::post()
            .uri("/api/v1/content")
            .insert_header(("Authorization", format!("Bearer {}", author_token())))
            .set_json(serde_json::json!({
                "title": "Captcha Post",
                "body": "guarded",
                "status": "published"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let item: serde_json::Value =
            serde_json::from_slice(&test::read_body(resp).await).unwrap();
        (app, item["id"].as_str().unwrap().to_string())
    }};
}

#[actix_web::test]
#[serial]
async fn test_submission_without_captcha_token_is_rejected() {
    setup_env();
    let mock = MockServer::start().await;
    let (state, repo) = captcha_state(&mock.uri()).await;
    let (app, content_id) = prepare_app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/content/{content_id}/comments"))
        .set_json(serde_json::json!({
            "author_name": "Ivy",
            "author_email": "ivy@example.com",
            "body": "no token"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["error"], "CAPTCHA verification required");

    // nothing persisted
    let all = repo.list_comments_by_status(None).await.unwrap();
    assert!(all.is_empty());
}

#[actix_web::test]
#[serial]
async fn test_verified_captcha_admits_comment() {
    setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
        .expect(1)
        .mount(&mock)
        .await;

    let (state, _repo) = captcha_state(&mock.uri()).await;
    let (app, content_id) = prepare_app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/content/{content_id}/comments"))
        .set_json(serde_json::json!({
            "author_name": "Ivy",
            "author_email": "ivy@example.com",
            "body": "solved it",
            "captcha_token": "tok-123"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let comment: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(comment["status"], "pending");
}

#[actix_web::test]
#[serial]
async fn test_failed_verification_is_rejected() {
    setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false})),
        )
        .mount(&mock)
        .await;

    let (state, _repo) = captcha_state(&mock.uri()).await;
    let (app, content_id) = prepare_app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/content/{content_id}/comments"))
        .set_json(serde_json::json!({
            "author_name": "Ivy",
            "author_email": "ivy@example.com",
            "body": "bad token",
            "captcha_token": "tok-bogus"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
#[serial]
async fn test_unreachable_verifier_fails_closed() {
    setup_env();
    let mock = MockServer::start().await;
    // no mock registered for /siteverify: the verifier gets a 404
    let (state, _repo) = captcha_state(&mock.uri()).await;
    let (app, content_id) = prepare_app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/content/{content_id}/comments"))
        .set_json(serde_json::json!({
            "author_name": "Ivy",
            "author_email": "ivy@example.com",
            "body": "verifier down",
            "captcha_token": "tok-123"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}
