//! Login, validate and logout over the HTTP surface.

use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::Value;
use uuid::Uuid;

use verdict_auth::db::{SessionStore, UserStore};

use crate::helpers::TestContext;

const SESSION_COOKIE: &str = "VERDICT_SESSION";
const CSRF_COOKIE: &str = "XSRF-TOKEN";

fn login_form(login: &str, password: &str) -> Vec<(String, String)> {
    vec![
        ("login".to_string(), login.to_string()),
        ("password".to_string(), password.to_string()),
    ]
}

fn response_cookie<B>(
    resp: &actix_web::dev::ServiceResponse<B>,
    name: &str,
) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == name)
        .map(|c| c.into_owned())
}

#[actix_rt::test]
async fn login_issues_session_cookie_bound_to_a_db_row() {
    let ctx = TestContext::new();
    let alice = ctx.seed_local_user("alice", "correct").await;
    let app = test_app!(ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/authentication/login")
        .set_form(login_form("alice", "correct"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let session_cookie = response_cookie(&resp, SESSION_COOKIE).expect("session cookie");
    assert!(response_cookie(&resp, CSRF_COOKIE).is_some());

    // The signed cookie references alice and a live session row with the
    // same expiration.
    let claims = ctx
        .codec
        .decode(session_cookie.value())
        .unwrap()
        .expect("cookie decodes");
    assert_eq!(claims.sub.as_deref(), Some(alice.id.to_string().as_str()));

    let session_id = Uuid::parse_str(claims.jti.as_deref().unwrap()).unwrap();
    let row = ctx.store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(row.user_id, alice.id);
    assert_eq!(row.expires_at.timestamp(), claims.exp.unwrap());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["login"], "alice");
    assert_eq!(body["requires_password_reset"], false);
}

#[actix_rt::test]
async fn login_with_wrong_password_is_rejected_without_detail() {
    let ctx = TestContext::new();
    ctx.seed_local_user("alice", "correct").await;
    let app = test_app!(ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/authentication/login")
        .set_form(login_form("alice", "wrong"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Authentication failed");
}

#[actix_rt::test]
async fn unknown_login_and_wrong_password_yield_identical_responses() {
    let ctx = TestContext::new();
    ctx.seed_local_user("alice", "correct").await;
    let app = test_app!(ctx).await;

    let mut bodies = Vec::new();
    for (login, password) in [("alice", "wrong"), ("ghost", "wrong")] {
        let req = test::TestRequest::post()
            .uri("/api/authentication/login")
            .set_form(login_form(login, password))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        bodies.push(test::read_body(resp).await);
    }
    // No leak of "account exists" through the response body.
    assert_eq!(bodies[0], bodies[1]);
}

#[actix_rt::test]
async fn validate_reflects_session_state() {
    let ctx = TestContext::new();
    ctx.seed_local_user("alice", "correct").await;
    let app = test_app!(ctx).await;

    let req = test::TestRequest::get()
        .uri("/api/authentication/validate")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["valid"], false);

    let login = test::TestRequest::post()
        .uri("/api/authentication/login")
        .set_form(login_form("alice", "correct"))
        .to_request();
    let login_resp = test::call_service(&app, login).await;
    let session_cookie = response_cookie(&login_resp, SESSION_COOKIE).unwrap();

    let req = test::TestRequest::get()
        .uri("/api/authentication/validate")
        .cookie(session_cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["valid"], true);
}

#[actix_rt::test]
async fn logout_deletes_the_row_and_expires_cookies() {
    let ctx = TestContext::new();
    ctx.seed_local_user("alice", "correct").await;
    let app = test_app!(ctx).await;

    let login = test::TestRequest::post()
        .uri("/api/authentication/login")
        .set_form(login_form("alice", "correct"))
        .to_request();
    let login_resp = test::call_service(&app, login).await;
    let session_cookie = response_cookie(&login_resp, SESSION_COOKIE).unwrap();
    assert_eq!(ctx.store.session_count(), 1);

    let req = test::TestRequest::post()
        .uri("/api/authentication/logout")
        .cookie(session_cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(ctx.store.session_count(), 0);

    let cleared = response_cookie(&resp, SESSION_COOKIE).unwrap();
    assert!(cleared.value().is_empty());

    // The old cookie no longer validates.
    let req = test::TestRequest::get()
        .uri("/api/authentication/validate")
        .cookie(session_cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["valid"], false);
}

#[actix_rt::test]
async fn reset_password_flag_is_reported_on_login() {
    let ctx = TestContext::new();
    let mut admin = ctx.seed_local_user("admin", "admin").await;
    admin.reset_password = true;
    ctx.store.update_user(&admin).await.unwrap();
    let app = test_app!(ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/authentication/login")
        .set_form(login_form("admin", "admin"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["requires_password_reset"], true);
}

#[actix_rt::test]
async fn health_endpoint_is_anonymous() {
    let ctx = TestContext::new();
    let app = test_app!(ctx).await;

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
