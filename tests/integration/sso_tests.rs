//! SSO proxy-header authentication, including the duplicate-email guard.

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::Value;

use verdict_auth::db::{GroupStore, UserStore};

use crate::helpers::TestContext;

const LOGIN_HEADER: &str = "x-forwarded-login";
const NAME_HEADER: &str = "x-forwarded-name";
const EMAIL_HEADER: &str = "x-forwarded-email";
const GROUPS_HEADER: &str = "x-forwarded-groups";

#[actix_rt::test]
async fn proxy_headers_provision_and_authenticate() {
    let ctx = TestContext::with_sso();
    ctx.store.add_group("auditors", false);
    let app = test_app!(ctx).await;

    let req = test::TestRequest::get()
        .uri("/api/authentication/validate")
        .insert_header((LOGIN_HEADER, "jdoe"))
        .insert_header((NAME_HEADER, "Jane Doe"))
        .insert_header((EMAIL_HEADER, "jane@example.com"))
        .insert_header((GROUPS_HEADER, "auditors"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["valid"], true);

    assert_eq!(ctx.store.user_count(), 1);
    let user = ctx
        .store
        .find_by_external_login_and_provider("jdoe", "sso")
        .await
        .unwrap()
        .unwrap();
    let groups = ctx.store.group_names_of_user(user.id).await.unwrap();
    assert!(groups.contains("auditors"));
}

#[actix_rt::test]
async fn second_identity_with_same_email_is_a_conflict() {
    let ctx = TestContext::with_sso();
    let app = test_app!(ctx).await;

    let req = test::TestRequest::get()
        .uri("/api/authentication/validate")
        .insert_header((LOGIN_HEADER, "jdoe"))
        .insert_header((EMAIL_HEADER, "shared@example.com"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // A different provider login asserting the same email must not silently
    // take over the account.
    let req = test::TestRequest::get()
        .uri("/api/authentication/validate")
        .insert_header((LOGIN_HEADER, "intruder"))
        .insert_header((EMAIL_HEADER, "shared@example.com"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    // The public message names no account.
    assert_eq!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("shared@example.com"),
        false
    );
    assert_eq!(ctx.store.user_count(), 1);
}

#[actix_rt::test]
async fn sso_headers_are_ignored_when_disabled() {
    let ctx = TestContext::new();
    let app = test_app!(ctx).await;

    let req = test::TestRequest::get()
        .uri("/api/authentication/validate")
        .insert_header((LOGIN_HEADER, "jdoe"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["valid"], false);
    assert_eq!(ctx.store.user_count(), 0);
}
