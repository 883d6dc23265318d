//! End-to-end GitHub webhook authentication.

use actix_web::http::StatusCode;
use actix_web::test;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::helpers::TestContext;

const APP_ID_HEADER: &str = "x-github-hook-installation-target-id";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const APP_ID: &str = "42";
const SECRET: &str = "hook-secret-42";
const PAYLOAD: &str = r#"{"action":"closed_by_user","alert":{"number":2},"installation":{"id":42}}"#;

fn sign(secret: &str, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[actix_rt::test]
async fn correctly_signed_payload_is_accepted() {
    let ctx = TestContext::new();
    ctx.store.set_webhook_secret(APP_ID, SECRET);
    let app = test_app!(ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/github_webhook")
        .insert_header((APP_ID_HEADER, APP_ID))
        .insert_header((SIGNATURE_HEADER, sign(SECRET, PAYLOAD)))
        .set_payload(PAYLOAD)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_rt::test]
async fn tampered_payload_is_rejected_with_public_message() {
    let ctx = TestContext::new();
    ctx.store.set_webhook_secret(APP_ID, SECRET);
    let app = test_app!(ctx).await;

    let tampered = PAYLOAD.replace("closed_by_user", "reopened_by_user");
    let req = test::TestRequest::post()
        .uri("/api/github_webhook")
        .insert_header((APP_ID_HEADER, APP_ID))
        .insert_header((SIGNATURE_HEADER, sign(SECRET, PAYLOAD)))
        .set_payload(tampered)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["message"],
        "Failed to authenticate payload from Github webhook"
    );
}

#[actix_rt::test]
async fn signature_computed_with_wrong_secret_is_rejected() {
    let ctx = TestContext::new();
    ctx.store.set_webhook_secret(APP_ID, SECRET);
    let app = test_app!(ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/github_webhook")
        .insert_header((APP_ID_HEADER, APP_ID))
        .insert_header((SIGNATURE_HEADER, sign("other-secret", PAYLOAD)))
        .set_payload(PAYLOAD)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn unprovisioned_app_id_names_only_the_app_in_public() {
    let ctx = TestContext::new();
    let app = test_app!(ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/github_webhook")
        .insert_header((APP_ID_HEADER, "77"))
        .insert_header((SIGNATURE_HEADER, sign(SECRET, PAYLOAD)))
        .set_payload(PAYLOAD)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["message"],
        "Webhook secret for app 77 is not configured"
    );
}

#[actix_rt::test]
async fn missing_signature_header_is_rejected() {
    let ctx = TestContext::new();
    ctx.store.set_webhook_secret(APP_ID, SECRET);
    let app = test_app!(ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/github_webhook")
        .insert_header((APP_ID_HEADER, APP_ID))
        .set_payload(PAYLOAD)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn request_without_webhook_headers_is_not_a_delivery() {
    let ctx = TestContext::new();
    let app = test_app!(ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/github_webhook")
        .set_payload(PAYLOAD)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
