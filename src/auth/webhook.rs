//! GitHub webhook signature authentication.
//!
//! Inbound webhook calls carry the target app id and an HMAC-SHA256 of the
//! exact request body, computed with the secret provisioned for that app.
//! A valid signature authenticates the call as a pseudo-identity; no user
//! row is involved.

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::auth::{AuthError, Source};
use crate::db::{Store, WebhookSecretStore};
use crate::error::AppResult;
use crate::models::UserAuthResult;

/// Identifies the GitHub app installation the event targets; its presence
/// commits the request to this authentication path.
pub const GITHUB_APP_ID_HEADER: &str = "x-github-hook-installation-target-id";
/// Carries the payload signature, prefixed with the digest name.
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Fixed prefix of the signature header value.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Message for any signature that does not verify.
pub const MSG_AUTHENTICATION_FAILED: &str = "Failed to authenticate payload from Github webhook";

/// Verifies webhook signatures against per-app secrets.
pub struct GithubWebhookAuthenticator {
    store: Arc<dyn Store>,
}

impl GithubWebhookAuthenticator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Authenticate a request as a GitHub webhook call.
    ///
    /// `Ok(None)` when the app id header is absent - the path simply does not
    /// apply. Once the header is present every defect (missing signature,
    /// unprovisioned secret, missing body, bad signature) is a failure.
    pub async fn authenticate(
        &self,
        req: &HttpRequest,
        body: Option<&[u8]>,
    ) -> AppResult<Option<UserAuthResult>> {
        let Some(app_id) = header(req, GITHUB_APP_ID_HEADER) else {
            return Ok(None);
        };

        let Some(signature) = header(req, GITHUB_SIGNATURE_HEADER) else {
            let message =
                format!("Unauthenticated requests from the Github webhook of app {app_id} are forbidden");
            return Err(AuthError::new(Source::github_webhook(), message.clone())
                .with_public_message(message)
                .into());
        };

        let Some(secret) = self.store.webhook_secret(&app_id).await? else {
            return Err(AuthError::new(
                Source::github_webhook(),
                format!("Webhook secret for your Github app with id {app_id} is missing"),
            )
            .with_public_message(format!("Webhook secret for app {app_id} is not configured"))
            .into());
        };

        let body = match body {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                return Err(AuthError::new(
                    Source::github_webhook(),
                    "No body found in Github webhook event",
                )
                .with_public_message(MSG_AUTHENTICATION_FAILED)
                .into());
            }
        };

        let expected = compute_signature(secret.expose_secret(), body);
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(AuthError::new(Source::github_webhook(), MSG_AUTHENTICATION_FAILED)
                .with_public_message(MSG_AUTHENTICATION_FAILED)
                .into());
        }

        Ok(Some(UserAuthResult::GithubWebhook))
    }
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `sha256=<hex HMAC-SHA256(body)>`, exactly as GitHub computes it.
fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Length leaks nothing here (signatures are fixed-size); content must not.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use actix_web::test::TestRequest;
    use crate::error::AppError;

    const APP_ID: &str = "42";
    const SECRET: &str = "webhook-secret";
    const PAYLOAD: &[u8] = br#"{"action":"closed_by_user","alert":{"number":2}}"#;

    fn authenticator(provisioned: bool) -> GithubWebhookAuthenticator {
        let store = Arc::new(MemoryStore::new());
        if provisioned {
            store.set_webhook_secret(APP_ID, SECRET);
        }
        GithubWebhookAuthenticator::new(store)
    }

    fn request(app_id: Option<&str>, signature: Option<&str>) -> HttpRequest {
        let mut req = TestRequest::post().uri("/api/github_webhook");
        if let Some(id) = app_id {
            req = req.insert_header((GITHUB_APP_ID_HEADER, id));
        }
        if let Some(sig) = signature {
            req = req.insert_header((GITHUB_SIGNATURE_HEADER, sig));
        }
        req.to_http_request()
    }

    fn failure_message(result: AppResult<Option<UserAuthResult>>) -> String {
        match result {
            Err(AppError::Authentication(err)) => err.message().to_string(),
            other => panic!("expected authentication failure, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn valid_signature_authenticates_as_pseudo_identity() {
        let auth = authenticator(true);
        let signature = compute_signature(SECRET, PAYLOAD);
        let req = request(Some(APP_ID), Some(&signature));

        let result = auth.authenticate(&req, Some(PAYLOAD)).await.unwrap();
        assert!(matches!(result, Some(UserAuthResult::GithubWebhook)));
    }

    #[tokio::test]
    async fn absent_app_id_header_does_not_apply() {
        let auth = authenticator(true);
        let req = request(None, None);
        let result = auth.authenticate(&req, Some(PAYLOAD)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn missing_signature_header_is_a_hard_failure() {
        let auth = authenticator(true);
        let req = request(Some(APP_ID), None);
        let message = failure_message(auth.authenticate(&req, Some(PAYLOAD)).await);
        assert!(message.contains("app 42"));
    }

    #[tokio::test]
    async fn unprovisioned_secret_is_a_configuration_failure() {
        let auth = authenticator(false);
        let signature = compute_signature(SECRET, PAYLOAD);
        let req = request(Some(APP_ID), Some(&signature));
        let message = failure_message(auth.authenticate(&req, Some(PAYLOAD)).await);
        assert_eq!(
            message,
            "Webhook secret for your Github app with id 42 is missing"
        );
    }

    #[tokio::test]
    async fn missing_body_is_a_failure() {
        let auth = authenticator(true);
        let signature = compute_signature(SECRET, PAYLOAD);
        let req = request(Some(APP_ID), Some(&signature));
        let message = failure_message(auth.authenticate(&req, None).await);
        assert_eq!(message, "No body found in Github webhook event");
        let req = request(Some(APP_ID), Some(&signature));
        let message = failure_message(auth.authenticate(&req, Some(b"")).await);
        assert_eq!(message, "No body found in Github webhook event");
    }

    #[tokio::test]
    async fn any_flipped_byte_fails_verification() {
        let auth = authenticator(true);
        let signature = compute_signature(SECRET, PAYLOAD);
        let mut tampered = PAYLOAD.to_vec();
        tampered[10] ^= 0x01;

        let req = request(Some(APP_ID), Some(&signature));
        let message = failure_message(auth.authenticate(&req, Some(&tampered)).await);
        assert_eq!(message, MSG_AUTHENTICATION_FAILED);
    }

    #[tokio::test]
    async fn wrong_secret_fails_verification() {
        let auth = authenticator(true);
        let signature = compute_signature("not-the-secret", PAYLOAD);
        let req = request(Some(APP_ID), Some(&signature));
        let message = failure_message(auth.authenticate(&req, Some(PAYLOAD)).await);
        assert_eq!(message, MSG_AUTHENTICATION_FAILED);
    }

    #[test]
    fn signature_has_the_fixed_prefix() {
        let signature = compute_signature(SECRET, PAYLOAD);
        assert!(signature.starts_with(SIGNATURE_PREFIX));
        assert_eq!(signature.len(), SIGNATURE_PREFIX.len() + 64);
    }
}
