//! Anti-forgery state tied to the session.
//!
//! The state lives in two places: a script-readable cookie and a claim inside
//! the signed session token. Mutating API calls must echo the cookie value in
//! the `X-XSRF-TOKEN` header; the header is compared against the claim.

use actix_web::HttpRequest;
use actix_web::cookie::Cookie;
use actix_web::http::Method as HttpMethod;

use crate::auth::cookies::{CSRF_HEADER, clear_csrf_cookie, csrf_cookie};
use crate::auth::{AuthError, Source};

/// Only paths under this prefix (after stripping the context path) are
/// subject to CSRF verification.
const API_PREFIX: &str = "/api";

/// Generate a fresh state value and its cookie.
pub fn generate_state(
    timeout_secs: i64,
    path: &str,
    secure: bool,
) -> (String, Cookie<'static>) {
    let state = hex::encode(rand::random::<[u8; 16]>());
    let cookie = csrf_cookie(state.clone(), timeout_secs, path, secure);
    (state, cookie)
}

/// Re-issue the cookie for an existing state (on session refresh).
pub fn refresh_state(
    state: &str,
    timeout_secs: i64,
    path: &str,
    secure: bool,
) -> Cookie<'static> {
    csrf_cookie(state.to_string(), timeout_secs, path, secure)
}

/// Expire the state cookie (on logout).
pub fn remove_state(path: &str, secure: bool) -> Cookie<'static> {
    clear_csrf_cookie(path, secure)
}

/// Verify the request's CSRF state against the reference value carried by
/// the session token claims.
///
/// A no-op for requests that cannot mutate state: anything but POST/PUT/
/// DELETE, and any path outside the API prefix.
pub fn verify_state(
    req: &HttpRequest,
    reference: Option<&str>,
    context_path: &str,
) -> Result<(), AuthError> {
    if !should_verify(req.method(), req.path(), context_path) {
        return Ok(());
    }

    let reference = match reference {
        Some(value) if !value.is_empty() => value,
        _ => {
            return Err(AuthError::new(
                Source::jwt(),
                "Missing reference CSRF value",
            ));
        }
    };

    let header = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if header != reference {
        return Err(AuthError::new(Source::jwt(), "Wrong CSRF state in request"));
    }

    Ok(())
}

fn should_verify(method: &HttpMethod, path: &str, context_path: &str) -> bool {
    let mutating =
        *method == HttpMethod::POST || *method == HttpMethod::PUT || *method == HttpMethod::DELETE;
    if !mutating {
        return false;
    }
    path.strip_prefix(context_path)
        .unwrap_or(path)
        .starts_with(API_PREFIX)
}
