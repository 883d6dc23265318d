//! Cookie builders shared by the session, CSRF and browser-flow code.

use actix_web::HttpRequest;
use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};

/// Signed session token cookie.
pub const SESSION_COOKIE: &str = "VERDICT_SESSION";
/// CSRF state cookie; readable by client script on purpose.
pub const CSRF_COOKIE: &str = "XSRF-TOKEN";
/// Header carrying the CSRF state back on mutating calls.
pub const CSRF_HEADER: &str = "X-XSRF-TOKEN";
/// Short-lived cookie telling the web UI why a browser flow failed.
pub const AUTH_ERROR_COOKIE: &str = "VERDICT_AUTHENTICATION_ERROR";
/// Lifetime of the auth-error cookie, in seconds.
pub const AUTH_ERROR_COOKIE_MAX_AGE_SECS: i64 = 5 * 60;

/// Whether the request reached us over HTTPS, directly or via a
/// forwarding proxy header.
pub fn request_is_secure(req: &HttpRequest) -> bool {
    req.connection_info().scheme() == "https"
}

fn base_cookie(
    name: &'static str,
    value: String,
    path: &str,
    secure: bool,
    http_only: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path(path.to_string());
    cookie.set_http_only(http_only);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie
}

/// Session cookie with the signed token.
pub fn session_cookie(
    value: String,
    max_age_secs: i64,
    path: &str,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = base_cookie(SESSION_COOKIE, value, path, secure, true);
    cookie.set_max_age(CookieDuration::seconds(max_age_secs));
    cookie
}

/// Expired session cookie, used on logout.
pub fn clear_session_cookie(path: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(SESSION_COOKIE, String::new(), path, secure, true);
    cookie.set_max_age(CookieDuration::ZERO);
    cookie
}

/// CSRF state cookie. Client script must be able to read it, so it is
/// deliberately not HttpOnly.
pub fn csrf_cookie(value: String, max_age_secs: i64, path: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(CSRF_COOKIE, value, path, secure, false);
    cookie.set_max_age(CookieDuration::seconds(max_age_secs));
    cookie
}

/// Expired CSRF cookie.
pub fn clear_csrf_cookie(path: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(CSRF_COOKIE, String::new(), path, secure, false);
    cookie.set_max_age(CookieDuration::ZERO);
    cookie
}

/// Short-lived cookie carrying a public failure message to the web UI.
///
/// The value is URL-encoded with "+" rewritten to "%20" so that
/// `decodeURIComponent` yields the original text.
pub fn auth_error_cookie(message: &str, path: &str, secure: bool) -> Cookie<'static> {
    let encoded = urlencoding::encode(message).replace('+', "%20");
    let mut cookie = base_cookie(AUTH_ERROR_COOKIE, encoded, path, secure, false);
    cookie.set_max_age(CookieDuration::seconds(AUTH_ERROR_COOKIE_MAX_AGE_SECS));
    cookie
}

/// Expired auth-error cookie, cleared once the UI consumed the message.
pub fn clear_auth_error_cookie(path: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(AUTH_ERROR_COOKIE, String::new(), path, secure, false);
    cookie.set_max_age(CookieDuration::ZERO);
    cookie
}
