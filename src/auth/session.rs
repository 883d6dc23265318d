//! Browser session lifecycle: issue, validate, refresh, revoke.
//!
//! A session is a DB row plus a signed cookie referencing it; both carry an
//! expiration and both must be live for a request to pass. Validation lazily
//! extends the inactivity window at most once per refresh interval so that a
//! busy session does not cost one DB write per request.

use actix_web::HttpRequest;
use actix_web::cookie::Cookie;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::cookies::{
    SESSION_COOKIE, clear_session_cookie, request_is_secure, session_cookie,
};
use crate::auth::jwt::{SessionClaims, TokenCodec};
use crate::auth::csrf;
use crate::config::Config;
use crate::db::{SessionStore, SessionToken, Store, UserStore};
use crate::error::AppResult;
use crate::models::User;

/// A session cookie is re-signed at most once per this interval.
const SESSION_REFRESH_INTERVAL_MINUTES: i64 = 5;

/// Hard ceiling on a session's age measured from issuance; never extended by
/// refresh.
const MAX_SESSION_LIFETIME_DAYS: i64 = 90;

/// A freshly issued session: cookies to set plus the row that backs them.
pub struct IssuedSession {
    pub session_id: Uuid,
    pub token: String,
    pub cookies: Vec<Cookie<'static>>,
}

/// A validated inbound session. `cookies` is non-empty when the validation
/// pass refreshed the session and the response must re-set them.
pub struct ValidatedSession {
    pub user: User,
    pub session_id: Uuid,
    pub cookies: Vec<Cookie<'static>>,
}

/// Issues and validates browser sessions.
pub struct SessionManager {
    store: Arc<dyn Store>,
    codec: Arc<TokenCodec>,
    session_timeout: Duration,
    cookie_path: String,
    context_path: String,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>, codec: Arc<TokenCodec>, config: &Config) -> Self {
        Self {
            store,
            codec,
            session_timeout: config.session_timeout(),
            cookie_path: config.cookie_path().to_string(),
            context_path: config.context_path.clone(),
        }
    }

    /// Create the session row and matching signed cookie, with a fresh CSRF
    /// state in both the claims and its own cookie.
    pub async fn init_session(&self, req: &HttpRequest, user: &User) -> AppResult<IssuedSession> {
        let now = Utc::now();
        let expires_at = now + self.session_timeout;
        let session_id = Uuid::new_v4();
        let secure = request_is_secure(req);

        self.store
            .insert_session(SessionToken {
                id: session_id,
                user_id: user.id,
                expires_at,
                created_at: now,
            })
            .await?;

        let timeout_secs = self.session_timeout.num_seconds();
        let (state, csrf_cookie) =
            csrf::generate_state(timeout_secs, &self.cookie_path, secure);

        let mut claims = SessionClaims::new(
            session_id.to_string(),
            user.id.to_string(),
            now.timestamp(),
            expires_at.timestamp(),
        );
        claims.xsrf_token = Some(state);

        let token = self.codec.encode(&claims)?;
        let cookie = session_cookie(token.clone(), timeout_secs, &self.cookie_path, secure);

        Ok(IssuedSession {
            session_id,
            token,
            cookies: vec![cookie, csrf_cookie],
        })
    }

    /// Validate the inbound session cookie.
    ///
    /// `Ok(None)` when there is no usable session (no cookie, undecodable or
    /// expired token, dead row, over-age session, inactive user); an error
    /// only when a method applied and failed, e.g. wrong CSRF state.
    pub async fn validate(&self, req: &HttpRequest) -> AppResult<Option<ValidatedSession>> {
        let Some(cookie) = req.cookie(SESSION_COOKIE) else {
            return Ok(None);
        };

        let Some(claims) = self.codec.decode(cookie.value())? else {
            return Ok(None);
        };

        // Required claims are present after a successful decode; ill-formed
        // ids still count as an invalid token.
        let (Some(jti), Some(sub)) = (claims.jti.as_deref(), claims.sub.as_deref()) else {
            return Ok(None);
        };
        let (Ok(session_id), Ok(user_id)) = (Uuid::parse_str(jti), Uuid::parse_str(sub)) else {
            return Ok(None);
        };

        let Some(row) = self.store.find_session(session_id).await? else {
            return Ok(None);
        };
        if row.user_id != user_id {
            return Ok(None);
        }

        let now = Utc::now();
        // The cookie's own expiration was already checked by the decode; the
        // row expiration is independent and must hold too.
        if row.expires_at <= now {
            return Ok(None);
        }

        let issued_at = claims.iat.unwrap_or_default();
        if now.timestamp() - issued_at > Duration::days(MAX_SESSION_LIFETIME_DAYS).num_seconds() {
            return Ok(None);
        }

        csrf::verify_state(req, claims.xsrf_token.as_deref(), &self.context_path)
            .map_err(|e| e.with_login(sub.to_string()))?;

        let Some(user) = self.store.find_by_id(user_id).await? else {
            return Ok(None);
        };
        if !user.active {
            return Ok(None);
        }

        let cookies = self.refresh_if_due(req, &claims, session_id, now).await?;

        Ok(Some(ValidatedSession {
            user,
            session_id,
            cookies,
        }))
    }

    /// Extend the inactivity window when the last refresh is old enough.
    async fn refresh_if_due(
        &self,
        req: &HttpRequest,
        claims: &SessionClaims,
        session_id: Uuid,
        now: chrono::DateTime<Utc>,
    ) -> AppResult<Vec<Cookie<'static>>> {
        let now_millis = now.timestamp_millis();
        let last_refresh = claims.last_refresh_time.unwrap_or(0);
        let interval_millis =
            Duration::minutes(SESSION_REFRESH_INTERVAL_MINUTES).num_milliseconds();
        if now_millis - last_refresh <= interval_millis {
            return Ok(Vec::new());
        }

        let expires_at = now + self.session_timeout;
        self.store
            .update_session_expiration(session_id, expires_at)
            .await?;

        let token = self
            .codec
            .refresh(claims, expires_at.timestamp(), now_millis)?;

        let secure = request_is_secure(req);
        let timeout_secs = self.session_timeout.num_seconds();
        let mut cookies = vec![session_cookie(
            token,
            timeout_secs,
            &self.cookie_path,
            secure,
        )];
        if let Some(state) = claims.xsrf_token.as_deref() {
            cookies.push(csrf::refresh_state(
                state,
                timeout_secs,
                &self.cookie_path,
                secure,
            ));
        }
        Ok(cookies)
    }

    /// Delete the session row and expire both cookies.
    pub async fn revoke(&self, req: &HttpRequest) -> AppResult<Vec<Cookie<'static>>> {
        if let Some(cookie) = req.cookie(SESSION_COOKIE)
            && let Ok(Some(claims)) = self.codec.decode(cookie.value())
            && let Some(jti) = claims.jti.as_deref()
            && let Ok(session_id) = Uuid::parse_str(jti)
        {
            self.store.delete_session(session_id).await?;
        }

        let secure = request_is_secure(req);
        Ok(vec![
            clear_session_cookie(&self.cookie_path, secure),
            csrf::remove_state(&self.cookie_path, secure),
        ])
    }
}
