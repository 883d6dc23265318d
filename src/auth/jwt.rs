//! Signing and verification of the session cookie payload.
//!
//! The codec owns the process-wide HS256 secret: generated at startup when
//! none is configured, cleared at shutdown. Using the codec outside that
//! window is a programming error and panics; it is never silently skipped.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::auth::{AuthError, Source};
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Claims carried by the signed session cookie.
///
/// `jti`, `sub`, `iat` and `exp` are mandatory on every token this codec
/// accepts; a decoded token missing any of them is treated as invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(rename = "lastRefreshTime", skip_serializing_if = "Option::is_none")]
    pub last_refresh_time: Option<i64>,
    #[serde(rename = "xsrfToken", skip_serializing_if = "Option::is_none")]
    pub xsrf_token: Option<String>,
    /// Arbitrary caller-supplied properties, preserved across refreshes.
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl SessionClaims {
    pub fn new(session_id: String, user_id: String, issued_at: i64, expires_at: i64) -> Self {
        Self {
            jti: Some(session_id),
            sub: Some(user_id),
            iat: Some(issued_at),
            exp: Some(expires_at),
            last_refresh_time: Some(issued_at * 1000),
            xsrf_token: None,
            properties: serde_json::Map::new(),
        }
    }
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Process-wide session token codec. Init once, use many, clear at shutdown.
pub struct TokenCodec {
    keys: RwLock<Option<Keys>>,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCodec {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(None),
        }
    }

    /// Install the signing secret: the configured base64 value, or 32 fresh
    /// random bytes when none is configured.
    pub fn start(&self, config: &Config) -> AppResult<()> {
        let secret = match &config.auth_secret {
            Some(configured) => STANDARD
                .decode(configured.expose_secret())
                .map_err(|_| {
                    AppError::InvalidInput(
                        "VERDICT_AUTH_SECRET must be valid base64".to_string(),
                    )
                })?,
            None => rand::random::<[u8; 32]>().to_vec(),
        };

        let mut guard = self.keys.write().unwrap();
        *guard = Some(Keys {
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
        });
        Ok(())
    }

    /// Drop the signing secret. Outstanding cookies become undecodable.
    pub fn stop(&self) {
        let mut guard = self.keys.write().unwrap();
        *guard = None;
    }

    /// Sign session claims into the compact wire form.
    pub fn encode(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        let guard = self.keys.read().unwrap();
        let keys = guard
            .as_ref()
            .expect("session token codec used before initialization");
        encode(&Header::default(), claims, &keys.encoding).map_err(|e| {
            AuthError::new(Source::jwt(), format!("Failed to sign session token: {e}"))
        })
    }

    /// Decode and verify a token.
    ///
    /// Expired, malformed and badly signed tokens are expected traffic and
    /// come back as `Ok(None)`. Anything else is an authentication failure
    /// carrying whatever subject the unverified payload reveals.
    pub fn decode(&self, token: &str) -> Result<Option<SessionClaims>, AuthError> {
        let guard = self.keys.read().unwrap();
        let keys = guard
            .as_ref()
            .expect("session token codec used before initialization");

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = 0;

        match decode::<SessionClaims>(token, &keys.decoding, &validation) {
            Ok(data) => {
                let claims = data.claims;
                if claims.jti.is_none()
                    || claims.sub.is_none()
                    || claims.iat.is_none()
                    || claims.exp.is_none()
                {
                    return Ok(None);
                }
                Ok(Some(claims))
            }
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature
                | ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::MissingRequiredClaim(_) => Ok(None),
                _ => {
                    // Tokens whose payload does not even parse are ordinary
                    // invalid traffic. A structurally sound token failing for
                    // any other reason is surfaced, with whatever subject the
                    // unverified payload reveals.
                    let Some(payload) = recover_payload(token) else {
                        return Ok(None);
                    };
                    let mut auth_err = AuthError::new(
                        Source::jwt(),
                        format!("Failed to decode session token: {err}"),
                    );
                    if let Some(subject) = payload.get("sub").and_then(|s| s.as_str()) {
                        auth_err = auth_err.with_login(subject.to_string());
                    }
                    Err(auth_err)
                }
            },
        }
    }

    /// Re-sign claims with a new expiration, stamping the refresh time.
    pub fn refresh(
        &self,
        claims: &SessionClaims,
        expires_at: i64,
        now_millis: i64,
    ) -> Result<String, AuthError> {
        let mut refreshed = claims.clone();
        refreshed.exp = Some(expires_at);
        refreshed.last_refresh_time = Some(now_millis);
        self.encode(&refreshed)
    }
}

/// Best-effort unverified payload parse, for the log line attached to
/// unexpected decode failures.
fn recover_payload(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Environment, GitHubOAuthSettings};
    use chrono::Utc;

    fn test_config() -> Config {
        Config {
            environment: Environment::Development,
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: String::new(),
            context_path: String::new(),
            auth_secret: None,
            session_timeout_minutes: 4320,
            pbkdf2_iterations: 1,
            force_password_reset_redirect: true,
            sso_enabled: false,
            managed_instance: false,
            session_sweep_interval_secs: 60,
            github_oauth: GitHubOAuthSettings {
                enabled: false,
                client_id: None,
                client_secret: None,
                allow_signup: true,
                redirect_url: None,
            },
        }
    }

    fn started_codec() -> TokenCodec {
        let codec = TokenCodec::new();
        codec.start(&test_config()).unwrap();
        codec
    }

    fn live_claims() -> SessionClaims {
        let now = Utc::now().timestamp();
        SessionClaims::new(
            "session-1".to_string(),
            "user-1".to_string(),
            now,
            now + 600,
        )
    }

    #[test]
    fn encode_decode_round_trip() {
        let codec = started_codec();
        let mut claims = live_claims();
        claims.xsrf_token = Some("state".to_string());
        claims
            .properties
            .insert("channel".to_string(), serde_json::json!("web"));

        let token = codec.encode(&claims).unwrap();
        let decoded = codec.decode(&token).unwrap().expect("token should decode");

        assert_eq!(decoded.jti.as_deref(), Some("session-1"));
        assert_eq!(decoded.sub.as_deref(), Some("user-1"));
        assert_eq!(decoded.exp, claims.exp);
        assert_eq!(decoded.iat, claims.iat);
        assert_eq!(decoded.xsrf_token.as_deref(), Some("state"));
        assert_eq!(
            decoded.properties.get("channel"),
            Some(&serde_json::json!("web"))
        );
    }

    #[test]
    fn expired_token_decodes_to_absent() {
        let codec = started_codec();
        let now = Utc::now().timestamp();
        let claims =
            SessionClaims::new("session-1".to_string(), "user-1".to_string(), now - 600, now - 120);

        let token = codec.encode(&claims).unwrap();
        assert!(codec.decode(&token).unwrap().is_none());
    }

    #[test]
    fn garbage_and_tampered_tokens_decode_to_absent() {
        let codec = started_codec();
        assert!(codec.decode("not-a-token").unwrap().is_none());

        let token = codec.encode(&live_claims()).unwrap();
        let tampered = format!("{}x", token);
        assert!(codec.decode(&tampered).unwrap().is_none());
    }

    #[test]
    fn token_signed_with_another_secret_decodes_to_absent() {
        let codec = started_codec();
        let other = started_codec();
        let token = other.encode(&live_claims()).unwrap();
        assert!(codec.decode(&token).unwrap().is_none());
    }

    #[test]
    fn token_missing_required_claims_decodes_to_absent() {
        let codec = started_codec();
        let mut claims = live_claims();
        claims.jti = None;
        let token = codec.encode(&claims).unwrap();
        assert!(codec.decode(&token).unwrap().is_none());
    }

    #[test]
    fn refresh_extends_expiration_and_stamps_refresh_time() {
        let codec = started_codec();
        let claims = live_claims();
        let token = codec.encode(&claims).unwrap();
        let decoded = codec.decode(&token).unwrap().unwrap();

        let new_exp = decoded.exp.unwrap() + 3600;
        let now_millis = Utc::now().timestamp_millis();
        let refreshed_token = codec.refresh(&decoded, new_exp, now_millis).unwrap();
        let refreshed = codec.decode(&refreshed_token).unwrap().unwrap();

        assert_eq!(refreshed.exp, Some(new_exp));
        assert_eq!(refreshed.last_refresh_time, Some(now_millis));
        assert_eq!(refreshed.jti, decoded.jti);
    }

    #[test]
    #[should_panic(expected = "used before initialization")]
    fn encode_before_start_is_a_usage_error() {
        let codec = TokenCodec::new();
        let _ = codec.encode(&live_claims());
    }

    #[test]
    fn stop_clears_the_secret() {
        let codec = started_codec();
        let token = codec.encode(&live_claims()).unwrap();
        codec.stop();
        codec.start(&test_config()).unwrap();
        // New secret: the old cookie no longer verifies.
        assert!(codec.decode(&token).unwrap().is_none());
    }

    #[test]
    fn recover_payload_reads_unverified_tokens() {
        let codec = started_codec();
        let token = codec.encode(&live_claims()).unwrap();
        let payload = recover_payload(&token).unwrap();
        assert_eq!(payload.get("sub").and_then(|s| s.as_str()), Some("user-1"));
        assert!(recover_payload("garbage").is_none());
    }
}
