//! Password hashing with pluggable algorithms and upgrade-in-place.
//!
//! Two algorithms exist as a closed enum: bcrypt is the legacy scheme still
//! found on old rows (cost factor and salt embedded in the stored value), and
//! PBKDF2-HMAC-SHA512 is the current default (iteration count embedded as a
//! digest prefix, per-user random salt stored alongside). Verification picks
//! the algorithm from the stored method column and reports whether the stored
//! hash should be regenerated with current parameters; persisting the upgrade
//! is the caller's job.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::Sha512;
use std::sync::atomic::{AtomicU64, Ordering};
use subtle::ConstantTimeEq;

/// Random salt length for PBKDF2, in bytes.
const SALT_LEN: usize = 20;
/// Derived key length for PBKDF2, in bytes.
const KEY_LEN: usize = 64;
/// Separates the iteration count from the encoded key in the stored digest.
const DIGEST_DELIMITER: char = '$';
/// Password length used for enumeration-defense computations.
const DUMMY_PASSWORD_LEN: usize = 15;

/// Supported password hashing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMethod {
    /// Legacy adaptive hash; salt and cost live inside the stored value.
    Bcrypt,
    /// Current default keyed derivation.
    Pbkdf2,
}

impl HashMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BCRYPT" => Some(Self::Bcrypt),
            "PBKDF2" => Some(Self::Pbkdf2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bcrypt => "BCRYPT",
            Self::Pbkdf2 => "PBKDF2",
        }
    }
}

/// A freshly computed hash, ready to be stored on the user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedCredential {
    pub method: HashMethod,
    pub digest: String,
    pub salt: Option<String>,
}

/// Successful verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// The stored hash does not match current defaults and should be
    /// regenerated now that the cleartext is known to be correct.
    pub needs_rehash: bool,
}

/// Why a credential check failed. None of these reach the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("no password hash stored on the account")]
    MissingDigest,
    #[error("no salt stored on the account")]
    MissingSalt,
    #[error("unknown hash method '{0}'")]
    UnknownMethod(String),
    #[error("wrong password")]
    WrongPassword,
}

/// Hashes and verifies passwords; one instance per process.
pub struct CredentialHasher {
    iterations: u32,
    derivations: AtomicU64,
}

impl CredentialHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations,
            derivations: AtomicU64::new(0),
        }
    }

    /// Hash a password with the current default algorithm and parameters.
    pub fn hash(&self, password: &str) -> HashedCredential {
        let salt: [u8; SALT_LEN] = rand::random();
        let digest = self.pbkdf2_digest(password, &salt, self.iterations);
        HashedCredential {
            method: HashMethod::Pbkdf2,
            digest,
            salt: Some(STANDARD.encode(salt)),
        }
    }

    /// Verify a candidate password against the stored hash fields.
    ///
    /// The algorithm is selected from the stored method; a missing or unknown
    /// method is an ordinary failure, indistinguishable from a wrong password
    /// once it crosses the module boundary.
    pub fn verify(
        &self,
        method: Option<&str>,
        digest: Option<&str>,
        salt: Option<&str>,
        candidate: &str,
    ) -> Result<Verification, CredentialError> {
        let method_str = method.ok_or_else(|| CredentialError::UnknownMethod("none".to_string()))?;
        let method = HashMethod::parse(method_str)
            .ok_or_else(|| CredentialError::UnknownMethod(method_str.to_string()))?;
        let digest = digest.ok_or(CredentialError::MissingDigest)?;

        match method {
            HashMethod::Bcrypt => self.verify_bcrypt(digest, candidate),
            HashMethod::Pbkdf2 => {
                let salt = salt.ok_or(CredentialError::MissingSalt)?;
                self.verify_pbkdf2(digest, salt, candidate)
            }
        }
    }

    /// Burn the same work as a real verification.
    ///
    /// Called on paths that would otherwise return early (unknown login,
    /// non-local account) so that their cost matches a genuine wrong-password
    /// check.
    pub fn defend_against_enumeration(&self) {
        let salt: [u8; SALT_LEN] = rand::random();
        let password: [u8; DUMMY_PASSWORD_LEN] = rand::random();
        let _ = self.pbkdf2_digest(&hex::encode(password), &salt, self.iterations);
    }

    /// Number of key derivations performed by this instance.
    pub fn derivation_count(&self) -> u64 {
        self.derivations.load(Ordering::Relaxed)
    }

    fn verify_bcrypt(
        &self,
        digest: &str,
        candidate: &str,
    ) -> Result<Verification, CredentialError> {
        self.derivations.fetch_add(1, Ordering::Relaxed);
        match bcrypt::verify(candidate, digest) {
            // A bcrypt match always needs a rehash to the current default.
            Ok(true) => Ok(Verification { needs_rehash: true }),
            Ok(false) | Err(_) => Err(CredentialError::WrongPassword),
        }
    }

    fn verify_pbkdf2(
        &self,
        digest: &str,
        salt: &str,
        candidate: &str,
    ) -> Result<Verification, CredentialError> {
        let Some((iterations_str, stored_key)) = digest.split_once(DIGEST_DELIMITER) else {
            return Err(CredentialError::WrongPassword);
        };
        let Ok(stored_iterations) = iterations_str.parse::<u32>() else {
            return Err(CredentialError::WrongPassword);
        };
        let Ok(salt_bytes) = STANDARD.decode(salt) else {
            return Err(CredentialError::WrongPassword);
        };

        let computed = self.pbkdf2_digest_raw(candidate, &salt_bytes, stored_iterations);
        let Ok(stored_bytes) = STANDARD.decode(stored_key) else {
            return Err(CredentialError::WrongPassword);
        };

        if bool::from(computed.ct_eq(stored_bytes.as_slice())) {
            Ok(Verification {
                needs_rehash: stored_iterations != self.iterations,
            })
        } else {
            Err(CredentialError::WrongPassword)
        }
    }

    fn pbkdf2_digest(&self, password: &str, salt: &[u8], iterations: u32) -> String {
        let key = self.pbkdf2_digest_raw(password, salt, iterations);
        format!(
            "{}{}{}",
            iterations,
            DIGEST_DELIMITER,
            STANDARD.encode(key)
        )
    }

    fn pbkdf2_digest_raw(&self, password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
        self.derivations.fetch_add(1, Ordering::Relaxed);
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, iterations, &mut key);
        key
    }
}
