//! Token issuance and validation.
//!
//! A token is `salt-key-expiry`:
//!
//! - `salt` is 32 random bytes, hex encoded
//! - `key` is `hex(HKDF-SHA256(secret, salt, context || 0x00 || expiry))`, 32 bytes
//! - `expiry` is the absolute UNIX time in decimal digits
//!
//! The expiry is part of the HKDF info, so it cannot be changed without
//! invalidating the key. Nothing is stored server side; a token stays
//! replayable until it expires.

use crate::clock::{Clock, SystemClock};
use crate::error::{CsrfError, Result};
use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Minimum secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Minimum token time-to-live in seconds.
pub const MIN_TTL_SECONDS: i64 = 15;

/// Random salt length in bytes, before hex encoding.
pub const SALT_LEN: usize = 32;

/// Derived key length in bytes, before hex encoding.
pub const KEY_LEN: usize = 32;

/// Field separator of the wire format.
pub const DELIMITER: char = '-';

/// Why a token was rejected.
///
/// Meant for logs and telemetry. Clients should only ever see a uniform
/// rejection, see [`CsrfError::Rejected`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("No token")]
    EmptyToken,

    #[error("Invalid token")]
    MalformedToken,

    #[error("Invalid token expiry")]
    MalformedExpiry,

    #[error("Key mismatch")]
    KeyMismatch,

    #[error("Token expired")]
    Expired,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::EmptyToken => "empty_token",
            RejectReason::MalformedToken => "malformed_token",
            RejectReason::MalformedExpiry => "malformed_expiry",
            RejectReason::KeyMismatch => "key_mismatch",
            RejectReason::Expired => "expired",
        }
    }
}

/// Result of validating a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    Invalid(RejectReason),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid(reason) => Some(*reason),
        }
    }

    /// Convert into a `Result`, mapping any rejection to [`CsrfError::Rejected`].
    pub fn into_result(self) -> Result<()> {
        match self {
            ValidationOutcome::Valid => Ok(()),
            ValidationOutcome::Invalid(reason) => Err(CsrfError::Rejected(reason)),
        }
    }
}

impl From<std::result::Result<(), RejectReason>> for ValidationOutcome {
    fn from(result: std::result::Result<(), RejectReason>) -> Self {
        match result {
            Ok(()) => ValidationOutcome::Valid,
            Err(reason) => ValidationOutcome::Invalid(reason),
        }
    }
}

/// An issued CSRF token.
///
/// `Display` yields the wire form. `FromStr` only checks structure; use
/// [`validate`] to authenticate a token received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CsrfToken {
    salt: String,
    key: String,
    expires_at: i64,
}

impl CsrfToken {
    /// Hex encoded salt.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Hex encoded derived key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Expiry as a UNIX timestamp.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn expires_at_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.salt, self.key, self.expires_at
        )
    }
}

impl FromStr for CsrfToken {
    type Err = RejectReason;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let raw = RawToken::parse(s)?;
        Ok(Self {
            salt: raw.salt.to_string(),
            key: raw.key.to_string(),
            expires_at: raw.expires_at,
        })
    }
}

impl From<CsrfToken> for String {
    fn from(token: CsrfToken) -> Self {
        token.to_string()
    }
}

impl TryFrom<String> for CsrfToken {
    type Error = RejectReason;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Borrowed view of the three wire fields.
struct RawToken<'a> {
    salt: &'a str,
    key: &'a str,
    expiry: &'a str,
    expires_at: i64,
}

impl<'a> RawToken<'a> {
    fn parse(token: &'a str) -> std::result::Result<Self, RejectReason> {
        if token.is_empty() {
            return Err(RejectReason::EmptyToken);
        }

        let mut fields = token.split(DELIMITER);
        let (Some(salt), Some(key), Some(expiry), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(RejectReason::MalformedToken);
        };

        if salt.is_empty() || key.is_empty() || expiry.is_empty() {
            return Err(RejectReason::MalformedToken);
        }

        if !expiry.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RejectReason::MalformedExpiry);
        }

        // All digits but wider than i64.
        let expires_at = expiry
            .parse::<i64>()
            .map_err(|_| RejectReason::MalformedExpiry)?;

        Ok(Self {
            salt,
            key,
            expiry,
            expires_at,
        })
    }
}

/// Derive the hex encoded token key.
///
/// `salt` and `expiry` are used exactly as they appear on the wire.
pub fn derive_key(secret: &[u8], salt: &str, context: &[u8], expiry: &str) -> String {
    let mut info = Vec::with_capacity(context.len() + 1 + expiry.len());
    info.extend_from_slice(context);
    info.push(0);
    info.extend_from_slice(expiry.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), secret);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(&info, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    hex::encode(okm)
}

fn assert_secret(secret: &[u8]) {
    assert!(
        secret.len() >= MIN_SECRET_LEN,
        "CSRF secret must be at least {MIN_SECRET_LEN} bytes, got {}",
        secret.len()
    );
}

/// Issue a token using the OS random source and the system clock.
///
/// # Panics
///
/// If `secret` is shorter than [`MIN_SECRET_LEN`] or `ttl_seconds` is below
/// [`MIN_TTL_SECONDS`]. Both are caller bugs; [`crate::CsrfConfig`] checks
/// them up front.
///
/// # Errors
///
/// [`CsrfError::GenerationFailed`] if the OS random source is unavailable.
pub fn issue(secret: &[u8], ttl_seconds: i64, context: &[u8]) -> Result<CsrfToken> {
    issue_with(&mut OsRng, &SystemClock, secret, ttl_seconds, context)
}

/// Issue a token with an explicit random source and clock.
pub fn issue_with<R, C>(
    rng: &mut R,
    clock: &C,
    secret: &[u8],
    ttl_seconds: i64,
    context: &[u8],
) -> Result<CsrfToken>
where
    R: RngCore + CryptoRng + ?Sized,
    C: Clock + ?Sized,
{
    assert_secret(secret);
    assert!(
        ttl_seconds >= MIN_TTL_SECONDS,
        "CSRF token TTL must be at least {MIN_TTL_SECONDS} seconds, got {ttl_seconds}"
    );

    let mut salt = [0u8; SALT_LEN];
    rng.try_fill_bytes(&mut salt)
        .map_err(|e| CsrfError::GenerationFailed(e.to_string()))?;
    let salt = hex::encode(salt);

    let now = clock.now();
    if now < 0 {
        return Err(CsrfError::GenerationFailed(format!(
            "clock reads {now}, before the UNIX epoch"
        )));
    }
    let expires_at = now
        .checked_add(ttl_seconds)
        .ok_or(CsrfError::InvalidTtl(ttl_seconds))?;

    let key = derive_key(secret, &salt, context, &expires_at.to_string());
    let token = CsrfToken {
        salt,
        key,
        expires_at,
    };
    debug_assert!(token.to_string().len() > 32);
    Ok(token)
}

/// Validate a token against the system clock.
///
/// # Panics
///
/// If `secret` is shorter than [`MIN_SECRET_LEN`].
pub fn validate(secret: &[u8], token: &str, context: &[u8]) -> ValidationOutcome {
    validate_at(secret, token, context, SystemClock.now())
}

pub fn validate_with_clock(
    secret: &[u8],
    token: &str,
    context: &[u8],
    clock: &dyn Clock,
) -> ValidationOutcome {
    validate_at(secret, token, context, clock.now())
}

/// Validate a token as of `now` (UNIX seconds).
///
/// Structural checks run first, then the constant-time key comparison, and
/// only then the expiry check, since the expiry can't be trusted before the
/// key has been verified.
pub fn validate_at(secret: &[u8], token: &str, context: &[u8], now: i64) -> ValidationOutcome {
    assert_secret(secret);
    check(secret, token, context, now).into()
}

fn check(
    secret: &[u8],
    token: &str,
    context: &[u8],
    now: i64,
) -> std::result::Result<(), RejectReason> {
    let raw = RawToken::parse(token)?;

    let expected = derive_key(secret, raw.salt, context, raw.expiry);
    if !bool::from(raw.key.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(RejectReason::KeyMismatch);
    }

    if raw.expires_at < now {
        return Err(RejectReason::Expired);
    }

    Ok(())
}
