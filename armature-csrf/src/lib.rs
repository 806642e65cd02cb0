//! # Armature CSRF Protection
//!
//! Stateless Cross-Site Request Forgery (CSRF) tokens for Armature
//! applications.
//!
//! ## Features
//!
//! - ✅ **Stateless Tokens** - Nothing to store, tokens verify themselves
//! - ✅ **HKDF-SHA256 Keys** - Tokens are derived from a server secret
//! - ✅ **Context Binding** - Bind a token to a form action or query
//! - ✅ **Constant-time Checks** - Key comparison via `subtle`
//! - ✅ **Middleware Integration** - Works on any `http::Request`
//! - ✅ **Path Exclusion** - Exclude specific paths from protection
//!
//! ## Token Format
//!
//! ```text
//! <salt: 64 hex>-<key: 64 hex>-<expiry: UNIX seconds>
//! ```
//!
//! The key is `HKDF-SHA256(secret, salt, context || 0x00 || expiry)`, so the
//! expiry and the context cannot be changed without the secret.
//!
//! ## Quick Start
//!
//! ```rust
//! use armature_csrf::{issue, validate, ValidationOutcome};
//!
//! let secret = b"an application secret of 32+ bytes";
//!
//! let token = issue(secret, 300, b"/account/delete").unwrap();
//! let wire = token.to_string();
//!
//! assert_eq!(validate(secret, &wire, b"/account/delete"), ValidationOutcome::Valid);
//! assert!(!validate(secret, &wire, b"/account/edit").is_valid());
//! ```
//!
//! ## Middleware
//!
//! ```rust
//! use armature_csrf::{CsrfConfig, CsrfMiddleware};
//!
//! let config = CsrfConfig::new(CsrfConfig::generate_secret())
//!     .unwrap()
//!     .with_token_ttl(3600)
//!     .unwrap();
//! let csrf = CsrfMiddleware::new(config);
//!
//! let token = csrf.generate_token(b"/submit").unwrap();
//!
//! let request = http::Request::builder()
//!     .method("POST")
//!     .uri("/submit")
//!     .header("X-CSRF-Token", token.to_string())
//!     .body(Vec::new())
//!     .unwrap();
//!
//! assert!(csrf.validate_request(&request, b"/submit").is_ok());
//! ```
//!
//! ## Rejections
//!
//! [`validate`] returns a [`ValidationOutcome`] naming the reason for a
//! rejection, for logs and metrics. [`CsrfMiddleware::validate_request`]
//! turns every rejection into the same [`CsrfError::Rejected`] message and a
//! 403, so clients can't tell the reasons apart.
//!
//! ## Replay
//!
//! Tokens are not single use. A token can be replayed, with the same
//! context, until it expires. Keep TTLs short and bind tokens to the
//! narrowest context that works.

pub mod clock;
pub mod config;
pub mod error;
pub mod form;
pub mod middleware;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CsrfConfig;
pub use error::{CsrfError, Result};
pub use form::{FormOptions, ParamFilter};
pub use middleware::CsrfMiddleware;
pub use token::{
    CsrfToken, RejectReason, ValidationOutcome, issue, issue_with, validate, validate_at,
    validate_with_clock,
};
