use crate::error::{CsrfError, Result};
use crate::token::{MIN_SECRET_LEN, MIN_TTL_SECONDS};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use std::fmt;

/// Environment variable holding the signing secret.
pub const ENV_SECRET: &str = "CSRF_SECRET";
/// Environment variable holding the token TTL in seconds.
pub const ENV_TOKEN_TTL: &str = "CSRF_TOKEN_TTL";
/// Environment variable holding the form/query field name.
pub const ENV_FIELD_NAME: &str = "CSRF_FIELD_NAME";

/// CSRF protection configuration
#[derive(Clone)]
pub struct CsrfConfig {
    /// Secret key for token derivation (must be at least 32 bytes)
    pub(crate) secret: Vec<u8>,

    /// Token time-to-live in seconds
    pub(crate) token_ttl: i64,

    /// Header name for CSRF token
    pub header_name: String,

    /// Form field and query parameter name for CSRF token
    pub field_name: String,

    /// Safe HTTP methods (not checked for CSRF)
    pub safe_methods: Vec<String>,

    /// Paths to exclude from CSRF protection
    pub exclude_paths: Vec<String>,
}

impl CsrfConfig {
    /// Create a new CSRF configuration
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(CsrfError::SecretTooShort { len: secret.len() });
        }
        Ok(Self::with_defaults(secret))
    }

    fn with_defaults(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_ttl: 300, // 5 minutes
            header_name: "X-CSRF-Token".to_string(),
            field_name: "csrftk".to_string(),
            safe_methods: vec![
                "GET".to_string(),
                "HEAD".to_string(),
                "OPTIONS".to_string(),
            ],
            exclude_paths: Vec::new(),
        }
    }

    /// Load configuration from `CSRF_SECRET`, `CSRF_TOKEN_TTL` and
    /// `CSRF_FIELD_NAME`. Only the secret is required.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = lookup(ENV_SECRET)
            .ok_or_else(|| CsrfError::Config(format!("{ENV_SECRET} is not set")))?;
        let mut config = Self::new(secret.into_bytes())?;

        if let Some(ttl) = lookup(ENV_TOKEN_TTL) {
            let ttl = ttl.trim().parse::<i64>().map_err(|e| {
                CsrfError::Config(format!("{ENV_TOKEN_TTL} is not an integer: {e}"))
            })?;
            config = config.with_token_ttl(ttl)?;
        }

        if let Some(field_name) = lookup(ENV_FIELD_NAME) {
            config = config.with_field_name(field_name);
        }

        Ok(config)
    }

    /// Generate a secret key
    ///
    /// # Panics
    ///
    /// If the OS random source is unavailable. Use
    /// [`try_generate_secret`](Self::try_generate_secret) to handle that case.
    pub fn generate_secret() -> Vec<u8> {
        match Self::try_generate_secret() {
            Ok(secret) => secret,
            Err(e) => panic!("{e}"),
        }
    }

    /// Generate a secret key, reporting an unavailable OS random source
    pub fn try_generate_secret() -> Result<Vec<u8>> {
        secret_from_rng(&mut OsRng)
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn token_ttl(&self) -> i64 {
        self.token_ttl
    }

    /// Set token TTL
    pub fn with_token_ttl(mut self, ttl_seconds: i64) -> Result<Self> {
        if ttl_seconds < MIN_TTL_SECONDS {
            return Err(CsrfError::InvalidTtl(ttl_seconds));
        }
        self.token_ttl = ttl_seconds;
        Ok(self)
    }

    /// Set header name
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Set field name
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Replace safe methods
    pub fn with_safe_methods(mut self, methods: Vec<String>) -> Self {
        self.safe_methods = methods;
        self
    }

    /// Add excluded paths
    pub fn with_exclude_paths(mut self, paths: Vec<String>) -> Self {
        self.exclude_paths = paths;
        self
    }
}

fn secret_from_rng<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<Vec<u8>> {
    let mut secret = vec![0u8; MIN_SECRET_LEN];
    rng.try_fill_bytes(&mut secret)
        .map_err(|e| CsrfError::GenerationFailed(e.to_string()))?;
    Ok(secret)
}

/// Defaults with a freshly generated secret.
///
/// # Panics
///
/// If the OS random source is unavailable, see [`CsrfConfig::generate_secret`].
impl Default for CsrfConfig {
    fn default() -> Self {
        Self::with_defaults(Self::generate_secret())
    }
}

impl fmt::Debug for CsrfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfConfig")
            .field("secret", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .field("header_name", &self.header_name)
            .field("field_name", &self.field_name)
            .field("safe_methods", &self.safe_methods)
            .field("exclude_paths", &self.exclude_paths)
            .finish()
    }
}
