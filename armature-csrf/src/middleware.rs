use crate::clock::{Clock, SystemClock};
use crate::config::CsrfConfig;
use crate::error::Result;
use crate::form::{self, FormOptions, ParamFilter};
use crate::token::{self, CsrfToken, ValidationOutcome};
use http::{Request, Uri};
use rand::rngs::OsRng;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// CSRF protection middleware
#[derive(Clone)]
pub struct CsrfMiddleware {
    config: Arc<CsrfConfig>,
    clock: Arc<dyn Clock>,
}

impl CsrfMiddleware {
    /// Create new CSRF middleware
    pub fn new(config: CsrfConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create middleware reading time from `clock`
    pub fn with_clock(config: CsrfConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            clock,
        }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Check if request needs CSRF protection
    pub fn needs_protection<B>(&self, request: &Request<B>) -> bool {
        let method = request.method().as_str();
        if self
            .config
            .safe_methods
            .iter()
            .any(|safe| safe.eq_ignore_ascii_case(method))
        {
            return false;
        }

        let path = request.uri().path();
        !self
            .config
            .exclude_paths
            .iter()
            .any(|excluded| path.starts_with(excluded.as_str()))
    }

    /// Issue a token bound to `context`
    pub fn generate_token(&self, context: &[u8]) -> Result<CsrfToken> {
        let token = token::issue_with(
            &mut OsRng,
            self.clock.as_ref(),
            &self.config.secret,
            self.config.token_ttl,
            context,
        )?;
        debug!(expires_at = token.expires_at(), "Issued CSRF token");
        Ok(token)
    }

    /// Validate a raw token string against `context`
    pub fn validate(&self, token: &str, context: &[u8]) -> ValidationOutcome {
        let outcome = self.check(token, context);
        match outcome {
            ValidationOutcome::Valid => trace!("CSRF token accepted"),
            ValidationOutcome::Invalid(reason) => {
                warn!(reason = reason.as_str(), "CSRF token rejected")
            }
        }
        outcome
    }

    /// Validate CSRF token from request
    ///
    /// Requests that don't need protection pass. A missing token counts as
    /// an empty one. Every rejection surfaces as the same
    /// [`CsrfError::Rejected`](crate::CsrfError::Rejected) message; the
    /// specific reason only goes to the log.
    pub fn validate_request<B: AsRef<[u8]>>(
        &self,
        request: &Request<B>,
        context: &[u8],
    ) -> Result<()> {
        if !self.needs_protection(request) {
            return Ok(());
        }

        let token = self.extract_token(request).unwrap_or_default();
        let outcome = self.check(&token, context);
        match outcome {
            ValidationOutcome::Valid => trace!(
                method = %request.method(),
                path = request.uri().path(),
                "CSRF token accepted"
            ),
            ValidationOutcome::Invalid(reason) => warn!(
                reason = reason.as_str(),
                method = %request.method(),
                path = request.uri().path(),
                "CSRF token rejected"
            ),
        }
        outcome.into_result()
    }

    /// Find the token in the header, then the body (JSON or form), then the
    /// query string.
    pub fn extract_token<B: AsRef<[u8]>>(&self, request: &Request<B>) -> Option<String> {
        self.get_token_from_header(request)
            .or_else(|| self.get_token_from_body(request))
            .or_else(|| self.get_token_from_query(request))
    }

    /// Current URI without the token parameter, see [`form::strip_token_from_uri`]
    pub fn strip_token_from_uri(&self, uri: &Uri, filter: &ParamFilter) -> Result<String> {
        form::strip_token_from_uri(uri, &self.config.field_name, filter)
    }

    /// Resubmission form for posted fields, see [`form::repost_form`]
    pub fn repost_form(
        &self,
        posted: &[(String, String)],
        action: &str,
        options: &FormOptions,
    ) -> String {
        form::repost_form(posted, &self.config.field_name, action, options)
    }

    /// Hidden input for `token` under the configured field name
    pub fn hidden_input(&self, token: &CsrfToken) -> String {
        form::hidden_input(&self.config.field_name, token)
    }

    fn check(&self, token: &str, context: &[u8]) -> ValidationOutcome {
        token::validate_with_clock(&self.config.secret, token, context, self.clock.as_ref())
    }

    /// Get token from header
    fn get_token_from_header<B>(&self, request: &Request<B>) -> Option<String> {
        request
            .headers()
            .get(self.config.header_name.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Get token from request body
    fn get_token_from_body<B: AsRef<[u8]>>(&self, request: &Request<B>) -> Option<String> {
        let body = request.body().as_ref();
        if body.is_empty() {
            return None;
        }

        // Try to parse as JSON
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
            return json
                .get(&self.config.field_name)
                .and_then(|token| token.as_str())
                .map(str::to_string);
        }

        // Try to parse as form data
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .ok()?
            .into_iter()
            .find(|(key, _)| *key == self.config.field_name)
            .map(|(_, value)| value)
    }

    /// Get token from query string
    fn get_token_from_query<B>(&self, request: &Request<B>) -> Option<String> {
        let query = request.uri().query()?;
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .ok()?
            .into_iter()
            .find(|(key, _)| *key == self.config.field_name)
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::token::RejectReason;
    use crate::CsrfError;
    use http::{Method, StatusCode};
    use std::io;
    use std::sync::Mutex;

    const NOW: i64 = 1_700_000_000;

    fn middleware_at(now: i64) -> (CsrfMiddleware, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let middleware = CsrfMiddleware::with_clock(CsrfConfig::default(), clock.clone());
        (middleware, clock)
    }

    fn request(method: Method, uri: &str) -> Request<Vec<u8>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Vec::new())
            .unwrap()
    }

    fn rejection(result: Result<()>) -> RejectReason {
        match result {
            Err(CsrfError::Rejected(reason)) => reason,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_safe_methods() {
        let middleware = CsrfMiddleware::new(CsrfConfig::default());

        let get_req = request(Method::GET, "/test");
        assert!(!middleware.needs_protection(&get_req));

        let post_req = request(Method::POST, "/test");
        assert!(middleware.needs_protection(&post_req));
    }

    #[test]
    fn test_excluded_paths() {
        let config = CsrfConfig::default().with_exclude_paths(vec!["/api/public".to_string()]);
        let middleware = CsrfMiddleware::new(config);

        let excluded_req = request(Method::POST, "/api/public/login");
        assert!(!middleware.needs_protection(&excluded_req));

        let protected_req = request(Method::POST, "/api/private/action");
        assert!(middleware.needs_protection(&protected_req));
    }

    #[test]
    fn test_token_generation() {
        let (middleware, _) = middleware_at(NOW);
        let token = middleware.generate_token(b"").unwrap();
        assert_eq!(token.expires_at(), NOW + 300);
        assert!(middleware.validate(&token.to_string(), b"").is_valid());
    }

    #[test]
    fn test_validate_expired() {
        let (middleware, clock) = middleware_at(NOW);
        let token = middleware.generate_token(b"ctx").unwrap().to_string();

        clock.advance(300);
        assert!(middleware.validate(&token, b"ctx").is_valid());

        clock.advance(1);
        assert_eq!(
            middleware.validate(&token, b"ctx").reason(),
            Some(RejectReason::Expired)
        );
    }

    #[test]
    fn test_validate_request_header() {
        let (middleware, _) = middleware_at(NOW);
        let token = middleware.generate_token(b"/submit").unwrap();

        let req = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header("x-csrf-token", token.to_string())
            .body(Vec::new())
            .unwrap();

        assert!(middleware.validate_request(&req, b"/submit").is_ok());
        assert_eq!(
            rejection(middleware.validate_request(&req, b"/other")),
            RejectReason::KeyMismatch
        );
    }

    #[test]
    fn test_validate_request_json_body() {
        let (middleware, _) = middleware_at(NOW);
        let token = middleware.generate_token(b"").unwrap();
        let body = serde_json::json!({ "csrftk": token.to_string(), "name": "x" });

        let req = Request::builder()
            .method(Method::PUT)
            .uri("/items/1")
            .body(serde_json::to_vec(&body).unwrap())
            .unwrap();

        assert!(middleware.validate_request(&req, b"").is_ok());
    }

    #[test]
    fn test_validate_request_form_body() {
        let (middleware, _) = middleware_at(NOW);
        let token = middleware.generate_token(b"").unwrap().to_string();
        let body = serde_urlencoded::to_string([("name", "x"), ("csrftk", token.as_str())]).unwrap();

        let req = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .body(body.into_bytes())
            .unwrap();

        assert!(middleware.validate_request(&req, b"").is_ok());
    }

    #[test]
    fn test_validate_request_query() {
        let (middleware, _) = middleware_at(NOW);
        let token = middleware.generate_token(b"id=3").unwrap();
        let req = request(Method::DELETE, &format!("/items?id=3&csrftk={}", token));

        assert!(middleware.validate_request(&req, b"id=3").is_ok());
    }

    #[test]
    fn test_validate_request_missing_token() {
        let (middleware, _) = middleware_at(NOW);
        let result = middleware.validate_request(&request(Method::POST, "/submit"), b"");

        let err = result.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "CSRF validation failed");
        assert_eq!(err.reason(), Some(RejectReason::EmptyToken));
    }

    #[test]
    fn test_rejection_logs_reason_without_token() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();

        let (middleware, _) = middleware_at(NOW);
        let token = middleware.generate_token(b"/submit").unwrap().to_string();
        let req = request(Method::POST, &format!("/submit?csrftk={}", token));

        tracing::subscriber::with_default(subscriber, || {
            assert!(middleware.validate_request(&req, b"/other").is_err());
        });

        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("CSRF token rejected"));
        assert!(output.contains("key_mismatch"));
        assert!(output.contains("/submit"));
        assert!(!output.contains(&token));
        assert!(!output.contains(&hex::encode(middleware.config().secret())));
    }

    #[test]
    fn test_validate_request_safe_method_skips_check() {
        let (middleware, _) = middleware_at(NOW);
        assert!(middleware
            .validate_request(&request(Method::GET, "/submit"), b"")
            .is_ok());
    }

    #[test]
    fn test_validate_request_malformed() {
        let (middleware, _) = middleware_at(NOW);
        let req = request(Method::POST, "/submit?csrftk=aa-bb-xx");
        assert_eq!(
            rejection(middleware.validate_request(&req, b"")),
            RejectReason::MalformedExpiry
        );
    }

    #[test]
    fn test_header_takes_precedence() {
        let (middleware, _) = middleware_at(NOW);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/submit?csrftk=from-query-1")
            .header("X-CSRF-Token", "from-header-1")
            .body(b"csrftk=from-body-1".to_vec())
            .unwrap();

        assert_eq!(middleware.extract_token(&req).as_deref(), Some("from-header-1"));
    }

    #[test]
    fn test_wrappers_use_field_name() {
        let config = CsrfConfig::default().with_field_name("_token");
        let middleware = CsrfMiddleware::new(config);

        let uri: Uri = "/a?_token=t&b=1".parse().unwrap();
        assert_eq!(
            middleware
                .strip_token_from_uri(&uri, &ParamFilter::default())
                .unwrap(),
            "/a?b=1"
        );

        let posted = vec![
            ("_token".to_string(), "t".to_string()),
            ("b".to_string(), "1".to_string()),
        ];
        let html = middleware.repost_form(&posted, "/a?b=1", &FormOptions::default());
        assert!(!html.contains("_token"));
        assert!(html.contains("name=\"b\""));

        let token = middleware.generate_token(b"").unwrap();
        assert!(middleware.hidden_input(&token).contains("name=\"_token\""));
    }
}
