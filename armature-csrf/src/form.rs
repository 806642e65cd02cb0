//! Presentation helpers for links and forms carrying CSRF tokens.
//!
//! Everything here works on request data passed in by the caller, never on
//! ambient request state. Output is HTML-escaped where it echoes request
//! data; the token functions themselves make no HTML guarantees.

use crate::error::Result;
use crate::token::CsrfToken;
use http::Uri;

/// Which query parameters survive when a URI is echoed back.
///
/// `Deny` is the default and keeps every parameter not listed. Denying
/// known-dangerous parameters is weaker than allowing known-safe ones, but an
/// allow list can't be written without knowing the application, so the
/// choice is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamFilter {
    /// Drop the listed parameters, keep everything else.
    Deny(Vec<String>),
    /// Keep only the listed parameters.
    Allow(Vec<String>),
}

impl ParamFilter {
    pub fn deny<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParamFilter::Deny(names.into_iter().map(Into::into).collect())
    }

    pub fn allow<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParamFilter::Allow(names.into_iter().map(Into::into).collect())
    }

    /// Whether a parameter named `name` is kept.
    pub fn keeps(&self, name: &str) -> bool {
        match self {
            ParamFilter::Deny(names) => !names.iter().any(|n| n == name),
            ParamFilter::Allow(names) => names.iter().any(|n| n == name),
        }
    }
}

impl Default for ParamFilter {
    fn default() -> Self {
        ParamFilter::Deny(Vec::new())
    }
}

/// Options for [`repost_form`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormOptions {
    /// CSS class of the form element (escaped on output)
    pub class: String,

    /// Submit control markup, emitted verbatim
    pub submit: String,
}

impl FormOptions {
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn with_submit(mut self, submit: impl Into<String>) -> Self {
        self.submit = submit.into();
        self
    }
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            class: "csrf_error".to_string(),
            submit: r#"<input type="submit" name="submit" value="Send posted data to server" />"#
                .to_string(),
        }
    }
}

/// Escape text for use in HTML content and quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Hidden input carrying `token` under `field_name`.
pub fn hidden_input(field_name: &str, token: &CsrfToken) -> String {
    format!(
        r#"<input type="hidden" name="{}" value="{}" />"#,
        escape_html(field_name),
        escape_html(&token.to_string())
    )
}

/// Rebuild `uri` without the token parameter and without any parameter the
/// filter rejects.
///
/// An authority, if present, is kept as a scheme-relative `//authority`
/// prefix. Fragments never reach the server and are not reproduced.
/// Percent-escapes that aren't valid UTF-8 decode lossily.
pub fn strip_token_from_uri(uri: &Uri, field_name: &str, filter: &ParamFilter) -> Result<String> {
    let params: Vec<(String, String)> = match uri.query() {
        Some(query) => serde_urlencoded::from_str(query)?,
        None => Vec::new(),
    };

    let kept: Vec<(String, String)> = params
        .into_iter()
        .filter(|(name, _)| name != field_name && filter.keeps(name))
        .collect();
    let query = serde_urlencoded::to_string(&kept)?;

    let mut out = String::new();
    if let Some(authority) = uri.authority() {
        out.push_str("//");
        out.push_str(authority.as_str());
    }
    out.push_str(uri.path());
    if !query.is_empty() {
        out.push('?');
        out.push_str(&query);
    }
    Ok(out)
}

/// Render the posted fields as a form that can be resubmitted, typically
/// after a token rejection.
///
/// Returns an empty string when nothing but the token was posted.
pub fn repost_form(
    posted: &[(String, String)],
    field_name: &str,
    action: &str,
    options: &FormOptions,
) -> String {
    let fields: Vec<&(String, String)> = posted
        .iter()
        .filter(|(name, _)| name != field_name)
        .collect();
    if fields.is_empty() {
        return String::new();
    }

    let mut html = format!(
        "<form method=\"post\" action=\"{}\" class=\"{}\">\n",
        escape_html(action),
        escape_html(&options.class)
    );
    for (name, value) in fields {
        html.push_str(&format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\" />\n",
            escape_html(name),
            escape_html(value)
        ));
    }
    html.push_str(&options.submit);
    html.push('\n');
    html.push_str("</form>\n");
    html
}
