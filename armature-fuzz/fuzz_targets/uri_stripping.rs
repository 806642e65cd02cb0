//! Fuzz target for token stripping and form re-rendering.

#![no_main]

use arbitrary::Arbitrary;
use armature_csrf::form::{FormOptions, ParamFilter, repost_form, strip_token_from_uri};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzRequest {
    uri: String,
    deny: Vec<String>,
    allow: Option<Vec<String>>,
    posted: Vec<(String, String)>,
}

fuzz_target!(|data: FuzzRequest| {
    let filter = match data.allow {
        Some(names) => ParamFilter::Allow(names),
        None => ParamFilter::Deny(data.deny),
    };

    let Ok(uri) = data.uri.parse::<http::Uri>() else {
        return;
    };

    if let Ok(stripped) = strip_token_from_uri(&uri, "csrftk", &filter) {
        if let Some((_, query)) = stripped.split_once('?') {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap();
            assert!(pairs.iter().all(|(name, _)| name != "csrftk" && filter.keeps(name)));
        }

        let html = repost_form(&data.posted, "csrftk", &stripped, &FormOptions::default());
        if !html.is_empty() {
            assert!(html.starts_with("<form "));
            assert!(html.ends_with("</form>\n"));
        }
    }
});
