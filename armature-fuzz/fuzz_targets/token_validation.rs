//! Fuzz target for CSRF token validation.
//!
//! Arbitrary tokens and contexts must never panic and must never validate
//! unless they were issued under the same secret.

#![no_main]

use arbitrary::Arbitrary;
use armature_csrf::{CsrfToken, RejectReason, ValidationOutcome, validate_at};
use libfuzzer_sys::fuzz_target;

const SECRET: &[u8] = b"fuzz_secret_key_that_is_32_bytes";

/// Arbitrary validation input.
#[derive(Debug, Arbitrary)]
struct FuzzToken {
    token: String,
    context: Vec<u8>,
    now: i64,
}

fuzz_target!(|data: FuzzToken| {
    let outcome = validate_at(SECRET, &data.token, &data.context, data.now);

    // Forging a key is out of reach for the fuzzer.
    assert_ne!(outcome, ValidationOutcome::Valid);

    // Structural parsing agrees with the validator on malformed input.
    match data.token.parse::<CsrfToken>() {
        Ok(token) => {
            assert!(matches!(
                outcome.reason(),
                Some(RejectReason::KeyMismatch | RejectReason::Expired)
            ));
            let _ = token.expires_at_datetime();
        }
        Err(reason) => assert_eq!(outcome.reason(), Some(reason)),
    }
});
