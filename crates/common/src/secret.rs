//! Secret types for protecting access codes from accidental logging.
//!
//! Re-exports [`secrecy`] types. Every station access code (front desk,
//! race control, lap-line tracker) is held as a [`SecretString`] so that
//! deriving `Debug` on a config struct can never print it.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{codes_match, SecretString};
//!
//! let configured = SecretString::from("pit-lane-7");
//!
//! // Debug output is redacted
//! assert!(!format!("{configured:?}").contains("pit-lane-7"));
//!
//! assert!(codes_match(&configured, "pit-lane-7"));
//! assert!(!codes_match(&configured, "pit-lane-8"));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Compare a submitted access code against the configured secret.
///
/// The comparison visits every byte of the longer input so the time taken
/// does not reveal the length of the matching prefix.
#[must_use]
pub fn codes_match(expected: &SecretString, submitted: &str) -> bool {
    let expected = expected.expose_secret().as_bytes();
    let submitted = submitted.as_bytes();

    let len = expected.len().max(submitted.len());
    let mut diff = u8::from(expected.len() != submitted.len());
    for i in 0..len {
        let a = expected.get(i).copied().unwrap_or(0);
        let b = submitted.get(i).copied().unwrap_or(0);
        diff |= a ^ b;
    }
    diff == 0
}
