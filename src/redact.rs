//! Secret redaction for key material in logs and debug output.
//!
//! The wrapped value is never exposed through `Debug` or `Display`; both
//! print `"<redacted>"`. Use [`Redacted::expose`] at the one place the secret
//! is actually needed.

use std::fmt::{self, Debug, Display};

/// Wrapper that redacts its inner value when formatted.
///
/// # Example
///
/// ```
/// use mulberry::redact::Redacted;
///
/// let key = Redacted("0xdeadbeef".to_string());
/// assert_eq!(format!("{key}"), "<redacted>");
/// assert_eq!(key.expose(), "0xdeadbeef");
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    /// Borrow the secret
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
