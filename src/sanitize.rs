//! Result payload repair
//!
//! The engine streams result files as a bracketed record sequence and always
//! leaves a separator after the last record, so the downloaded text ends in
//! `,]`. Parsers that emit nothing for a failed query additionally leave
//! literal `null` tokens between separators. Both artifacts are repaired here
//! before the payload is parsed or forwarded.

use crate::error::{Error, Result};
use regex::Regex;

/// Repairs engine result text into well-formed record sequences
///
/// Patterns are compiled once at startup and applied per fetched payload.
#[derive(Clone, Debug)]
pub struct Sanitizer {
    trailing_comma: Regex,
    null_leading: Regex,
    null_middle: Regex,
    null_tail: Regex,
    null_only: Regex,
}

impl Sanitizer {
    /// Compile the repair patterns
    ///
    /// # Errors
    /// Returns [`Error::Parse`] if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            trailing_comma: pattern(r",\s*\]\s*$")?,
            null_leading: pattern(r"\[\s*null\s*,\s*")?,
            null_middle: pattern(r",\s*null\s*,")?,
            null_tail: pattern(r",\s*null\s*\]")?,
            null_only: pattern(r"\[\s*null\s*\]")?,
        })
    }

    /// Repair a downloaded result payload
    ///
    /// Removes the one trailing separator immediately preceding the closing
    /// bracket, and with `strip_null_tokens` also drops `null` placeholder
    /// elements. Well-formed input passes through unchanged, so the repair is
    /// idempotent. Null tokens are only matched between element boundaries;
    /// `null` field values and `"null"` text inside records are untouched.
    pub fn clean(&self, raw: &str, strip_null_tokens: bool) -> String {
        let text = self.trailing_comma.replace(raw, "]").into_owned();
        if strip_null_tokens {
            self.strip_nulls(text)
        } else {
            text
        }
    }

    // Consecutive placeholders overlap the middle pattern, so the rules run
    // until the text stops shrinking.
    fn strip_nulls(&self, text: String) -> String {
        let mut current = text;
        loop {
            let mut next = self.null_leading.replace_all(&current, "[").into_owned();
            next = self.null_middle.replace_all(&next, ",").into_owned();
            next = self.null_tail.replace_all(&next, "]").into_owned();
            next = self.null_only.replace_all(&next, "[]").into_owned();
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

fn pattern(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| Error::Parse(format!("invalid repair pattern '{source}': {e}")))
}
