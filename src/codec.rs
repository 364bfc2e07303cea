//! Typed codec between canonical value text and Rust values.
//!
//! Every preference is stored as text. Typed accessors encode on the way in
//! and decode on the way out; a decode failure is not an error, the caller's
//! default is used instead.

use crate::error::{PreferencesError, Result};

/// Characters a key may not contain.
pub const ILLEGAL_KEY_CHARS: &[char] = &['=', '\n', '\r', ' ', '\t', '[', ']'];

/// Characters a key may not start with; the file format reads such lines as
/// comments.
pub const COMMENT_MARKERS: &[char] = &[';', '#'];

/// A type that can be stored as a preference.
pub trait PreferenceValue: Sized {
    /// Canonical text for this value.
    fn encode(&self) -> String;

    /// Parse canonical text, returning `None` when it is malformed.
    fn decode(text: &str) -> Option<Self>;
}

macro_rules! numeric_value {
    ($($ty:ty),*) => {
        $(
            impl PreferenceValue for $ty {
                fn encode(&self) -> String {
                    self.to_string()
                }

                fn decode(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }
            }
        )*
    };
}

numeric_value!(i32, i64, f32, f64);

impl PreferenceValue for bool {
    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("true") {
            Some(true)
        } else if text.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }
}

impl PreferenceValue for String {
    fn encode(&self) -> String {
        format!("\"{}\"", self)
    }

    fn decode(text: &str) -> Option<Self> {
        let unquoted = text
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'));
        Some(unquoted.unwrap_or(text).to_string())
    }
}

/// Validate that a key can be stored and written to the file format.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(PreferencesError::invalid_key(key, "key cannot be empty"));
    }
    if key.contains(ILLEGAL_KEY_CHARS) {
        return Err(PreferencesError::invalid_key(
            key,
            "key may not contain '=', '[', ']' or whitespace",
        ));
    }
    if key.starts_with(COMMENT_MARKERS) {
        return Err(PreferencesError::invalid_key(
            key,
            "key may not start with ';' or '#'",
        ));
    }
    Ok(())
}

/// Validate canonical value text before it is stored.
pub fn validate_text(key: &str, text: &str) -> Result<()> {
    if text.contains(['\n', '\r']) {
        return Err(PreferencesError::invalid_value(
            key,
            "value may not contain line breaks",
        ));
    }
    Ok(())
}

/// Validate a string payload before it is quoted.
pub fn validate_string(key: &str, value: &str) -> Result<()> {
    if value.contains('"') {
        return Err(PreferencesError::invalid_value(
            key,
            "string may not contain '\"'",
        ));
    }
    validate_text(key, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() {
        assert_eq!(42i32.encode(), "42");
        assert_eq!(i32::decode(" -7 "), Some(-7));
        assert_eq!(i32::decode("seven"), None);
        assert_eq!(i32::decode("99999999999"), None);

        assert_eq!(i64::decode(&i64::MAX.encode()), Some(i64::MAX));
        assert_eq!(1.5f64.encode(), "1.5");
        assert_eq!(f64::decode("1"), Some(1.0));
        assert_eq!(f32::decode("0.25"), Some(0.25));
        assert_eq!(f32::decode(""), None);
    }

    #[test]
    fn test_floats_keep_precision() {
        let value = 0.1f64 + 0.2f64;
        assert_eq!(f64::decode(&value.encode()), Some(value));
        let value = 3.14159f32;
        assert_eq!(f32::decode(&value.encode()), Some(value));
    }

    #[test]
    fn test_booleans() {
        assert_eq!(true.encode(), "true");
        assert_eq!(bool::decode("TRUE"), Some(true));
        assert_eq!(bool::decode("false"), Some(false));
        assert_eq!(bool::decode("1"), None);
    }

    #[test]
    fn test_strings_are_quoted() {
        assert_eq!("hello".to_string().encode(), "\"hello\"");
        assert_eq!(String::new().encode(), "\"\"");
        assert_eq!(String::decode("\"hello world\""), Some("hello world".into()));
        assert_eq!(String::decode("bare"), Some("bare".into()));
        assert_eq!(String::decode("\"\""), Some(String::new()));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("armSpeed").is_ok());
        assert!(validate_key("arm.speed_2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a=b").is_err());
        assert!(validate_key("two words").is_err());
        assert!(validate_key("[section]").is_err());
        assert!(validate_key("~S A V E~").is_err());
    }

    #[test]
    fn test_key_cannot_start_like_a_comment() {
        assert!(matches!(
            validate_key("#count"),
            Err(PreferencesError::InvalidKey { .. })
        ));
        assert!(validate_key(";gain").is_err());
        assert!(validate_key("count#2").is_ok());
        assert!(validate_key("gain;x").is_ok());
    }

    #[test]
    fn test_validate_values() {
        assert!(validate_text("k", "1.5").is_ok());
        assert!(validate_text("k", "a\nb").is_err());
        assert!(validate_string("k", "plain text").is_ok());
        assert!(matches!(
            validate_string("k", "say \"hi\""),
            Err(PreferencesError::InvalidValue { .. })
        ));
    }
}
