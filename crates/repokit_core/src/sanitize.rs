//! Redaction helpers for logs and error context.
//!
//! # Invariants
//! - Parameter keys containing `password|token|secret|key|auth`
//!   (case-insensitive) are always masked.
//! - Output is single-line and bounded in length.

use crate::model::Value;
use once_cell::sync::Lazy;
use regex::Regex;

/// Replacement text for redacted values.
pub const MASK: &str = "******";

const SENSITIVE_KEY_PARTS: &[&str] = &["password", "token", "secret", "key", "auth"];
const MAX_LOGGED_VALUE_CHARS: usize = 120;
const MAX_LOGGED_MESSAGE_CHARS: usize = 500;

static INLINE_SECRET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(password|passwd|pwd|token|secret|api_key|auth)\b(\s*[=:]\s*)('[^']*'|"[^"]*"|[^\s;,)]+)"#)
        .expect("valid inline secret regex")
});

/// Returns whether a parameter or config key names a sensitive value.
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEY_PARTS
        .iter()
        .any(|part| lowered.contains(part))
}

/// Renders named parameters for logs, masking sensitive keys.
///
/// Format: `{:title=Text("x"), :password=******}`.
pub fn describe_params(params: &[(String, Value)]) -> String {
    let rendered = params
        .iter()
        .map(|(name, value)| {
            if is_sensitive_key(name) {
                format!("{name}={MASK}")
            } else {
                format!("{name}={}", truncate(&value.to_log_string(), MAX_LOGGED_VALUE_CHARS))
            }
        })
        .collect::<Vec<_>>();
    format!("{{{}}}", rendered.join(", "))
}

/// Masks inline `password=...` style fragments and flattens the text.
pub fn sanitize_text(value: &str) -> String {
    let masked = INLINE_SECRET_RE.replace_all(value, |caps: &regex::Captures<'_>| {
        format!("{}{}{MASK}", &caps[1], &caps[2])
    });
    truncate(&masked.replace(['\n', '\r'], " "), MAX_LOGGED_MESSAGE_CHARS)
}

/// Caps text to `max_chars`, appending `...` when cut.
pub fn truncate(value: &str, max_chars: usize) -> String {
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    if value.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{describe_params, is_sensitive_key, sanitize_text, truncate, MASK};
    use crate::model::Value;

    #[test]
    fn sensitive_keys_match_case_insensitively() {
        assert!(is_sensitive_key(":Password_0"));
        assert!(is_sensitive_key("api_TOKEN"));
        assert!(is_sensitive_key("client_secret"));
        assert!(is_sensitive_key("apiKey"));
        assert!(is_sensitive_key("Authorization"));
        assert!(!is_sensitive_key(":title_0"));
    }

    #[test]
    fn describe_params_never_contains_password_value() {
        let params = vec![
            (":username_0".to_string(), Value::from("alice")),
            (":password_1".to_string(), Value::from("hunter2")),
        ];
        let rendered = describe_params(&params);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains(MASK));
    }

    #[test]
    fn sanitize_text_masks_inline_secrets() {
        let sanitized = sanitize_text("connect failed: user=app password=hunter2;\nretry");
        assert!(!sanitized.contains("hunter2"));
        assert!(!sanitized.contains('\n'));
        assert!(sanitized.contains("user=app"));
    }

    #[test]
    fn truncate_marks_cut_values() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
