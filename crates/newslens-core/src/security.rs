use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::NewsLensError;

static REDACTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
            .expect("invalid api_key regex"),
        Regex::new(r"(?i)(x-api-key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
            .expect("invalid x-api-key regex"),
        Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        Regex::new(r"((?:sk|fc|csk)-[A-Za-z0-9\-_]{16,})").expect("invalid token regex"),
    ]
});

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, NewsLensError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretValue(value)),
        _ => Err(NewsLensError::MissingSecret(var.to_string())),
    }
}

/// Optional lookup used where absence degrades gracefully instead of failing.
pub fn optional_env(var: &str) -> Option<SecretValue> {
    require_env(var).ok()
}

/// Scrub credentials from text that is about to leave the process (events, logs).
pub fn redact_secrets(input: &str) -> String {
    let mut output = input.to_string();
    for regex in REDACTION_PATTERNS.iter() {
        output = regex
            .replace_all(&output, |caps: &Captures| {
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_env_missing() {
        let err = require_env("NEWSLENS_TEST_SECRET_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, NewsLensError::MissingSecret(_)));
        assert!(optional_env("NEWSLENS_TEST_SECRET_THAT_IS_NEVER_SET").is_none());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = SecretValue::new("abc123");
        assert_eq!(format!("{secret:?}"), "***redacted***");
        assert_eq!(secret.expose(), "abc123");
    }

    #[test]
    fn redacts_keys_and_tokens() {
        let text = "upstream said api_key=abcd1234 and Bearer XYZ.987 with sk-abcdefghijklmnop1234";
        let cleaned = redact_secrets(text);
        assert!(!cleaned.contains("abcd1234"));
        assert!(!cleaned.contains("XYZ.987"));
        assert!(!cleaned.contains("sk-abcdefghijklmnop1234"));
        assert!(cleaned.contains("api_key=[REDACTED]"));
        assert!(cleaned.contains("Bearer [REDACTED]"));
    }

    #[test]
    fn leaves_plain_messages_alone() {
        let text = "cerebras returned status 429: rate limited";
        assert_eq!(redact_secrets(text), text);
    }
}
