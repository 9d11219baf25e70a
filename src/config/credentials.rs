//! API credential lookup.
//!
//! The credential is checked before any stage is built so a missing key
//! fails fast instead of surfacing later as a refused state change.

use super::defaults::{CREDENTIAL_ENV_VAR, PLACEHOLDER_CREDENTIAL};
use crate::error::ConfigError;

/// Resolve the credential through `lookup` (normally the process environment).
///
/// Unset, blank, or placeholder values are errors.
pub fn resolve_credential<F>(lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(CREDENTIAL_ENV_VAR) else {
        return Err(ConfigError::MissingCredential {
            var: CREDENTIAL_ENV_VAR,
        });
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingCredential {
            var: CREDENTIAL_ENV_VAR,
        });
    }
    if value == PLACEHOLDER_CREDENTIAL {
        return Err(ConfigError::PlaceholderCredential {
            var: CREDENTIAL_ENV_VAR,
        });
    }
    Ok(value.to_string())
}

/// Read the credential from the process environment.
pub fn credential_from_env() -> Result<String, ConfigError> {
    resolve_credential(|var| std::env::var(var).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(value: Option<&'static str>) -> impl Fn(&str) -> Option<String> {
        move |var| {
            assert_eq!(var, CREDENTIAL_ENV_VAR);
            value.map(str::to_string)
        }
    }

    #[test]
    fn test_missing_credential() {
        let err = resolve_credential(env(None)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { var: "GST_GEMINI_API_KEY" }));
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let err = resolve_credential(env(Some("   "))).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn test_placeholder_credential() {
        let err = resolve_credential(env(Some("YOUR_API_KEY_HERE"))).unwrap_err();
        assert!(matches!(err, ConfigError::PlaceholderCredential { .. }));
        assert!(err.to_string().contains("GST_GEMINI_API_KEY"));
    }

    #[test]
    fn test_valid_credential_is_trimmed() {
        assert_eq!(resolve_credential(env(Some(" abc123\n"))).unwrap(), "abc123");
    }
}
