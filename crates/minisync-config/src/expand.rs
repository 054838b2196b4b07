//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// `field` names the config key and is only used in error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains('$') {
        return Ok(value.to_owned());
    }

    shellexpand::env(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|err| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", err.var_name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_unchanged() {
        assert_eq!(expand_env("0.0.0.0", "server.host").unwrap(), "0.0.0.0");
    }

    #[test]
    fn test_default_used_when_unset() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("MINISYNC_EXPAND_UNSET");
        }

        let value = expand_env("${MINISYNC_EXPAND_UNSET:-localhost}", "server.host").unwrap();
        assert_eq!(value, "localhost");
    }

    #[test]
    fn test_missing_var_names_field() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("MINISYNC_EXPAND_MISSING");
        }

        let err = expand_env("${MINISYNC_EXPAND_MISSING}", "server.host").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("server.host"));
        assert!(msg.contains("MINISYNC_EXPAND_MISSING"));
    }
}
