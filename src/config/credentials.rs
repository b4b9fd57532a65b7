use tracing::{debug, warn};

/// Resolve a secret that may reference the environment as `$VAR` or
/// `${VAR}`. An unset variable leaves the reference as-is.
pub fn resolve_credential(value: &str) -> String {
    let Some(var_name) = env_reference(value) else {
        return value.to_string();
    };
    match std::env::var(var_name) {
        Ok(resolved) => {
            debug!(var = %var_name, "Resolved credential from environment");
            resolved
        }
        Err(_) => {
            warn!(var = %var_name, "Environment variable not set, using literal");
            value.to_string()
        }
    }
}

fn env_reference(value: &str) -> Option<&str> {
    let rest = value.strip_prefix('$')?;
    let name = match rest.strip_prefix('{') {
        Some(braced) => braced.strip_suffix('}')?,
        None => rest,
    };
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// Conventional API key variable of an LLM provider.
pub fn provider_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" | "claude" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

pub fn api_key_from_env(provider: &str) -> Option<String> {
    std::env::var(provider_key_var(provider)?).ok().filter(|k| !k.is_empty())
}

/// Short display form of a secret: a four character prefix at most.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() >= 12 {
        let prefix: String = secret.chars().take(4).collect();
        format!("{}****", prefix)
    } else {
        "****".to_string()
    }
}

/// Mask every secret of four or more characters in `text`.
pub fn redact_credentials(text: &str, secrets: &[&str]) -> String {
    let mut result = text.to_string();
    for secret in secrets {
        if secret.len() >= 4 {
            result = result.replace(secret, "[REDACTED]");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_untouched() {
        assert_eq!(resolve_credential("sk-literal"), "sk-literal");
    }

    #[test]
    fn test_dollar_and_braced_references() {
        std::env::set_var("PILOT_TEST_BRIDGE_KEY", "bridge-secret");
        assert_eq!(resolve_credential("$PILOT_TEST_BRIDGE_KEY"), "bridge-secret");
        assert_eq!(resolve_credential("${PILOT_TEST_BRIDGE_KEY}"), "bridge-secret");
        std::env::remove_var("PILOT_TEST_BRIDGE_KEY");
    }

    #[test]
    fn test_unset_reference_kept() {
        assert_eq!(resolve_credential("$PILOT_NOT_SET_ANYWHERE"), "$PILOT_NOT_SET_ANYWHERE");
    }

    #[test]
    fn test_malformed_reference_is_literal() {
        assert_eq!(resolve_credential("${UNCLOSED"), "${UNCLOSED");
        assert_eq!(resolve_credential("$not a var"), "$not a var");
    }

    #[test]
    fn test_provider_key_var() {
        assert_eq!(provider_key_var("claude"), Some("ANTHROPIC_API_KEY"));
        assert_eq!(provider_key_var("openai"), Some("OPENAI_API_KEY"));
        assert_eq!(provider_key_var("local"), None);
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-ant-0123456789"), "sk-a****");
        assert_eq!(mask_secret("short"), "****");
    }

    #[test]
    fn test_redact_skips_short_secrets() {
        let redacted = redact_credentials("key=sk-ant-0123456789 pin=ab", &["sk-ant-0123456789", "ab"]);
        assert_eq!(redacted, "key=[REDACTED] pin=ab");
    }
}
