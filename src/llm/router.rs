use std::time::Duration;
use crate::errors::PilotError;
use super::anthropic::AnthropicProvider;
use super::openai::OpenAIProvider;
use super::provider::LLMProvider;

/// Build a provider by name. `openai-compatible` and `local` need a base URL.
pub fn create_provider(
    provider_name: &str,
    api_key: &str,
    model: Option<&str>,
    base_url: Option<&str>,
    timeout: Option<Duration>,
) -> Result<Box<dyn LLMProvider>, PilotError> {
    match provider_name.to_ascii_lowercase().as_str() {
        "anthropic" | "claude" => {
            let mut provider = AnthropicProvider::new(api_key, model);
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            if let Some(timeout) = timeout {
                provider = provider.with_timeout(timeout);
            }
            Ok(Box::new(provider))
        }
        "openai" | "openai-compatible" | "openai_compatible" | "local" => {
            let mut provider = match base_url {
                Some(url) => OpenAIProvider::with_base_url(api_key, model, url),
                None if provider_name.eq_ignore_ascii_case("openai") => OpenAIProvider::new(api_key, model),
                None => {
                    return Err(PilotError::Config(format!(
                        "LLM provider '{}' requires llm.base_url",
                        provider_name
                    )))
                }
            };
            if let Some(timeout) = timeout {
                provider = provider.with_timeout(timeout);
            }
            Ok(Box::new(provider))
        }
        _ => Err(PilotError::Config(format!("Unknown LLM provider: {}", provider_name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_providers() {
        let p = create_provider("anthropic", "key", None, None, None).unwrap();
        assert_eq!(p.provider_name(), "anthropic");
        let p = create_provider("OpenAI", "key", Some("gpt-4o-mini"), None, Some(Duration::from_secs(30))).unwrap();
        assert_eq!(p.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_local_needs_base_url() {
        assert!(matches!(create_provider("local", "", None, None, None), Err(PilotError::Config(_))));
        assert!(create_provider("local", "", Some("llama3"), Some("http://127.0.0.1:11434/v1"), None).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        assert!(create_provider("carrier-pigeon", "key", None, None, None).is_err());
    }
}
