use std::path::Path;
use crate::errors::PilotError;
use crate::models::MIN_RATE_LIMIT;
use super::credentials::resolve_credential;
use super::schema::CONFIG_SCHEMA;
use super::types::PilotConfig;
use tracing::warn;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<PilotConfig, PilotError> {
    if !path.exists() {
        return Err(PilotError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(PilotError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse, check and resolve a configuration held in memory.
pub fn parse_config_str(content: &str) -> Result<PilotConfig, PilotError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    if yaml.is_null() {
        return Ok(PilotConfig::default());
    }

    validate_schema(&yaml)?;

    let mut config: PilotConfig = serde_yaml::from_value(yaml)?;
    validate_semantics(&config)?;
    resolve_secrets(&mut config);
    Ok(config)
}

/// Advisory structural check: problems are logged, not returned.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), PilotError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| PilotError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| PilotError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }
    Ok(())
}

fn validate_semantics(config: &PilotConfig) -> Result<(), PilotError> {
    if let Some(scan) = &config.scan {
        if let Some(rate) = scan.rate_limit {
            if !rate.is_finite() || rate < MIN_RATE_LIMIT {
                return Err(PilotError::Config(format!(
                    "scan.rate_limit must be at least {}, got {}",
                    MIN_RATE_LIMIT, rate
                )));
            }
        }
        if scan.parallel_agents == Some(0) {
            return Err(PilotError::Config("scan.parallel_agents must be at least 1".into()));
        }
        for user in scan.idor_users.iter().flatten() {
            if user.label.trim().is_empty() {
                return Err(PilotError::Config("scan.idor_users entries need a label".into()));
            }
        }
    }

    if let Some(engine) = &config.engine {
        if engine.provider_failure_limit == 0 {
            return Err(PilotError::Config("engine.provider_failure_limit must be at least 1".into()));
        }
        if engine.history_window == 0 {
            return Err(PilotError::Config("engine.history_window must be at least 1".into()));
        }
    }

    if let Some(llm) = &config.llm {
        let provider = llm.provider.as_deref().unwrap_or("anthropic");
        if matches!(provider, "local" | "openai-compatible") && llm.base_url.is_none() {
            return Err(PilotError::Config(format!("llm.provider '{}' requires llm.base_url", provider)));
        }
        if llm.api_key.as_deref().map_or(true, str::is_empty) && !matches!(provider, "local") {
            warn!(provider, "No llm.api_key configured; expecting one on the command line");
        }
    }

    if let Some(url) = config.bridge.as_ref().and_then(|b| b.url.as_deref()) {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PilotError::Config(format!("bridge.url must be an http(s) URL, got '{}'", url)));
        }
    }

    Ok(())
}

/// Replace `$VAR` references in secret fields with environment values.
fn resolve_secrets(config: &mut PilotConfig) {
    if let Some(key) = config.llm.as_mut().and_then(|l| l.api_key.as_mut()) {
        *key = resolve_credential(key);
    }
    if let Some(key) = config.bridge.as_mut().and_then(|b| b.api_key.as_mut()) {
        *key = resolve_credential(key);
    }
    if let Some(users) = config.scan.as_mut().and_then(|s| s.idor_users.as_mut()) {
        for user in users {
            for field in [&mut user.username, &mut user.password, &mut user.token, &mut user.cookie] {
                if let Some(value) = field.as_mut() {
                    *value = resolve_credential(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
scan:
  rate_limit: 5
  max_iterations: 30
  parallel_agents: 4
  idor_users:
    - label: alice
      token: $PILOT_TEST_ALICE_TOKEN
engine:
  provider_retry_base_ms: 250
llm:
  provider: anthropic
  api_key: sk-test
bridge:
  url: http://127.0.0.1:8765
output:
  directory: ./scans
"#;

    #[test]
    fn test_parse_full_config() {
        std::env::set_var("PILOT_TEST_ALICE_TOKEN", "tok-alice");
        let config = parse_config_str(SAMPLE).unwrap();
        std::env::remove_var("PILOT_TEST_ALICE_TOKEN");

        let run = config.run_config("https://shop.example");
        assert_eq!(run.rate_limit, 5.0);
        assert_eq!(run.parallel_agents, 4);
        assert_eq!(run.idor_users[0].token.as_deref(), Some("tok-alice"));
        assert_eq!(config.engine_settings().provider_retry_base_ms, 250);
        assert_eq!(config.engine_settings().provider_failure_limit, 3);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = parse_config_str("").unwrap();
        assert!(config.scan.is_none());
    }

    #[test]
    fn test_rejects_zero_rate_limit() {
        let err = parse_config_str("scan:\n  rate_limit: 0\n").unwrap_err();
        assert!(matches!(err, PilotError::Config(_)));
        assert!(parse_config_str("scan:\n  rate_limit: 1.0e-30\n").is_err());
    }

    #[test]
    fn test_local_provider_needs_base_url() {
        assert!(parse_config_str("llm:\n  provider: local\n").is_err());
        assert!(parse_config_str("llm:\n  provider: local\n  base_url: http://127.0.0.1:11434/v1\n").is_ok());
    }

    #[test]
    fn test_bridge_url_scheme() {
        assert!(parse_config_str("bridge:\n  url: ws://127.0.0.1:9000\n").is_err());
    }

    #[test]
    fn test_unknown_section_is_advisory() {
        // schema complains, typed parse ignores the extra key
        assert!(parse_config_str("extras:\n  colour: blue\n").is_ok());
    }

    #[tokio::test]
    async fn test_parse_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"output:\n  directory: /tmp/pilot\n").unwrap();
        let config = parse_config(file.path()).await.unwrap();
        assert_eq!(config.output.unwrap().directory.as_deref(), Some("/tmp/pilot"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = parse_config(Path::new("/nonexistent/pilot.yaml")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
