use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::models::{IdorUser, RunConfig};

/// Top-level YAML configuration. Every section is optional.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PilotConfig {
    pub scan: Option<ScanDefaults>,
    pub engine: Option<EngineSettings>,
    pub llm: Option<LLMConfig>,
    pub bridge: Option<BridgeConfig>,
    pub output: Option<OutputConfig>,
}

impl PilotConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        self.engine.clone().unwrap_or_default()
    }

    /// Run configuration for `target` with the file's scan defaults applied.
    pub fn run_config(&self, target: &str) -> RunConfig {
        let mut config = RunConfig::new(target);
        if let Some(scan) = &self.scan {
            scan.apply(&mut config);
        }
        config
    }
}

/// File-level defaults for the per-run options.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScanDefaults {
    pub rate_limit: Option<f64>,
    pub use_nuclei: Option<bool>,
    pub use_ffuf: Option<bool>,
    pub max_iterations: Option<u32>,
    pub max_plan_rounds: Option<u32>,
    pub parallel_agents: Option<u32>,
    pub custom_system_prompt: Option<String>,
    pub idor_users: Option<Vec<IdorUser>>,
}

impl ScanDefaults {
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(v) = self.rate_limit { config.rate_limit = v; }
        if let Some(v) = self.use_nuclei { config.use_nuclei = v; }
        if let Some(v) = self.use_ffuf { config.use_ffuf = v; }
        if let Some(v) = self.max_iterations { config.max_iterations = v; }
        if let Some(v) = self.max_plan_rounds { config.max_plan_rounds = v; }
        if let Some(v) = self.parallel_agents { config.parallel_agents = v; }
        if let Some(v) = &self.custom_system_prompt { config.custom_system_prompt = Some(v.clone()); }
        if let Some(v) = &self.idor_users { config.idor_users = v.clone(); }
    }
}

/// Engine tunables shared by every agent of a process.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Consecutive decision-provider failures before a run fails.
    pub provider_failure_limit: u32,
    /// Base of the provider retry backoff. 0 retries immediately.
    pub provider_retry_base_ms: u64,
    /// Characters of tool output kept in the conversation.
    pub tool_output_limit: usize,
    /// Conversation turns sent to the decision provider.
    pub history_window: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            provider_failure_limit: 3,
            provider_retry_base_ms: 1000,
            tool_output_limit: 4000,
            history_window: 40,
        }
    }
}

impl EngineSettings {
    pub fn provider_retry_base(&self) -> Duration {
        Duration::from_millis(self.provider_retry_base_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LLMConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BridgeConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct OutputConfig {
    pub directory: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_settings_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.provider_failure_limit, 3);
        assert_eq!(settings.provider_retry_base(), Duration::from_secs(1));
        assert_eq!(settings.tool_output_limit, 4000);
        assert_eq!(settings.history_window, 40);
    }

    #[test]
    fn test_partial_engine_section_keeps_defaults() {
        let settings: EngineSettings = serde_yaml::from_str("provider_retry_base_ms: 0").unwrap();
        assert_eq!(settings.provider_retry_base_ms, 0);
        assert_eq!(settings.provider_failure_limit, 3);
    }

    #[test]
    fn test_scan_defaults_apply() {
        let config = PilotConfig {
            scan: Some(ScanDefaults {
                rate_limit: Some(2.5),
                parallel_agents: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let run = config.run_config("https://shop.example");
        assert_eq!(run.rate_limit, 2.5);
        assert_eq!(run.parallel_agents, 4);
        assert_eq!(run.max_iterations, 50);
    }

    #[test]
    fn test_pilot_config_default() {
        let config = PilotConfig::default();
        assert!(config.llm.is_none());
        assert_eq!(config.engine_settings(), EngineSettings::default());
    }
}
