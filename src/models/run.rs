use serde::{Deserialize, Serialize};
use crate::errors::PilotError;

pub const DEFAULT_MAX_ITERATIONS: u32 = 50;
pub const MAX_ITERATIONS_CEILING: u32 = 500;
pub const DEFAULT_RATE_LIMIT: f64 = 10.0;
/// One tool call every ~17 minutes.
pub const MIN_RATE_LIMIT: f64 = 0.001;
pub const MAX_PARALLEL_AGENTS: u32 = 50;

/// A set of credentials for cross-account (IDOR) testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdorUser {
    pub label: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
}

impl IdorUser {
    fn has_credential(&self) -> bool {
        [&self.username, &self.password, &self.token, &self.cookie]
            .iter()
            .any(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// Immutable configuration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub target: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default)]
    pub use_nuclei: bool,
    #[serde(default)]
    pub use_ffuf: bool,
    #[serde(default)]
    pub idor_users: Vec<IdorUser>,
    #[serde(default)]
    pub custom_system_prompt: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// 0 lets the decision provider decide how long to plan.
    #[serde(default)]
    pub max_plan_rounds: u32,
    /// 1 runs a single agent, anything larger runs an agent pool.
    #[serde(default = "default_parallel_agents")]
    pub parallel_agents: u32,
}

fn default_rate_limit() -> f64 { DEFAULT_RATE_LIMIT }
fn default_max_iterations() -> u32 { DEFAULT_MAX_ITERATIONS }
fn default_parallel_agents() -> u32 { 1 }

impl RunConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            rate_limit: DEFAULT_RATE_LIMIT,
            use_nuclei: false,
            use_ffuf: false,
            idor_users: Vec::new(),
            custom_system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_plan_rounds: 0,
            parallel_agents: 1,
        }
    }

    /// Check the configuration and return a normalized copy.
    /// `max_iterations` is clamped into `1..=500` and `parallel_agents` to at
    /// most 50; everything else that is out of range is rejected.
    pub fn validate(mut self) -> Result<Self, PilotError> {
        self.target = self.target.trim().to_string();
        validate_target(&self.target)?;

        if !self.rate_limit.is_finite() || self.rate_limit < MIN_RATE_LIMIT {
            return Err(PilotError::Config(format!(
                "rateLimit must be at least {} requests per second, got {}",
                MIN_RATE_LIMIT, self.rate_limit
            )));
        }
        if self.parallel_agents == 0 {
            return Err(PilotError::Config("parallelAgents must be at least 1".into()));
        }
        for user in &self.idor_users {
            if user.label.trim().is_empty() {
                return Err(PilotError::Config("IDOR user entries need a label".into()));
            }
            if !user.has_credential() {
                return Err(PilotError::Config(format!(
                    "IDOR user '{}' has no username, password, token or cookie",
                    user.label
                )));
            }
        }
        if self.custom_system_prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            self.custom_system_prompt = None;
        }

        self.max_iterations = self.max_iterations.clamp(1, MAX_ITERATIONS_CEILING);
        self.parallel_agents = self.parallel_agents.min(MAX_PARALLEL_AGENTS);
        Ok(self)
    }

    pub fn is_pool(&self) -> bool {
        self.parallel_agents > 1
    }
}

fn validate_target(target: &str) -> Result<(), PilotError> {
    if target.is_empty() {
        return Err(PilotError::InvalidTarget("target is empty".into()));
    }
    if target.chars().any(char::is_whitespace) {
        return Err(PilotError::InvalidTarget(format!("target contains whitespace: {}", target)));
    }
    if let Some((scheme, rest)) = target.split_once("://") {
        if scheme != "http" && scheme != "https" {
            return Err(PilotError::InvalidTarget(format!("unsupported scheme '{}'", scheme)));
        }
        if rest.is_empty() || rest.starts_with('/') {
            return Err(PilotError::InvalidTarget(format!("target has no host: {}", target)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_iterations_clamped() {
        let mut config = RunConfig::new("https://shop.example");
        config.max_iterations = 0;
        assert_eq!(config.clone().validate().unwrap().max_iterations, 1);
        config.max_iterations = 9_000;
        assert_eq!(config.validate().unwrap().max_iterations, MAX_ITERATIONS_CEILING);
    }

    #[test]
    fn test_parallel_agents_clamped() {
        let mut config = RunConfig::new("https://shop.example");
        config.parallel_agents = 4_000_000_000;
        assert_eq!(config.clone().validate().unwrap().parallel_agents, MAX_PARALLEL_AGENTS);
        config.parallel_agents = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_must_be_positive() {
        let mut config = RunConfig::new("https://shop.example");
        config.rate_limit = 0.0;
        assert!(matches!(config.clone().validate(), Err(PilotError::Config(_))));
        config.rate_limit = f64::NAN;
        assert!(config.clone().validate().is_err());
        config.rate_limit = 1e-30;
        assert!(matches!(config.validate(), Err(PilotError::Config(_))));
    }

    #[test]
    fn test_fractional_rate_limit_accepted() {
        let mut config = RunConfig::new("shop.example:8443");
        config.rate_limit = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_target_validation() {
        assert!(RunConfig::new("").validate().is_err());
        assert!(RunConfig::new("ftp://files.example").validate().is_err());
        assert!(RunConfig::new("https://").validate().is_err());
        assert!(RunConfig::new("  http://app.local  ").validate().is_ok());
    }

    #[test]
    fn test_idor_user_needs_credentials() {
        let mut config = RunConfig::new("https://shop.example");
        config.idor_users.push(IdorUser {
            label: "alice".into(),
            username: None,
            password: None,
            token: None,
            cookie: None,
        });
        assert!(config.clone().validate().is_err());
        config.idor_users[0].token = Some("eyJhbGciOi".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_camel_case_with_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{"target": "https://shop.example", "useNuclei": true, "maxPlanRounds": 2}"#
        ).unwrap();
        assert!(config.use_nuclei);
        assert_eq!(config.max_plan_rounds, 2);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.parallel_agents, 1);
        assert!(!config.is_pool());
    }
}
