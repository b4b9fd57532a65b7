#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use pentest_pilot::agent::{Decision, DecisionContext, DecisionProvider, OrchestratorAgent};
use pentest_pilot::bridge::ToolBridge;
use pentest_pilot::config::EngineSettings;
use pentest_pilot::errors::PilotError;
use pentest_pilot::models::{RunConfig, Severity, Vulnerability};

pub const TARGET: &str = "https://shop.example";

/// One scripted answer of the fake decision provider.
#[derive(Clone)]
pub enum Reply {
    Decide(Decision),
    Fail(String),
}

/// Decision provider that replays a script, then repeats a fallback.
/// Every context it receives is recorded.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<DecisionContext>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the same tool call.
    pub fn probing() -> Self {
        Self::new(Vec::new(), Reply::Decide(probe()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<DecisionContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionProvider for ScriptedProvider {
    async fn generate(&self, ctx: &DecisionContext) -> Result<Decision, PilotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(ctx.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.script.lock().unwrap().pop_front().unwrap_or_else(|| self.fallback.clone());
        match reply {
            Reply::Decide(decision) => Ok(decision),
            Reply::Fail(message) => Err(PilotError::Provider(message)),
        }
    }

    async fn consult(&self, prompt: &str) -> Result<String, PilotError> {
        Ok(format!("answer based on:\n{}", prompt))
    }
}

/// Picks the first tool the agent offers and completes after `rounds`
/// iterations. Fails every call for the roles listed in `failing_roles`.
pub struct RoleAwareProvider {
    pub rounds: u32,
    pub failing_roles: Vec<&'static str>,
    pub finding: Option<Vulnerability>,
    pub delay: Duration,
}

impl RoleAwareProvider {
    pub fn new(rounds: u32) -> Self {
        Self { rounds, failing_roles: Vec::new(), finding: None, delay: Duration::ZERO }
    }
}

#[async_trait]
impl DecisionProvider for RoleAwareProvider {
    async fn generate(&self, ctx: &DecisionContext) -> Result<Decision, PilotError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let role = ctx.role.as_deref().unwrap_or("");
        if self.failing_roles.contains(&role) {
            return Err(PilotError::Provider(format!("{} model overloaded", role)));
        }
        let decision = if ctx.iteration >= self.rounds {
            Decision::complete(format!("{} done", role))
        } else {
            let tool = ctx.tools.first().map(|t| t.name).unwrap_or("http_history");
            Decision::tool(tool, json!({ "url": format!("{}/{}", TARGET, role) }))
        };
        Ok(match &self.finding {
            Some(finding) if ctx.iteration > 0 => decision.with_findings(vec![finding.clone()]),
            _ => decision,
        })
    }

    async fn consult(&self, _prompt: &str) -> Result<String, PilotError> {
        Ok(String::new())
    }
}

/// Tool bridge double. Counts calls, can fail chosen calls (by 1-based
/// position) and can hang every call until cancelled.
pub struct FakeBridge {
    available: bool,
    failing_calls: Vec<usize>,
    hang: AtomicBool,
    delay: Duration,
    calls: AtomicUsize,
    names: Mutex<Vec<String>>,
    disconnected: AtomicBool,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self {
            available: true,
            failing_calls: Vec::new(),
            hang: AtomicBool::new(false),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            names: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn unavailable() -> Self {
        Self { available: false, ..Self::new() }
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.failing_calls = calls.to_vec();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolBridge for FakeBridge {
    async fn is_available(&self) -> bool {
        self.available && !self.disconnected.load(Ordering::SeqCst)
    }

    async fn call_tool(&self, name: &str, args: &Value) -> Result<String, PilotError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.names.lock().unwrap().push(name.to_string());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_calls.contains(&n) {
            return Err(PilotError::ToolBridgeUnavailable("proxy connection refused".into()));
        }
        Ok(format!("HTTP/1.1 200 OK\n\n{} response for {}", name, args))
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

pub fn probe() -> Decision {
    Decision::tool("send_http_request", json!({ "url": format!("{}/api/orders/1", TARGET) }))
}

pub fn run_config(max_iterations: u32) -> RunConfig {
    let mut config = RunConfig::new(TARGET);
    config.rate_limit = 1000.0;
    config.max_iterations = max_iterations;
    config
}

/// No backoff between provider retries.
pub fn fast_settings() -> EngineSettings {
    EngineSettings { provider_retry_base_ms: 0, ..EngineSettings::default() }
}

pub fn agent(
    config: RunConfig,
    provider: Arc<dyn DecisionProvider>,
    bridge: Arc<dyn ToolBridge>,
) -> Arc<OrchestratorAgent> {
    Arc::new(
        OrchestratorAgent::builder("scan-1", config, provider, bridge)
            .settings(fast_settings())
            .build()
            .unwrap(),
    )
}

pub fn finding(name: &str, evidence: &str) -> Vulnerability {
    Vulnerability {
        name: name.to_string(),
        description: "object reference is not checked against the session".to_string(),
        severity: Severity::High,
        cvss_score: Some(7.5),
        cwe: Some("CWE-639".to_string()),
        remediation: "Authorize every object lookup".to_string(),
        request_evidence: evidence.to_string(),
        response_evidence: "200 OK".to_string(),
    }
}

/// Poll `check` every 5ms until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
