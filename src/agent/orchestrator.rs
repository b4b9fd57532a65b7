use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use chrono::Utc;
use tokio::sync::watch;
use serde_json::Value;
use tracing::{error, info, warn};
use crate::bridge::ToolBridge;
use crate::config::EngineSettings;
use crate::engine::{Checkpoint, ControlSignal, FindingLedger, LogSink, LogStream, RateLimiter, RunControl};
use crate::errors::PilotError;
use crate::models::{LogEntry, LogKind, RunConfig, Vulnerability};
use crate::utils::truncation::truncate_line;
use super::context::{ConversationContext, PlanningDirective, StepInfo};
use super::decision::{Decision, DecisionProvider, NextStep, ToolCall};
use super::phase::Phase;
use super::state::{AgentSnapshot, CompletionReason, RunOutcome, RunState};
use super::tools::ToolCatalog;

/// Upper bound on a continuation's iteration cap.
pub const CONTINUATION_MAX_ITERATIONS: u32 = 20;

/// Inputs of `continue_scan`.
#[derive(Debug, Clone, Default)]
pub struct ContinueRequest {
    pub instruction: String,
    pub iterations: u32,
    pub planning_enabled: bool,
    pub existing_findings: Vec<Vulnerability>,
    pub existing_endpoints: Vec<String>,
}

/// Role specialization applied to a pool worker's agent.
#[derive(Debug, Clone)]
pub struct AgentRole {
    pub name: String,
    pub focus: String,
    pub tools: Vec<&'static str>,
}

/// Budget of one run (the initial one or a continuation).
struct RunBudget {
    cap: u32,
    iterations: u32,
    plan_rounds: u32,
    plan_first: bool,
}

/// State a continuation replaced, kept so it can be abandoned.
struct PriorRun {
    control: Arc<RunControl>,
    phase: Phase,
    last_error: Option<String>,
    completion: Option<CompletionReason>,
    finished_at: Option<chrono::DateTime<Utc>>,
}

/// A continuation that owns the agent's running state but has not started
/// its loop yet. Pass it to `run_prepared` or `abandon_continuation`.
pub struct PreparedContinuation {
    control: Arc<RunControl>,
    request: ContinueRequest,
    cap: u32,
    previous: PriorRun,
}

enum Flow {
    Next,
    Done(Result<RunOutcome, PilotError>),
}

/// Drives one scan: phase state machine, iteration loop, pause/resume/stop
/// and human command injection.
///
/// Shared between the task running `start()` and observers through `Arc`;
/// every method takes `&self`.
pub struct OrchestratorAgent {
    scan_id: String,
    config: RunConfig,
    settings: EngineSettings,
    provider: Arc<dyn DecisionProvider>,
    bridge: Arc<dyn ToolBridge>,
    limiter: Arc<RateLimiter>,
    log: LogSink,
    ledger: Arc<FindingLedger>,
    catalog: ToolCatalog,
    role: Option<AgentRole>,
    state: RwLock<RunState>,
    control: RwLock<Arc<RunControl>>,
    mailbox: Mutex<VecDeque<String>>,
    endpoints: Mutex<Vec<String>>,
    run_lock: tokio::sync::Mutex<()>,
    idle: watch::Sender<bool>,
}

pub struct AgentBuilder {
    scan_id: String,
    config: RunConfig,
    provider: Arc<dyn DecisionProvider>,
    bridge: Arc<dyn ToolBridge>,
    settings: EngineSettings,
    limiter: Option<Arc<RateLimiter>>,
    stream: Option<Arc<LogStream>>,
    source: Option<String>,
    ledger: Option<Arc<FindingLedger>>,
    role: Option<AgentRole>,
}

impl AgentBuilder {
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a rate limiter with other agents of the same scan.
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Write into an existing stream, labelling entries with `source`.
    pub fn log_stream(mut self, stream: Arc<LogStream>, source: Option<String>) -> Self {
        self.stream = Some(stream);
        self.source = source;
        self
    }

    pub fn ledger(mut self, ledger: Arc<FindingLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Validates the run configuration and assembles the agent.
    pub fn build(self) -> Result<OrchestratorAgent, PilotError> {
        let config = self.config.validate()?;
        let limiter = match self.limiter {
            Some(limiter) => limiter,
            None => Arc::new(RateLimiter::new(config.rate_limit)?),
        };
        let mut catalog = ToolCatalog::for_config(&config);
        if let Some(role) = &self.role {
            catalog = catalog.restrict(&role.tools);
        }
        let stream = self.stream.unwrap_or_else(|| Arc::new(LogStream::new()));

        Ok(OrchestratorAgent {
            scan_id: self.scan_id,
            config,
            settings: self.settings,
            provider: self.provider,
            bridge: self.bridge,
            limiter,
            log: LogSink::new(stream, self.source),
            ledger: self.ledger.unwrap_or_default(),
            catalog,
            role: self.role,
            state: RwLock::new(RunState::new()),
            control: RwLock::new(Arc::new(RunControl::new())),
            mailbox: Mutex::new(VecDeque::new()),
            endpoints: Mutex::new(Vec::new()),
            run_lock: tokio::sync::Mutex::new(()),
            idle: watch::channel(true).0,
        })
    }
}

impl OrchestratorAgent {
    pub fn builder(
        scan_id: impl Into<String>,
        config: RunConfig,
        provider: Arc<dyn DecisionProvider>,
        bridge: Arc<dyn ToolBridge>,
    ) -> AgentBuilder {
        AgentBuilder {
            scan_id: scan_id.into(),
            config,
            provider,
            bridge,
            settings: EngineSettings::default(),
            limiter: None,
            stream: None,
            source: None,
            ledger: None,
            role: None,
        }
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn role(&self) -> Option<&AgentRole> {
        self.role.as_ref()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RunState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn control(&self) -> Arc<RunControl> {
        self.control.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Append to the log unless a stop has been requested.
    fn emit(&self, control: &RunControl, kind: LogKind, message: impl Into<String>) -> bool {
        let message = message.into();
        control.gated(|| self.log.append(kind, message)).is_some()
    }

    /// Run the scan to a terminal phase. Only a failed run returns `Err`;
    /// a stopped run is an `Ok` outcome with `CompletionReason::Stopped`.
    pub async fn start(&self) -> Result<RunOutcome, PilotError> {
        {
            let mut state = self.write_state();
            if state.started {
                return Err(PilotError::AlreadyRunning(self.scan_id.clone()));
            }
            state.started = true;
            if state.phase == Phase::Stopped {
                return Ok(self.outcome(&state));
            }
            state.is_running = true;
            state.started_at = Some(Utc::now());
        }
        self.idle.send_replace(false);
        let result = self.run_initial().await;
        self.idle.send_replace(true);
        result
    }

    async fn run_initial(&self) -> Result<RunOutcome, PilotError> {
        let _run = self.run_lock.lock().await;
        let control = self.control();
        info!(scan_id = %self.scan_id, worker = ?self.log.source(), target = %self.config.target, "Agent loop starting");

        let role_note = self.role.as_ref().map(|r| format!(" as {}", r.name)).unwrap_or_default();
        self.emit(&control, LogKind::Info, format!("Starting scan of {}{}", self.config.target, role_note));
        self.set_phase(&control, Phase::Initializing);

        let available = tokio::select! {
            biased;
            _ = control.cancel_token().cancelled() => return Ok(self.finish_stopped(None)),
            ok = self.bridge.is_available() => ok,
        };
        if !available {
            self.emit(&control, LogKind::Error, "Tool bridge is not reachable; cannot start the scan");
            return self.finish_failed(
                &control,
                PilotError::ToolBridgeUnavailable(format!("tool bridge unreachable for {}", self.config.target)),
            );
        }

        let conversation = self.new_conversation();
        self.set_phase(&control, Phase::Planning);
        let budget = RunBudget {
            cap: self.config.max_iterations,
            iterations: 0,
            plan_rounds: 0,
            plan_first: false,
        };
        self.drive(control, conversation, budget).await
    }

    /// Run a fresh bounded pass over a finished scan, starting at `testing`.
    /// Logs and the cumulative iteration count carry on from the prior run.
    pub async fn continue_scan(&self, request: ContinueRequest) -> Result<RunOutcome, PilotError> {
        let prepared = self.prepare_continuation(request)?;
        self.run_prepared(prepared).await
    }

    /// Check preconditions and install the continuation's control and
    /// running state without awaiting. From here on `stop()` targets the
    /// continuation, even before `run_prepared` is first polled.
    pub fn prepare_continuation(&self, request: ContinueRequest) -> Result<PreparedContinuation, PilotError> {
        let cap = request.iterations.clamp(1, CONTINUATION_MAX_ITERATIONS);
        let mut state = self.write_state();
        if !state.phase.is_continuable() || state.is_running {
            return Err(PilotError::Precondition(format!(
                "scan {} is {} and cannot be continued",
                self.scan_id, state.phase
            )));
        }
        let control = Arc::new(RunControl::new());
        let previous_control = std::mem::replace(
            &mut *self.control.write().unwrap_or_else(|e| e.into_inner()),
            control.clone(),
        );
        let previous = PriorRun {
            control: previous_control,
            phase: state.phase,
            last_error: state.last_error.take(),
            completion: state.completion.take(),
            finished_at: state.finished_at.take(),
        };
        state.phase = Phase::Testing;
        state.is_running = true;
        self.idle.send_replace(false);

        Ok(PreparedContinuation { control, request, cap, previous })
    }

    /// Drive a prepared continuation to a terminal phase.
    pub async fn run_prepared(&self, prepared: PreparedContinuation) -> Result<RunOutcome, PilotError> {
        let result = self.run_continuation(prepared.control, prepared.request, prepared.cap).await;
        self.idle.send_replace(true);
        result
    }

    /// Undo a continuation that was prepared but will never run.
    pub fn abandon_continuation(&self, prepared: PreparedContinuation) {
        let PriorRun { control, phase, last_error, completion, finished_at } = prepared.previous;
        {
            let mut state = self.write_state();
            state.phase = phase;
            state.is_running = false;
            state.last_error = last_error;
            state.completion = completion;
            state.finished_at = finished_at;
        }
        *self.control.write().unwrap_or_else(|e| e.into_inner()) = control;
        self.idle.send_replace(true);
    }

    async fn run_continuation(
        &self,
        control: Arc<RunControl>,
        request: ContinueRequest,
        cap: u32,
    ) -> Result<RunOutcome, PilotError> {
        let _run = self.run_lock.lock().await;
        info!(scan_id = %self.scan_id, cap, "Continuation starting");

        let seeded = request.existing_findings.len();
        self.ledger.seed(request.existing_findings);
        {
            let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
            for endpoint in request.existing_endpoints {
                if !endpoints.contains(&endpoint) {
                    endpoints.push(endpoint);
                }
            }
        }
        self.emit(&control, LogKind::Info, format!(
            "Continuing scan for up to {} iterations with {} known findings", cap, seeded
        ));
        self.emit(&control, LogKind::Phase, format!("Phase: {}", Phase::Testing.display_name()));

        let instruction = request.instruction.trim();
        if !instruction.is_empty() {
            self.mailbox.lock().unwrap_or_else(|e| e.into_inner()).push_front(instruction.to_string());
        }

        let mut conversation = self.new_conversation();
        conversation.push_system(format!(
            "Resumed after a finished run. {} findings are already recorded; do not report them again.",
            seeded
        ));
        let budget = RunBudget {
            cap,
            iterations: 0,
            plan_rounds: 0,
            plan_first: request.planning_enabled,
        };
        self.drive(control, conversation, budget).await
    }

    fn new_conversation(&self) -> ConversationContext {
        let role = self.role.as_ref().map(|r| (r.name.as_str(), r.focus.as_str()));
        let mut conversation = ConversationContext::new(
            &self.config,
            role,
            self.settings.tool_output_limit,
            self.settings.history_window,
        );
        for endpoint in self.endpoints.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            conversation.add_endpoint(endpoint);
        }
        conversation
    }

    /// Request a pause at the next checkpoint. False when the run is
    /// terminal or a pause/stop is already pending.
    pub fn pause(&self) -> bool {
        if self.read_state().phase.is_terminal() {
            return false;
        }
        self.control().request_pause()
    }

    /// Lift a pending pause. No-op when not paused.
    pub fn resume(&self) -> bool {
        self.control().resume()
    }

    /// Request cancellation. Idempotent. Once this returns the agent issues
    /// no further tool calls and appends at most one final "stopped" entry.
    pub fn stop(&self) -> bool {
        let control = self.control();
        let first = control.request_stop();
        let mut state = self.write_state();
        if !state.started && !state.phase.is_terminal() {
            state.phase = Phase::Stopped;
            state.completion = Some(CompletionReason::Stopped);
            state.finished_at = Some(Utc::now());
            drop(state);
            self.log.append(LogKind::System, "Scan stopped before it started");
        }
        first
    }

    /// Resolves once no loop is running. Returns immediately for a run
    /// that was never started.
    pub async fn wait_idle(&self) {
        let mut idle = self.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Queue an operator instruction for the next iteration.
    pub fn handle_user_command(&self, text: &str) -> Result<(), PilotError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PilotError::Precondition("empty command".into()));
        }
        if self.read_state().phase.is_terminal() {
            return Err(PilotError::NotRunning(self.scan_id.clone()));
        }
        self.mailbox.lock().unwrap_or_else(|e| e.into_inner()).push_back(text.to_string());
        Ok(())
    }

    pub fn state(&self) -> AgentSnapshot {
        let state = self.read_state();
        AgentSnapshot {
            phase: state.phase,
            is_running: state.is_running,
            is_paused: state.is_running && self.control().is_paused(),
            logs_count: self.log.stream().len(),
            iteration_count: state.iteration_count,
            findings_count: self.ledger.len(),
            last_error: state.last_error.clone(),
            completion: state.completion,
        }
    }

    pub fn phase(&self) -> Phase {
        self.read_state().phase
    }

    pub fn get_logs(&self, since: u64) -> Vec<String> {
        self.log.stream().lines_since(since)
    }

    pub fn log_entries(&self, since: u64) -> Vec<LogEntry> {
        self.log.stream().since(since)
    }

    pub fn findings(&self) -> Vec<Vulnerability> {
        self.ledger.snapshot()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn requests_issued(&self) -> u64 {
        self.limiter.requests_issued()
    }

    async fn drive(
        &self,
        control: Arc<RunControl>,
        mut conversation: ConversationContext,
        mut budget: RunBudget,
    ) -> Result<RunOutcome, PilotError> {
        let cancel = control.cancel_token().clone();
        let mut failures: u32 = 0;
        let mut last_call: Option<(ToolCall, String)> = None;

        let result = loop {
            match control.signal() {
                ControlSignal::StopRequested => break Ok(self.finish_stopped(None)),
                ControlSignal::PauseRequested => {
                    self.emit(&control, LogKind::System, "Scan paused");
                    if control.suspend().await == Checkpoint::Stop {
                        break Ok(self.finish_stopped(None));
                    }
                    self.emit(&control, LogKind::System, "Scan resumed");
                    continue;
                }
                ControlSignal::Running => {}
            }

            let instruction = self.mailbox.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
            if let Some(text) = &instruction {
                self.emit(&control, LogKind::Human, text.as_str());
                conversation.push_human(text.as_str());
            }

            let phase = self.phase();
            let context = conversation.build(StepInfo {
                phase,
                iteration: budget.iterations,
                max_iterations: budget.cap,
                planning: self.planning_directive(phase, &budget),
                instruction,
                findings: self.ledger.snapshot(),
                catalog: &self.catalog,
            });

            let generated = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(self.finish_stopped(None)),
                r = self.provider.generate(&context) => r,
            };

            let decision = match generated {
                Ok(decision) => {
                    failures = 0;
                    decision
                }
                Err(e) => {
                    failures += 1;
                    let limit = self.settings.provider_failure_limit.max(1);
                    warn!(scan_id = %self.scan_id, attempt = failures, error = %e, "Decision provider failed");
                    self.emit(&control, LogKind::Error, format!(
                        "Decision provider failed ({}/{}): {}", failures, limit, e
                    ));
                    if failures >= limit {
                        break self.finish_failed(&control, e);
                    }
                    let delay = e.classify().retry_delay(failures - 1, self.settings.provider_retry_base());
                    if !delay.is_zero() {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break Ok(self.finish_stopped(None)),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    continue;
                }
            };

            match self.apply(&control, &mut conversation, &mut budget, &mut last_call, decision).await {
                Flow::Next => {}
                Flow::Done(result) => break result,
            }

            if budget.iterations >= budget.cap {
                self.emit(&control, LogKind::System, format!(
                    "Iteration cap of {} reached; forcing completion", budget.cap
                ));
                break Ok(self.finish_completed(&control, CompletionReason::IterationCap));
            }
        };

        *self.endpoints.lock().unwrap_or_else(|e| e.into_inner()) = conversation.endpoints().to_vec();
        result
    }

    fn planning_directive(&self, phase: Phase, budget: &RunBudget) -> PlanningDirective {
        if phase == Phase::Planning {
            let max = self.config.max_plan_rounds;
            PlanningDirective::Plan {
                rounds_left: (max > 0).then(|| max.saturating_sub(budget.plan_rounds)),
            }
        } else if budget.plan_first && budget.iterations == 0 {
            PlanningDirective::PlanFirst
        } else {
            PlanningDirective::Act
        }
    }

    async fn apply(
        &self,
        control: &RunControl,
        conversation: &mut ConversationContext,
        budget: &mut RunBudget,
        last_call: &mut Option<(ToolCall, String)>,
        decision: Decision,
    ) -> Flow {
        if let Some(thought) = &decision.thought {
            conversation.push_agent(thought.as_str());
        }
        for finding in decision.findings {
            self.record_finding(control, finding, last_call.as_ref());
        }

        match decision.next {
            NextStep::Plan { note } => {
                self.emit(control, LogKind::Agent, note.as_str());
                conversation.push_agent(note);
                self.advance_iteration(budget);
                if self.phase() == Phase::Planning {
                    budget.plan_rounds += 1;
                    let max = self.config.max_plan_rounds;
                    if max > 0 && budget.plan_rounds >= max {
                        self.emit(control, LogKind::System, format!(
                            "Planning capped after {} round(s); moving to reconnaissance", max
                        ));
                        self.set_phase(control, Phase::Recon);
                    }
                }
                Flow::Next
            }
            NextStep::Tool(call) => self.run_tool(control, conversation, budget, last_call, call).await,
            NextStep::Complete { summary } => {
                if !summary.trim().is_empty() {
                    self.emit(control, LogKind::Agent, summary.as_str());
                }
                Flow::Done(Ok(self.finish_completed(control, CompletionReason::Provider)))
            }
        }
    }

    async fn run_tool(
        &self,
        control: &RunControl,
        conversation: &mut ConversationContext,
        budget: &mut RunBudget,
        last_call: &mut Option<(ToolCall, String)>,
        call: ToolCall,
    ) -> Flow {
        let Some(tool_phase) = self.catalog.phase_for(&call.tool) else {
            self.emit(control, LogKind::Error, format!("Tool {} is not available to this agent", call.tool));
            conversation.push_tool_error(&call.tool, &call.args, "tool not available; choose one from the list");
            *last_call = None;
            self.advance_iteration(budget);
            return Flow::Next;
        };
        self.set_phase(control, tool_phase);

        let cancel = control.cancel_token();
        if self.limiter.acquire(cancel).await.is_err() {
            return Flow::Done(Ok(self.finish_stopped(Some(&call.tool))));
        }
        if !self.emit(control, LogKind::Tool, format!("Calling {} {}", call.tool, compact_args(&call.args))) {
            return Flow::Done(Ok(self.finish_stopped(Some(&call.tool))));
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Flow::Done(Ok(self.finish_stopped(Some(&call.tool)))),
            r = self.bridge.call_tool(&call.tool, &call.args) => r,
        };
        if control.is_stop_requested() {
            return Flow::Done(Ok(self.finish_stopped(Some(&call.tool))));
        }

        match result {
            Ok(output) => {
                self.emit(control, LogKind::Tool, format!(
                    "{} returned {} chars: {}",
                    call.tool,
                    output.chars().count(),
                    truncate_line(&output, 120)
                ));
                conversation.push_tool_result(&call.tool, &call.args, &output);
                *last_call = Some((call, output));
            }
            Err(e) => {
                warn!(scan_id = %self.scan_id, tool = %call.tool, error = %e, "Tool call failed");
                self.emit(control, LogKind::Error, format!("Tool {} failed: {}", call.tool, e));
                conversation.push_tool_error(&call.tool, &call.args, &e.to_string());
                *last_call = None;
            }
        }
        self.advance_iteration(budget);
        Flow::Next
    }

    fn record_finding(&self, control: &RunControl, mut finding: Vulnerability, last_call: Option<&(ToolCall, String)>) {
        if finding.name.trim().is_empty() {
            return;
        }
        if let Some((call, output)) = last_call {
            if finding.request_evidence.is_empty() {
                finding.request_evidence = format!("{} {}", call.tool, compact_args(&call.args));
            }
            if finding.response_evidence.is_empty() {
                finding.response_evidence = truncate_line(output, 500);
            }
        }
        let headline = finding.headline();
        if self.ledger.record(finding) {
            info!(scan_id = %self.scan_id, finding = %headline, "Finding recorded");
            self.emit(control, LogKind::Finding, headline);
        }
    }

    fn advance_iteration(&self, budget: &mut RunBudget) {
        budget.iterations += 1;
        self.write_state().iteration_count += 1;
    }

    /// Forward-only phase change; logs the transition when it happens.
    fn set_phase(&self, control: &RunControl, next: Phase) {
        let changed = {
            let mut state = self.write_state();
            if state.phase.can_advance_to(next) {
                state.phase = next;
                true
            } else {
                false
            }
        };
        if changed {
            info!(scan_id = %self.scan_id, worker = ?self.log.source(), phase = %next, "Phase transition");
            self.emit(control, LogKind::Phase, format!("Phase: {}", next.display_name()));
        }
    }

    fn outcome(&self, state: &RunState) -> RunOutcome {
        RunOutcome {
            phase: state.phase,
            reason: state.completion.unwrap_or(CompletionReason::Stopped),
            iterations: state.iteration_count,
            findings: self.ledger.len(),
        }
    }

    fn finish_stopped(&self, interrupted: Option<&str>) -> RunOutcome {
        let mut state = self.write_state();
        if !state.phase.is_terminal() {
            state.phase = Phase::Stopped;
            state.is_running = false;
            state.completion = Some(CompletionReason::Stopped);
            state.finished_at = Some(Utc::now());
            let message = match interrupted {
                Some(tool) => format!("Scan stopped (interrupted {})", tool),
                None => "Scan stopped".to_string(),
            };
            self.log.append(LogKind::System, message);
            info!(scan_id = %self.scan_id, worker = ?self.log.source(), "Agent stopped");
        }
        state.is_running = false;
        self.outcome(&state)
    }

    fn finish_completed(&self, control: &RunControl, reason: CompletionReason) -> RunOutcome {
        if control.is_stop_requested() {
            return self.finish_stopped(None);
        }
        self.set_phase(control, Phase::Reporting);
        let findings = self.ledger.len();
        let iterations = {
            let mut state = self.write_state();
            state.phase = Phase::Completed;
            state.is_running = false;
            state.completion = Some(reason);
            state.finished_at = Some(Utc::now());
            state.iteration_count
        };
        self.emit(control, LogKind::Phase, format!("Phase: {}", Phase::Completed.display_name()));
        let how = match reason {
            CompletionReason::IterationCap => "iteration cap",
            _ => "provider signal",
        };
        self.emit(control, LogKind::Info, format!(
            "Scan completed by {}: {} findings after {} iterations", how, findings, iterations
        ));
        info!(scan_id = %self.scan_id, findings, iterations, reason = ?reason, "Agent completed");
        self.outcome(&self.read_state())
    }

    /// A stop that raced the failure wins.
    fn finish_failed(&self, control: &RunControl, err: PilotError) -> Result<RunOutcome, PilotError> {
        if control.is_stop_requested() {
            return Ok(self.finish_stopped(None));
        }
        {
            let mut state = self.write_state();
            state.phase = Phase::Failed;
            state.is_running = false;
            state.last_error = Some(err.to_string());
            state.finished_at = Some(Utc::now());
        }
        error!(scan_id = %self.scan_id, worker = ?self.log.source(), error = %err, "Agent failed");
        self.emit(control, LogKind::Phase, format!("Phase: {}", Phase::Failed.display_name()));
        self.emit(control, LogKind::Error, format!("Scan failed: {}", err));
        Err(err)
    }
}

fn compact_args(args: &Value) -> String {
    match args {
        Value::Null => String::new(),
        other => truncate_line(&other.to_string(), 200),
    }
}
