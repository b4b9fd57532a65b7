use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use console::style;
use tracing::{info, warn};
use crate::agent::{LlmDecisionProvider, Phase};
use crate::bridge::HttpToolBridge;
use crate::cli::commands::ScanArgs;
use crate::cli::render::{render_banner, render_entry, render_summary};
use crate::config::credentials::{api_key_from_env, redact_credentials};
use crate::config::{self, PilotConfig};
use crate::errors::PilotError;
use crate::llm::router::create_provider;
use crate::models::RunConfig;
use crate::service::{Collaborators, JsonDirStore, RunRecord, ScanService};
use crate::utils::formatting::format_duration;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8765";
const DEFAULT_OUTPUT_DIR: &str = "./results";

pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<(), PilotError> {
    let file_config = match &args.config {
        Some(path) => config::parse_config(&PathBuf::from(path)).await?,
        None => PilotConfig::default(),
    };
    let run_config = build_run_config(&args, &file_config).await?;
    let (collaborators, secrets) = build_collaborators(&args, &file_config)?;

    let mut service = ScanService::new(file_config.engine_settings());
    if !args.no_save {
        let output = args
            .output
            .clone()
            .or_else(|| file_config.output.as_ref().and_then(|o| o.directory.clone()))
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());
        service = service.with_store(Arc::new(JsonDirStore::new(output)));
    }

    let scan_id = args.scan_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if !quiet {
        println!("{}", render_banner(&scan_id, &run_config.target, run_config.parallel_agents));
    }
    info!(scan_id = %scan_id, target = %run_config.target, "Starting headless scan");

    let started = Instant::now();
    let bridge = collaborators.bridge.clone();
    service.launch(&scan_id, run_config, collaborators)?;
    follow(&service, &scan_id, args.json).await?;
    let record = service.wait(&scan_id).await?;
    bridge.disconnect().await;

    if !quiet && !args.json {
        let elapsed = format_duration(started.elapsed().as_millis() as u64);
        let secrets: Vec<&str> = secrets.iter().map(String::as_str).collect();
        println!("{}", redact_credentials(&render_summary(&record, &elapsed), &secrets));
    }
    exit_status(record)
}

/// Print new log entries until the run leaves the registry. The first
/// Ctrl-C stops the run; the loop then drains the final entries.
async fn follow(service: &ScanService, scan_id: &str, json: bool) -> Result<(), PilotError> {
    let mut cursor: u64 = 0;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    warn!(error = %e, "Cannot listen for Ctrl-C");
                } else {
                    eprintln!("{} Stopping scan {}...", style("■").yellow(), scan_id);
                    service.stop(scan_id).await?;
                }
            }
        }

        let live = service.registry().contains(scan_id);
        cursor = print_since(service, scan_id, cursor, json)?;
        if !live {
            return Ok(());
        }
    }
}

fn print_since(service: &ScanService, scan_id: &str, cursor: u64, json: bool) -> Result<u64, PilotError> {
    let entries = service.log_entries(scan_id, cursor)?;
    for entry in &entries {
        if json {
            println!("{}", serde_json::to_string(entry)?);
        } else {
            println!("{}", render_entry(entry));
        }
    }
    Ok(cursor + entries.len() as u64)
}

/// Config file defaults first, then flags.
async fn build_run_config(args: &ScanArgs, file_config: &PilotConfig) -> Result<RunConfig, PilotError> {
    let mut config = file_config.run_config(&args.target);
    if let Some(rate) = args.rate_limit {
        config.rate_limit = rate;
    }
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    if let Some(rounds) = args.max_plan_rounds {
        config.max_plan_rounds = rounds;
    }
    if let Some(parallel) = args.parallel {
        config.parallel_agents = parallel;
    }
    config.use_nuclei |= args.nuclei;
    config.use_ffuf |= args.ffuf;
    if let Some(path) = &args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PilotError::Config(format!("Cannot read system prompt {}: {}", path, e)))?;
        config.custom_system_prompt = Some(prompt);
    }
    config.validate()
}

fn build_collaborators(args: &ScanArgs, file_config: &PilotConfig) -> Result<(Collaborators, Vec<String>), PilotError> {
    let llm = file_config.llm.clone().unwrap_or_default();
    let provider_name = args
        .provider
        .clone()
        .or(llm.provider)
        .unwrap_or_else(|| "anthropic".to_string());
    let api_key = args
        .api_key
        .clone()
        .or(llm.api_key)
        .or_else(|| api_key_from_env(&provider_name))
        .unwrap_or_default();
    let model = args.model.clone().or(llm.model);
    let base_url = args.base_url.clone().or(llm.base_url);
    let llm_provider = create_provider(
        &provider_name,
        &api_key,
        model.as_deref(),
        base_url.as_deref(),
        llm.timeout_secs.map(Duration::from_secs),
    )?;

    let bridge_config = file_config.bridge.clone().unwrap_or_default();
    let bridge_url = args
        .bridge_url
        .clone()
        .or(bridge_config.url)
        .unwrap_or_else(|| DEFAULT_BRIDGE_URL.to_string());
    if !(bridge_url.starts_with("http://") || bridge_url.starts_with("https://")) {
        return Err(PilotError::Config(format!("Tool bridge URL must be http(s): {}", bridge_url)));
    }
    let bridge_key = bridge_config.api_key.clone();
    let bridge = HttpToolBridge::new(
        &bridge_url,
        bridge_key.clone(),
        bridge_config.timeout_secs.map(Duration::from_secs),
    )?;

    let secrets = [Some(api_key), bridge_key].into_iter().flatten().filter(|s| !s.is_empty()).collect();
    let collaborators = Collaborators {
        provider: Arc::new(LlmDecisionProvider::new(Arc::from(llm_provider))),
        bridge: Arc::new(bridge),
    };
    Ok((collaborators, secrets))
}

/// Map the final record to the process result.
fn exit_status(record: RunRecord) -> Result<(), PilotError> {
    match record.status {
        Phase::Completed => Ok(()),
        Phase::Stopped => Err(PilotError::Cancelled(format!("scan {} was stopped", record.scan_id))),
        _ => {
            let message = record.error.unwrap_or_else(|| format!("scan {} ended as {}", record.scan_id, record.status));
            Err(match record.error_type.as_deref() {
                Some("ToolBridgeUnavailableError") => PilotError::ToolBridgeUnavailable(message),
                Some("AuthenticationError") => PilotError::Authentication(message),
                Some("AllWorkersFailedError") | Some("ProviderError") => PilotError::Provider(message),
                _ => PilotError::Internal(message),
            })
        }
    }
}
