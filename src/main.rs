use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use pentest_pilot::cli::{self, Cli, Commands};
use pentest_pilot::config::{self, credentials::mask_secret};
use pentest_pilot::errors::PilotError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match (cli.quiet, cli.verbose) {
        (true, 0) => "warn",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.with_ansi(!cli.no_color).init();
    }

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli.command {
        Commands::Scan(args) => cli::scan::handle_scan(args, cli.quiet).await,
        Commands::Validate(args) => handle_validate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            PilotError::Config(_) | PilotError::Yaml(_) => 2,
            PilotError::ToolBridgeUnavailable(_) => 3,
            PilotError::Authentication(_) => 4,
            PilotError::InvalidTarget(_) => 5,
            PilotError::Cancelled(_) => 130,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), PilotError> {
    let path = std::path::PathBuf::from(&args.config);
    let config = config::parse_config(&path).await?;
    println!("{} Configuration is valid: {}", style("✓").green(), args.config);

    let settings = config.engine_settings();
    println!(
        "  engine: {} provider failures, {} chars of tool output, {} turns of history",
        settings.provider_failure_limit, settings.tool_output_limit, settings.history_window
    );
    if let Some(llm) = &config.llm {
        println!(
            "  llm: {} {} (key {})",
            llm.provider.as_deref().unwrap_or("anthropic"),
            llm.model.as_deref().unwrap_or("default model"),
            llm.api_key.as_deref().map(mask_secret).unwrap_or_else(|| "from environment".to_string()),
        );
    }
    if let Some(url) = config.bridge.as_ref().and_then(|b| b.url.as_deref()) {
        println!("  bridge: {}", url);
    }
    if let Some(scan) = &config.scan {
        if let Some(agents) = scan.parallel_agents {
            println!("  scan: {} parallel agents", agents);
        }
    }
    Ok(())
}
