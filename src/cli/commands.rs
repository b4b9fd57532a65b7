use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pentest-pilot", version, about = "AI-assisted penetration testing console")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit diagnostics as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a headless scan and follow its log
    Scan(ScanArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ScanArgs {
    /// Target web application URL
    #[arg(short, long)]
    pub target: String,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Custom scan identifier
    #[arg(long)]
    pub scan_id: Option<String>,

    /// Tool calls per second across the whole scan
    #[arg(long)]
    pub rate_limit: Option<f64>,

    /// Hard cap on loop iterations (1-500)
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Planning rounds before moving on (0 lets the model decide)
    #[arg(long)]
    pub max_plan_rounds: Option<u32>,

    /// Number of agents (at most 50); more than one runs a role-partitioned pool
    #[arg(short, long)]
    pub parallel: Option<u32>,

    /// Enable the nuclei scanner tool
    #[arg(long)]
    pub nuclei: bool,

    /// Enable the ffuf fuzzer tool
    #[arg(long)]
    pub ffuf: bool,

    /// File whose contents replace the default system prompt
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// LLM provider: anthropic, openai, openai-compatible, local
    #[arg(long)]
    pub provider: Option<String>,

    /// LLM model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// LLM API key (or use env vars)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Base URL for openai-compatible or local endpoints
    #[arg(long)]
    pub base_url: Option<String>,

    /// Tool bridge URL
    #[arg(long)]
    pub bridge_url: Option<String>,

    /// Output directory for run records
    #[arg(short, long)]
    pub output: Option<String>,

    /// Do not write run records to disk
    #[arg(long)]
    pub no_save: bool,

    /// Print log entries as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}
