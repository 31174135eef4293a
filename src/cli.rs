use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// holdbook: decode and compare betting-exchange ledger snapshots.
#[derive(Parser, Debug)]
#[command(name = "holdbook", version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Output as JSON lines instead of TSV
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a raw snapshot and print its ledger rows
    Decode(DecodeArgs),

    /// Print new traded volume between two raw snapshots
    Diff(DiffArgs),

    /// Fetch the previous snapshot of a record and print its ledger
    Previous(PreviousArgs),

    /// Fetch previous snapshots for every row of a detail page
    Prefetch(PrefetchArgs),
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Snapshot file, or `-` for stdin
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Current snapshot file
    pub current: PathBuf,

    /// Previous snapshot file
    pub previous: PathBuf,

    /// Print both ledgers side by side instead of the positive deltas
    #[arg(long)]
    pub aligned: bool,
}

/// Backend connection overrides; unset values come from the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct BackendArgs {
    /// Backend base URL (overrides HOLDBOOK_API_BASE)
    #[arg(long)]
    pub api_base: Option<String>,

    /// Previous-record endpoint path (overrides HOLDBOOK_PREVIOUS_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Request timeout in milliseconds (overrides HOLDBOOK_TIMEOUT_MS)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct PreviousArgs {
    #[arg(long)]
    pub record_id: u64,

    #[arg(long)]
    pub market_id: u64,

    #[arg(long)]
    pub selection_id: u64,

    /// ISO 8601 timestamp of the current record
    #[arg(long)]
    pub reference_time: String,

    /// Extra query parameter, e.g. `--param handicap=-0.25`
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Args, Debug)]
pub struct PrefetchArgs {
    /// Detail page payload file (JSON with a `windows` array)
    pub page: PathBuf,

    /// Active-level count above which a row is flagged as heavily traded
    #[arg(long, default_value_t = holdbook::DEFAULT_HEAVY_THRESHOLD)]
    pub heavy_threshold: usize,

    #[command(flatten)]
    pub backend: BackendArgs,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
