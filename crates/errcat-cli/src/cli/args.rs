use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "errcat",
    version,
    about = "Error catalog cache: warm, inspect and resolve backend error messages"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Host application origin (overrides ERRCAT_BASE_URL / ERRCAT_ORIGIN / APP_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Catalog route path or absolute URL
    #[arg(long, global = true)]
    pub catalog_path: Option<String>,

    /// Fetch timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// SQLite database for the durable snapshot
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "no_store")]
    pub store: Option<PathBuf>,

    /// Run without the durable snapshot
    #[arg(long, global = true)]
    pub no_store: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the catalog (from the snapshot when fresh, else from the network)
    Warm(WarmArgs),
    /// Resolve an error payload to its display message
    Resolve(ResolveArgs),
    /// Look up a single catalog entry by code or key
    Lookup(LookupArgs),
    /// Show configuration and snapshot state (read-only, no network)
    Status,
    /// Drop the cached catalog and its durable snapshot
    Clear,
}

#[derive(Args, Debug)]
pub struct WarmArgs {
    /// Fetch even if a fresh catalog is available
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Error body (JSON or raw text); `-` reads stdin
    pub payload: String,

    /// Message used when neither the catalog nor the payload has one
    #[arg(long)]
    pub fallback: Option<String>,
}

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("id").required(true).args(["code", "key"])))]
pub struct LookupArgs {
    /// Numeric error code
    #[arg(long, allow_negative_numbers = true)]
    pub code: Option<i64>,

    /// Symbolic error key
    #[arg(long)]
    pub key: Option<String>,
}
