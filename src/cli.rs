use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Recurring task operations for manufacturing plants.
/// Local commands work on a JSON store (default ~/.dms/dms.json);
/// `remote` commands talk to a running `dms serve`.
#[derive(Parser)]
#[command(name = "dms", version, about = "Plant task operations: recurring task masters, generation and lifecycle")]
pub struct Cli {
    /// Directory holding dms.toml, dms.json and prefs.json.
    #[arg(long, global = true, env = "DMS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to the JSON store file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to the TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user (id or email) for local changes. Defaults to the first
    /// active admin.
    #[arg(long = "as", global = true)]
    pub acting_as: Option<String>,

    /// Debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
