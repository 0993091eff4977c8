use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;
use crate::config::Overrides;

/// Task assignment and progress board.
/// Uses the REST backend when a URL is configured, else a local JSON file.
#[derive(Parser)]
#[command(name = "wb", version, about = "Task assignment and progress board")]
pub struct Cli {
    /// Backend base URL (overrides WARDBOARD_URL).
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Backend API key (overrides WARDBOARD_API_KEY).
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Use a local JSON board file instead of any configured URL.
    #[arg(long, global = true)]
    pub local: Option<PathBuf>,

    /// Directory holding config.json, the local role store and logs.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// More log output (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print results and failures as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            local: self.local.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}
