//! # wardboard - task assignment and progress board
//!
//! A command-line and terminal dashboard for assigning tasks between people in
//! a small organization, tracking them against plan, interim and final dates,
//! and closing them out with evidence (statistics, links, images).
//!
//! ## Key Features
//!
//! - **Derived status**: a task's displayed state comes from its stored status
//!   and its final deadline, so late work shows as overdue without anyone
//!   flipping a flag
//! - **Evidence**: each task carries an ordered list of statistics, links and
//!   images, written back as a whole on every change
//! - **Role and level hierarchy**: people are grouped by level (1 operator to
//!   4 staff) and role; pickers narrow level first, then role
//! - **Two backends**: a PostgREST-style HTTP datastore, or a local JSON file
//!   when no URL is configured
//! - **Text cleanup**: an optional external endpoint rewrites free-form task
//!   descriptions
//!
//! ## Quick Start
//!
//! ```bash
//! # Launch the dashboard
//! wb ui
//!
//! # Create a task
//! wb tasks add "Audit bed rails" --assignee 12 --final "next fri"
//!
//! # Attach evidence and close it out
//! wb evidence add 1718000000000 --kind stat --caption "Rails checked" --value 42
//! wb tasks status 1718000000000 done
//! ```
//!
//! Configuration lives in `~/.wardboard/config.json`, environment variables
//! (`WARDBOARD_URL`, `WARDBOARD_API_KEY`, ...) and global flags.

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod analyzer;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod dates;
pub mod error;
pub mod evidence;
pub mod fields;
pub mod format;
pub mod gateway;
pub mod hierarchy;
pub mod import;
pub mod role;
pub mod role_repo;
pub mod service;
pub mod status;
pub mod task;
pub mod user;
pub mod tui {
    pub mod app;
    pub mod colors;
    pub mod enums;
    pub mod input;
    pub mod run;
    pub mod utils;
}

use analyzer::{HttpAnalyzer, TextAnalyzer, Unconfigured};
use cli::Cli;
use cmd::*;
use config::{Backend, Config};
use gateway::local::LocalGateway;
use gateway::rest::RestGateway;
use gateway::Gateway;
use role_repo::RoleRepository;
use service::Board;

fn die(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{context}: {err}");
    std::process::exit(1);
}

/// Install the subscriber. The dashboard logs to a file so output does not
/// tear the alternate screen.
fn init_tracing(verbose: u8, config: &Config, to_file: bool) {
    let default = match verbose {
        0 => "wardboard=warn",
        1 => "wardboard=info",
        _ => "wardboard=debug",
    };
    let filter = EnvFilter::try_from_env("WARDBOARD_LOG").unwrap_or_else(|_| default.into());
    let registry = tracing_subscriber::registry().with(filter);

    if to_file {
        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            die(&format!("Failed to create data directory {}", config.data_dir.display()), e);
        }
        let path = config.log_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap_or_else(|e| die(&format!("Failed to open log file {}", path.display()), e));
        registry.with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file))).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn build_board(config: &Config) -> Board {
    let gateway: Gateway = match &config.backend {
        Backend::Rest { url, api_key } => match RestGateway::new(url, api_key, config.request_timeout) {
            Ok(g) => Arc::new(g),
            Err(e) => die("Failed to set up the HTTP client", e),
        },
        Backend::Local { path } => match LocalGateway::open(path.clone()) {
            Ok(g) => Arc::new(g),
            Err(e) => die(&format!("Failed to open board file {}", path.display()), e),
        },
    };
    tracing::debug!(backend = %gateway.describe(), "gateway ready");

    let roles = RoleRepository::load(config.store_path())
        .unwrap_or_else(|e| die("Failed to load the local role store", e));

    let analyzer: Arc<dyn TextAnalyzer> = match &config.analyzer_url {
        Some(url) => Arc::new(HttpAnalyzer::new(url.clone(), config.analyzer_timeout)),
        None => Arc::new(Unconfigured),
    };

    Board::new(gateway, roles, analyzer, config.settle)
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // No backend needed.
    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return;
    }

    let config = Config::load(&cli.overrides()).unwrap_or_else(|e| die("Invalid configuration", e));
    init_tracing(cli.verbose, &config, matches!(cli.command, Commands::Ui));

    let rt = Runtime::new().unwrap_or_else(|e| die("Failed to start the async runtime", e));
    let board = build_board(&config);

    if let Commands::Ui = cli.command {
        if let Err(e) = tui::run::run_tui(board, &rt) {
            die("Dashboard error", e);
        }
        return;
    }

    let mut session = Session { rt, board, json: cli.json };
    match cli.command {
        Commands::Ui | Commands::Completions { .. } => unreachable!("handled above"),
        Commands::Tasks { action } => cmd_tasks(&session, action),
        Commands::Evidence { action } => cmd_evidence(&session, action),
        Commands::Users { action } => cmd_users(&session, action),
        Commands::Roles { action } => cmd_roles(&mut session, action),
        Commands::Pick { level, role, user } => cmd_pick(&session, level, role, user),
        Commands::Stats { role } => cmd_stats(&session, role),
        Commands::Import { roles, users, tasks } => cmd_import(&session, roles, users, tasks),
    }
}
