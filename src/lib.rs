pub mod adapters;
pub mod browser;
pub mod commands;
pub mod config;
pub mod database;
pub mod dom;
pub mod error;
pub mod host;

use clap::{Parser, Subcommand};
use commands::prefs::PrefsArgs;
use commands::TargetArgs;
use config::BridgeConfig;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "mcp-popover-bridge", version, about)]
pub struct Cli {
    /// Config file (defaults to <config dir>/mcp-popover-bridge/config.toml)
    #[arg(long, global = true, env = "MCP_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mount the popover control and keep it alive until Ctrl-C
    Run {
        /// Open or reuse a tab at this chat URL
        #[arg(long)]
        url: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Insert text into the chat input
    Insert {
        text: String,
        /// Send the message after inserting
        #[arg(long)]
        submit: bool,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Send the message currently in the chat input
    Submit {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Attach a file to the chat input
    Attach {
        path: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show the detected site theme
    Theme {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List supported sites
    Sites {
        /// Report which site supports this URL
        #[arg(long)]
        check: Option<String>,
    },
    /// Show or change the stored popover switches
    Prefs(PrefsArgs),
}

pub fn run() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = BridgeConfig::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(cli.command, &config))
}

async fn execute(command: Command, config: &BridgeConfig) -> anyhow::Result<()> {
    match command {
        Command::Run { url, target } => commands::session::run(config, &target, url.as_deref()).await,
        Command::Insert {
            text,
            submit,
            target,
        } => commands::actions::insert(config, &target, &text, submit).await,
        Command::Submit { target } => commands::actions::submit(config, &target).await,
        Command::Attach { path, target } => commands::actions::attach(config, &target, &path).await,
        Command::Theme { target } => commands::actions::theme(config, &target).await,
        Command::Sites { check } => commands::prefs::sites(check.as_deref()),
        Command::Prefs(args) => commands::prefs::prefs(config, &args),
    }
}
