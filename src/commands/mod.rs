pub mod actions;
pub mod prefs;
pub mod session;

use crate::adapters::SiteId;
use crate::config::ChromeConfig;
use clap::Args;

/// Which Chrome and which tab a command talks to.
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Attach to Chrome already listening on this debugging port
    #[arg(long, env = "MCP_BRIDGE_PORT")]
    pub port: Option<u16>,
    /// Chrome profile directory name under ~/.mcp-popover-bridge/profiles
    #[arg(long)]
    pub profile: Option<String>,
    /// Restrict tab selection to one site: claude, chatgpt or gemini
    #[arg(long, value_parser = parse_site)]
    pub site: Option<SiteId>,
}

impl TargetArgs {
    /// Command-line values override the config file.
    pub fn chrome_config(&self, base: &ChromeConfig) -> ChromeConfig {
        ChromeConfig {
            port: self.port.or(base.port),
            profile: self.profile.clone().unwrap_or_else(|| base.profile.clone()),
            startup_timeout_secs: base.startup_timeout_secs,
        }
    }
}

pub fn parse_site(raw: &str) -> Result<SiteId, String> {
    SiteId::parse(raw).ok_or_else(|| format!("unknown site '{}': use claude, chatgpt or gemini", raw))
}
