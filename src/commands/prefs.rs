use crate::adapters::{all_profiles, UrlMatcher};
use crate::config::BridgeConfig;
use crate::database::{queries, Database};
use crate::host::events::ExecutionResult;
use crate::host::stores::{PreferencesUpdate, ToggleState, ToolStore, UiStore};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

#[derive(Debug, Clone, Default, Args)]
pub struct PrefsArgs {
    #[arg(long)]
    pub mcp_enabled: Option<bool>,
    #[arg(long)]
    pub auto_insert: Option<bool>,
    #[arg(long)]
    pub auto_submit: Option<bool>,
    #[arg(long)]
    pub auto_execute: Option<bool>,
    /// Also list this many of the latest tool executions
    #[arg(long, default_value_t = 0)]
    pub history: usize,
}

impl PrefsArgs {
    fn update(&self) -> PreferencesUpdate {
        PreferencesUpdate {
            auto_insert: self.auto_insert,
            auto_submit: self.auto_submit,
            auto_execute: self.auto_execute,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrefsReport {
    #[serde(flatten)]
    toggles: ToggleState,
    sidebar_visible: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recent_executions: Vec<ExecutionResult>,
}

/// Apply any given switches, then print the stored state.
pub fn prefs(config: &BridgeConfig, args: &PrefsArgs) -> Result<()> {
    let db = Database::open(&config.database_path()?)?;
    apply(&db, args)?;
    let report = PrefsReport {
        toggles: db.toggle_state(),
        sidebar_visible: db.sidebar_visible(),
        recent_executions: db
            .recent_executions(args.history)
            .context("Failed to read execution history")?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    let changes = queries::recent_preference_changes(&db.lock(), 5)?;
    for change in changes {
        log::debug!(
            "[prefs] {} {}={} {}",
            change.changed_at,
            change.key,
            change.value,
            change.reason.unwrap_or_default()
        );
    }
    Ok(())
}

fn apply(store: &dyn UiStore, args: &PrefsArgs) -> Result<()> {
    if let Some(enabled) = args.mcp_enabled {
        store
            .set_mcp_enabled(enabled, "command line")
            .context("Failed to store mcp_enabled")?;
    }
    let update = args.update();
    if !update.is_empty() {
        store
            .update_preferences(update)
            .context("Failed to store preferences")?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SiteReport {
    site: &'static str,
    name: &'static str,
    hosts: &'static [&'static str],
    home: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    supported: Option<bool>,
}

/// List the supported sites; with `check`, say which of them would drive `check`.
pub fn sites(check: Option<&str>) -> Result<()> {
    let mut reports = Vec::new();
    for profile in all_profiles() {
        let supported = match check {
            Some(url) => Some(
                UrlMatcher::new(profile)
                    .with_context(|| format!("Invalid URL patterns for {}", profile.name))?
                    .is_supported(url),
            ),
            None => None,
        };
        reports.push(SiteReport {
            site: profile.id.as_str(),
            name: profile.name,
            hosts: profile.hostnames,
            home: profile.home_url,
            supported,
        });
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
