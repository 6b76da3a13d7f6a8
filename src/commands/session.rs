use super::TargetArgs;
use crate::adapters::{AdapterState, SiteAdapter};
use crate::browser::automation::{self, BrowserSession};
use crate::config::BridgeConfig;
use crate::database::Database;
use crate::host::events::{
    EventBus, SiteChangedPayload, ADAPTER_ACTIVATED, ADAPTER_DEACTIVATED, SITE_CHANGED,
    TOOL_EXECUTION_COMPLETED, TOOL_EXECUTION_FAILED,
};
use crate::host::PluginContext;
use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Chrome session, adapter and the context it was built with.
pub struct Bridge {
    pub session: BrowserSession,
    pub adapter: Arc<SiteAdapter>,
    pub ctx: PluginContext,
}

/// Open the browser side and build an adapter for the selected tab, backed
/// by the preference database.
pub async fn connect(config: &BridgeConfig, target: &TargetArgs, url: Option<&str>) -> Result<Bridge> {
    let chrome = target.chrome_config(&config.chrome);
    let session = automation::open_session(&chrome, target.site, url).await?;

    let db = Arc::new(Database::open(&config.database_path()?)?);
    let ctx = PluginContext::new(Arc::new(EventBus::new()), db.clone(), db);
    let adapter = SiteAdapter::new(
        session.profile,
        session.document.clone(),
        ctx.clone(),
        config.timing.clone(),
    )
    .context("Failed to create site adapter")?;
    Ok(Bridge {
        session,
        adapter,
        ctx,
    })
}

fn log_events(events: &EventBus) {
    for name in [
        ADAPTER_ACTIVATED,
        ADAPTER_DEACTIVATED,
        TOOL_EXECUTION_COMPLETED,
        TOOL_EXECUTION_FAILED,
    ] {
        events.on(name, move |payload| info!("[host] {} {}", name, payload));
    }
}

/// Run the adapter against the live tab until Ctrl-C: activate on chat
/// views, re-activate when the user navigates back to one, clean up on exit.
pub async fn run(config: &BridgeConfig, target: &TargetArgs, url: Option<&str>) -> Result<()> {
    let bridge = connect(config, target, url).await?;
    let adapter = bridge.adapter.clone();
    log_events(&bridge.ctx.events);

    let (tx, mut rx) = mpsc::unbounded_channel::<SiteChangedPayload>();
    bridge.ctx.events.on(SITE_CHANGED, move |payload| {
        match serde_json::from_value::<SiteChangedPayload>(payload.clone()) {
            Ok(change) => {
                let _ = tx.send(change);
            }
            Err(e) => warn!("[host] malformed site change: {}", e),
        }
    });

    adapter.initialize().await;
    if adapter.is_supported().await {
        adapter.activate().await;
    } else {
        info!(
            "[{}] waiting for a chat view before activating",
            adapter.profile().name
        );
    }
    info!("Bridge running on port {}. Press Ctrl-C to stop.", bridge.session.chrome.port);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("[host] cannot listen for Ctrl-C: {}", e);
                }
                break;
            }
            change = rx.recv() => {
                let Some(change) = change else { break };
                info!("[host] {} supported={}", change.url, change.supported);
                let state = adapter.state();
                if change.supported && matches!(state, AdapterState::Initializing | AdapterState::Inactive) {
                    adapter.activate().await;
                }
            }
        }
    }

    adapter.cleanup().await;
    info!("Bridge stopped");
    Ok(())
}
