use super::session;
use super::TargetArgs;
use crate::config::BridgeConfig;
use crate::dom::FilePayload;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Insert `text` into the chat input of the selected tab, optionally sending it.
pub async fn insert(config: &BridgeConfig, target: &TargetArgs, text: &str, submit: bool) -> Result<()> {
    let bridge = session::connect(config, target, None).await?;
    let name = bridge.adapter.profile().name;
    if !bridge.adapter.insert_text(text).await {
        bail!("Could not insert text into the {} chat input", name);
    }
    println!("Inserted {} characters into {}", text.chars().count(), name);
    if submit && !bridge.adapter.submit_form().await {
        bail!("Text inserted but {} did not accept the submit", name);
    }
    if submit {
        println!("Submitted");
    }
    Ok(())
}

pub async fn submit(config: &BridgeConfig, target: &TargetArgs) -> Result<()> {
    let bridge = session::connect(config, target, None).await?;
    if !bridge.adapter.submit_form().await {
        bail!("Could not submit the {} chat message", bridge.adapter.profile().name);
    }
    println!("Submitted");
    Ok(())
}

pub async fn attach(config: &BridgeConfig, target: &TargetArgs, path: &Path) -> Result<()> {
    let file = FilePayload::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if file.is_empty() {
        bail!("{} is empty", path.display());
    }
    let bridge = session::connect(config, target, None).await?;
    if !bridge.adapter.attach_file(&file).await {
        bail!(
            "Could not attach {} to {}",
            file.name,
            bridge.adapter.profile().name
        );
    }
    println!("Attached {} ({}, {} bytes)", file.name, file.mime_type, file.bytes.len());
    Ok(())
}

/// Print the tab's detected theme and the palette the control uses.
pub async fn theme(config: &BridgeConfig, target: &TargetArgs) -> Result<()> {
    let bridge = session::connect(config, target, None).await?;
    let theme = bridge.adapter.theme().await;
    let report = serde_json::json!({
        "site": bridge.adapter.profile().id,
        "theme": theme,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
