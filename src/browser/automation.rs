use super::cdp::CdpDocument;
use super::chrome::{self, ChromeSession};
use crate::adapters::{profile_for, profile_for_url, SiteId, SiteProfile};
use crate::config::ChromeConfig;
use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A connected Chrome plus the chat tab the bridge drives.
pub struct BrowserSession {
    pub browser: Browser,
    pub document: Arc<CdpDocument>,
    pub profile: &'static SiteProfile,
    pub chrome: ChromeSession,
    handler: JoinHandle<()>,
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Connect to an already-running Chrome instance via CDP
pub async fn connect_to_chrome(port: u16) -> Result<(Browser, JoinHandle<()>)> {
    let debug_url = format!("http://127.0.0.1:{}", port);

    let (browser, mut handler) = Browser::connect(&debug_url)
        .await
        .with_context(|| format!("Failed to connect to Chrome on port {}", port))?;

    // The handler drives every CDP request; it must be polled for the session's lifetime.
    let task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                log::debug!("[cdp] handler event error: {}", e);
            }
        }
    });

    info!("Connected to Chrome CDP on port {}", port);
    Ok((browser, task))
}

/// Pick the tab to drive: the first one on a supported chat host (limited to
/// `site` when given). With none open, `site`'s home page is opened.
pub async fn find_chat_page(
    browser: &Browser,
    site: Option<SiteId>,
) -> Result<(Page, &'static SiteProfile)> {
    let pages = browser.pages().await.context("Failed to get pages")?;
    for page in pages {
        let url = match page.url().await {
            Ok(Some(url)) => url,
            Ok(None) => continue,
            Err(e) => {
                warn!("[session] cannot read tab url: {}", e);
                continue;
            }
        };
        let Some(profile) = profile_for_url(&url) else {
            continue;
        };
        if site.map_or(true, |wanted| wanted == profile.id) {
            info!("[session] using {} tab at {}", profile.name, url);
            return Ok((page, profile));
        }
    }

    let site = site.context("No Claude, ChatGPT or Gemini tab is open; pass --site to open one")?;
    let profile = profile_for(site);
    info!("[session] opening {}", profile.home_url);
    let page = browser
        .new_page(profile.home_url)
        .await
        .with_context(|| format!("Failed to open {}", profile.home_url))?;
    Ok((page, profile))
}

/// Use the tab already showing `url`, or open one.
pub async fn open_url_page(browser: &Browser, url: &str) -> Result<(Page, &'static SiteProfile)> {
    let profile = profile_for_url(url)
        .with_context(|| format!("{} is not on a Claude, ChatGPT or Gemini host", url))?;
    let pages = browser.pages().await.context("Failed to get pages")?;
    for page in pages {
        if let Ok(Some(current)) = page.url().await {
            if current == url {
                return Ok((page, profile));
            }
        }
    }
    info!("[session] opening {}", url);
    let page = browser
        .new_page(url)
        .await
        .with_context(|| format!("Failed to open {}", url))?;
    Ok((page, profile))
}

/// Attach to (or launch) Chrome per `config` and select the chat tab:
/// `url` when given, else the first tab of `site` (or of any site).
pub async fn open_session(
    config: &ChromeConfig,
    site: Option<SiteId>,
    url: Option<&str>,
) -> Result<BrowserSession> {
    let profile_dir = chrome::profile_dir(&config.profile)?;
    let start_url = url.unwrap_or(profile_for(site.unwrap_or(SiteId::Claude)).home_url);
    let mut session = chrome::prepare_chrome_session(config.port, &profile_dir, start_url).await?;
    info!(
        "[session] chrome port={} mode={}",
        session.port,
        session.mode.as_str()
    );
    session.port =
        chrome::wait_for_chrome_ready(&session, &profile_dir, config.startup_timeout_secs).await?;

    let (browser, handler) = connect_to_chrome(session.port).await?;
    let selected = match url {
        Some(url) => open_url_page(&browser, url).await,
        None => find_chat_page(&browser, site).await,
    };
    let (page, profile) = match selected {
        Ok(selected) => selected,
        Err(e) => {
            handler.abort();
            return Err(e);
        }
    };
    Ok(BrowserSession {
        browser,
        document: Arc::new(CdpDocument::new(page)),
        profile,
        chrome: session,
        handler,
    })
}
