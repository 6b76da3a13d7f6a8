use super::locator::locate;
use super::{Document, ElementHandle, KeyPhase, SyntheticEvent};
use crate::error::{AdapterError, AdapterResult};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

pub const SUBMIT_POLL_INTERVAL_MS: u64 = 200;

/// Which path finally submitted the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPath {
    ButtonClick,
    FormSubmit,
    EnterKey,
}

impl SubmitPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ButtonClick => "button_click",
            Self::FormSubmit => "form_submit",
            Self::EnterKey => "enter_key",
        }
    }
}

/// Submit the chat message typed into `input`.
///
/// Waits up to `max_wait` for the send button to become enabled, then falls
/// back to a form submit event, then to an Enter key sequence. The fallbacks
/// count as success: event dispatch cannot tell whether the page reacted.
pub async fn submit(
    doc: &dyn Document,
    input: &ElementHandle,
    button_selectors: &[&str],
    poll_interval: Duration,
    max_wait: Duration,
) -> AdapterResult<SubmitPath> {
    if locate(doc, button_selectors, None).await.is_some() {
        if click_when_enabled(doc, button_selectors, poll_interval, max_wait).await {
            return Ok(SubmitPath::ButtonClick);
        }
        info!(
            "[submit] send button stayed disabled for {}ms, falling back",
            max_wait.as_millis()
        );
    } else {
        debug!("[submit] no send button found, falling back");
    }
    fallback(doc, input).await
}

async fn click_when_enabled(
    doc: &dyn Document,
    button_selectors: &[&str],
    poll_interval: Duration,
    max_wait: Duration,
) -> bool {
    let start = Instant::now();
    if try_click(doc, button_selectors).await {
        return true;
    }

    // The first tick completes immediately, right after the pre-check above.
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        if try_click(doc, button_selectors).await {
            return true;
        }
        if start.elapsed() >= max_wait {
            return false;
        }
    }
}

/// Re-resolve the button (the page may have re-rendered it) and click it
/// only if it is enabled right now.
async fn try_click(doc: &dyn Document, button_selectors: &[&str]) -> bool {
    let Some(button) = locate(doc, button_selectors, None).await else {
        return false;
    };
    match doc.inspect(&button).await {
        Ok(state) if state.is_enabled() => match doc.click(&button).await {
            Ok(()) => {
                debug!("[submit] clicked send button {}", button);
                true
            }
            Err(e) => {
                warn!("[submit] click on {} failed: {}", button, e);
                false
            }
        },
        Ok(_) => false,
        Err(e) => {
            debug!("[submit] send button {} unreadable: {}", button, e);
            false
        }
    }
}

async fn fallback(doc: &dyn Document, input: &ElementHandle) -> AdapterResult<SubmitPath> {
    let form = doc.closest(input, "form").await.unwrap_or_else(|e| {
        debug!("[submit] form lookup failed: {}", e);
        None
    });

    if let Some(form) = form {
        doc.dispatch(&form, SyntheticEvent::Submit)
            .await
            .map_err(|e| AdapterError::InjectionFailed(format!("form submit: {}", e)))?;
        return Ok(SubmitPath::FormSubmit);
    }

    for phase in [KeyPhase::Down, KeyPhase::Press, KeyPhase::Up] {
        doc.dispatch(input, SyntheticEvent::Key { phase, key: "Enter" })
            .await
            .map_err(|e| AdapterError::InjectionFailed(format!("enter key: {}", e)))?;
    }
    Ok(SubmitPath::EnterKey)
}
