use super::profile::{hostname_of, SiteProfile, UrlMatcher};
use crate::config::TimingConfig;
use crate::dom::locator::locate;
use crate::dom::theme::{self, Theme};
use crate::dom::{injector, submit, ControlView, Document, ElementHandle, FilePayload, MountOutcome};
use crate::error::{AdapterError, AdapterResult};
use crate::host::events::{
    ExecutionFailure, ExecutionResult, ExecutionStatus, LifecyclePayload, SidebarTogglePayload,
    SiteChangedPayload, SubscriptionId, ADAPTER_ACTIVATED, ADAPTER_DEACTIVATED, SIDEBAR_TOGGLE,
    SITE_CHANGED, TOOL_EXECUTION_COMPLETED, TOOL_EXECUTION_FAILED,
};
use crate::host::stores::DetectedTool;
use crate::host::PluginContext;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Capabilities whose own completion events must not trigger auto-insert.
const OWN_TOOLS: &[&str] = &["insertText", "submitForm", "attachFile"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterState {
    Uninitialized,
    Initializing,
    Active,
    Inactive,
    Disabled,
}

/// The control this adapter mounted. `None` on the adapter iff it has
/// nothing mounted.
#[derive(Debug, Clone)]
pub struct InjectionHandle {
    pub container_id: String,
    pub anchor: ElementHandle,
    pub view: Option<ControlView>,
}

#[derive(Debug, Default)]
struct SetupFlags {
    store_listeners: bool,
    dom_observers: bool,
    ui_integration: bool,
    style_injected: bool,
}

#[derive(Debug, Default)]
struct Timers {
    url_poll: Option<JoinHandle<()>>,
    container_watch: Option<JoinHandle<()>>,
    ui_retry: Option<JoinHandle<()>>,
    /// Verdict of the integration currently in `ui_retry`, tagged with its generation.
    ui_outcome: Option<(u64, watch::Receiver<Option<bool>>)>,
    ui_generation: u64,
    navigation: Vec<JoinHandle<()>>,
}

impl Timers {
    fn pending(&mut self) -> usize {
        self.navigation.retain(|task| !task.is_finished());
        let live = |slot: &Option<JoinHandle<()>>| {
            slot.as_ref().map_or(false, |task| !task.is_finished())
        };
        [&self.url_poll, &self.container_watch, &self.ui_retry]
            .into_iter()
            .filter(|slot| live(*slot))
            .count()
            + self.navigation.len()
    }

    /// Everything tied to the mounted control; the URL poll stays.
    fn take_ui(&mut self) -> Vec<JoinHandle<()>> {
        let mut tasks: Vec<JoinHandle<()>> = self.navigation.drain(..).collect();
        tasks.extend(self.container_watch.take());
        tasks.extend(self.ui_retry.take());
        self.ui_outcome = None;
        tasks
    }
}

#[derive(Debug)]
struct AdapterInner {
    state: AdapterState,
    last_url: Option<String>,
    flags: SetupFlags,
    handle: Option<InjectionHandle>,
    timers: Timers,
    subscriptions: Vec<SubscriptionId>,
}

/// One site's integration: lifecycle state machine, URL polling and the
/// idempotent mount of the popover control.
pub struct SiteAdapter {
    profile: &'static SiteProfile,
    matcher: UrlMatcher,
    doc: Arc<dyn Document>,
    ctx: PluginContext,
    timing: TimingConfig,
    instance: usize,
    executions: AtomicU64,
    inner: Mutex<AdapterInner>,
    mount_gate: tokio::sync::Mutex<()>,
    this: Weak<SiteAdapter>,
}

impl SiteAdapter {
    pub fn new(
        profile: &'static SiteProfile,
        doc: Arc<dyn Document>,
        ctx: PluginContext,
        timing: TimingConfig,
    ) -> AdapterResult<Arc<Self>> {
        let matcher = UrlMatcher::new(profile).map_err(|e| {
            AdapterError::Unsupported(format!("{} url pattern: {}", profile.name, e))
        })?;
        let instance = ctx.registry.next_instance();
        if instance > 1 {
            debug!("[{}] adapter instance {} created", profile.name, instance);
        }
        Ok(Arc::new_cyclic(|this| Self {
            profile,
            matcher,
            doc,
            ctx,
            timing,
            instance,
            executions: AtomicU64::new(0),
            inner: Mutex::new(AdapterInner {
                state: AdapterState::Uninitialized,
                last_url: None,
                flags: SetupFlags::default(),
                handle: None,
                timers: Timers::default(),
                subscriptions: Vec::new(),
            }),
            mount_gate: tokio::sync::Mutex::new(()),
            this: this.clone(),
        }))
    }

    fn inner(&self) -> MutexGuard<'_, AdapterInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn profile(&self) -> &'static SiteProfile {
        self.profile
    }

    pub fn instance(&self) -> usize {
        self.instance
    }

    pub fn state(&self) -> AdapterState {
        self.inner().state
    }

    pub fn injection(&self) -> Option<InjectionHandle> {
        self.inner().handle.clone()
    }

    /// Outstanding interval and timeout tasks owned by this adapter.
    pub fn pending_timers(&self) -> usize {
        self.inner().timers.pending()
    }

    // ---------- lifecycle ----------

    pub async fn initialize(&self) {
        {
            let mut inner = self.inner();
            let state = inner.state;
            match state {
                AdapterState::Initializing | AdapterState::Active => {
                    warn!(
                        "[{}] initialize ignored: adapter already {:?}",
                        self.profile.name, state
                    );
                    return;
                }
                AdapterState::Disabled => {
                    warn!("[{}] initialize ignored: adapter disabled", self.profile.name);
                    return;
                }
                AdapterState::Uninitialized | AdapterState::Inactive => {
                    inner.state = AdapterState::Initializing;
                }
            }
        }

        let url = self.doc.current_url().await.unwrap_or_else(|e| {
            warn!("[{}] cannot read page url: {}", self.profile.name, e);
            String::new()
        });
        info!(
            "[{}] initializing adapter instance {} at {}",
            self.profile.name, self.instance, url
        );
        self.inner().last_url = Some(url);
        self.start_url_poll();
        self.register_bus_handlers();
    }

    /// Returns whether the control ended up present in the page.
    pub async fn activate(&self) -> bool {
        if self.state() == AdapterState::Uninitialized {
            self.initialize().await;
        }
        {
            let mut inner = self.inner();
            let state = inner.state;
            match state {
                AdapterState::Active => {
                    debug!("[{}] activate ignored: already active", self.profile.name);
                    return inner.handle.is_some() || inner.flags.ui_integration;
                }
                AdapterState::Disabled => {
                    warn!("[{}] activate ignored: adapter disabled", self.profile.name);
                    return false;
                }
                _ => inner.state = AdapterState::Active,
            }
        }

        info!("[{}] activating", self.profile.name);
        self.register_bus_handlers();
        self.inject_styles(false).await;
        self.start_container_watch();
        let mounted = self.integrate_ui().await;
        if !mounted {
            warn!(
                "[{}] control not mounted; it will be retried on the next navigation",
                self.profile.name
            );
        }

        if self.state() == AdapterState::Active {
            self.ctx
                .events
                .emit(ADAPTER_ACTIVATED, &self.lifecycle_payload(None));
        }
        mounted
    }

    pub async fn deactivate(&self) {
        let state = self.state();
        if matches!(
            state,
            AdapterState::Inactive | AdapterState::Disabled | AdapterState::Uninitialized
        ) {
            debug!("[{}] deactivate ignored: adapter {:?}", self.profile.name, state);
            return;
        }
        info!("[{}] deactivating", self.profile.name);
        self.teardown().await;
        self.inner().state = AdapterState::Inactive;
        self.ctx
            .events
            .emit(ADAPTER_DEACTIVATED, &self.lifecycle_payload(None));
    }

    /// Deactivate, then release everything `initialize` and `activate` set up.
    pub async fn cleanup(&self) {
        self.deactivate().await;
        self.teardown().await;

        let url_poll = self.inner().timers.url_poll.take();
        if let Some(task) = url_poll {
            task.abort();
        }

        let stylesheet_id = self.profile.stylesheet_id;
        if let Err(e) = self.doc.remove_by_id(stylesheet_id).await {
            debug!("[{}] stylesheet remove() failed: {}", self.profile.name, e);
            if let Err(e) = self.doc.detach_by_id(stylesheet_id).await {
                warn!("[{}] stylesheet could not be removed: {}", self.profile.name, e);
            }
        }

        let mut inner = self.inner();
        inner.flags = SetupFlags::default();
        inner.last_url = None;
        inner.state = AdapterState::Uninitialized;
        info!("[{}] cleaned up", self.profile.name);
    }

    /// Terminal override: tear the control down and refuse further lifecycle calls
    /// until `cleanup`.
    pub async fn disable(&self) {
        if self.state() == AdapterState::Disabled {
            return;
        }
        self.teardown().await;
        self.inner().state = AdapterState::Disabled;
        warn!("[{}] adapter disabled", self.profile.name);
        self.ctx.events.emit(
            ADAPTER_DEACTIVATED,
            &self.lifecycle_payload(Some("disabled".into())),
        );
    }

    /// Stop UI timers, drop bus handlers, unmount. Safe to repeat.
    async fn teardown(&self) {
        let (tasks, subscriptions) = {
            let mut inner = self.inner();
            inner.flags.store_listeners = false;
            inner.flags.dom_observers = false;
            inner.flags.ui_integration = false;
            (
                inner.timers.take_ui(),
                std::mem::take(&mut inner.subscriptions),
            )
        };
        for task in tasks {
            task.abort();
        }
        for subscription in subscriptions {
            self.ctx.events.off(subscription);
        }
        self.unmount_control().await;
    }

    // ---------- navigation ----------

    fn start_url_poll(&self) {
        let mut inner = self.inner();
        if inner.timers.url_poll.is_some() {
            return;
        }
        let weak = self.this.clone();
        let period = self.timing.url_poll();
        inner.timers.url_poll = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(adapter) = weak.upgrade() else { break };
                adapter.check_url().await;
            }
        }));
    }

    async fn check_url(&self) {
        let url = match self.doc.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!("[{}] url poll failed: {}", self.profile.name, e);
                return;
            }
        };
        let previous = {
            let mut inner = self.inner();
            if inner.last_url.as_deref() == Some(url.as_str()) {
                return;
            }
            inner.last_url.replace(url.clone())
        };
        info!(
            "[{}] url changed: {} -> {}",
            self.profile.name,
            previous.as_deref().unwrap_or("-"),
            url
        );

        let old_host = previous.as_deref().and_then(hostname_of);
        let new_host = hostname_of(&url);
        if old_host != new_host {
            if let Some(host) = new_host.as_deref() {
                self.on_host_changed(host).await;
            }
        }
        self.on_page_changed(&url).await;
    }

    pub async fn on_page_changed(&self, url: &str) {
        let supported = self.matcher.is_supported(url);
        if supported {
            if self.state() == AdapterState::Active {
                self.inject_styles(true).await;
                self.schedule_reintegration();
            }
        } else {
            info!("[{}] {} is not a chat view, removing control", self.profile.name, url);
            self.cancel_ui_retries();
            self.inner().flags.ui_integration = false;
            self.unmount_control().await;
        }

        self.ctx.events.emit(
            SITE_CHANGED,
            &SiteChangedPayload {
                plugin_name: self.profile.plugin_name.to_string(),
                url: url.to_string(),
                hostname: hostname_of(url).unwrap_or_default(),
                supported,
                timestamp: now_millis(),
            },
        );
    }

    pub async fn on_host_changed(&self, host: &str) {
        if !self.matcher.host_allowed(host) {
            info!("[{}] host {} is not supported", self.profile.name, host);
            self.ctx.events.emit(
                ADAPTER_DEACTIVATED,
                &self.lifecycle_payload(Some(format!("unsupported host {}", host))),
            );
            return;
        }
        if self.state() == AdapterState::Active {
            let weak = self.this.clone();
            self.spawn_tracked(async move {
                if let Some(adapter) = weak.upgrade() {
                    adapter.integrate_ui().await;
                }
            });
        }
    }

    /// Re-run UI integration after a client-side navigation, then check the
    /// control survived the page settling.
    fn schedule_reintegration(&self) {
        let weak = self.this.clone();
        let delay = self.timing.navigation_delay();
        let verify = self.timing.navigation_verify();
        self.spawn_tracked(async move {
            tokio::time::sleep(delay).await;
            {
                let Some(adapter) = weak.upgrade() else { return };
                if adapter.state() != AdapterState::Active {
                    return;
                }
                adapter.integrate_ui().await;
            }
            tokio::time::sleep(verify).await;
            if let Some(adapter) = weak.upgrade() {
                adapter.restore_control().await;
            }
        });
    }

    fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut inner = self.inner();
        inner.timers.navigation.retain(|task| !task.is_finished());
        inner.timers.navigation.push(handle);
    }

    fn cancel_ui_retries(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut inner = self.inner();
            let mut tasks: Vec<_> = inner.timers.navigation.drain(..).collect();
            tasks.extend(inner.timers.ui_retry.take());
            inner.timers.ui_outcome = None;
            tasks
        };
        for task in tasks {
            task.abort();
        }
    }

    // ---------- UI integration ----------

    async fn inject_styles(&self, force: bool) {
        if !force && self.inner().flags.style_injected {
            return;
        }
        match self
            .doc
            .inject_style(self.profile.stylesheet_id, self.profile.stylesheet)
            .await
        {
            Ok(created) => {
                if created {
                    debug!("[{}] stylesheet injected", self.profile.name);
                }
                self.inner().flags.style_injected = true;
            }
            Err(e) => warn!("[{}] stylesheet injection failed: {}", self.profile.name, e),
        }
    }

    /// Poll for the control container disappearing (host re-renders wipe
    /// injected nodes) and put it back.
    fn start_container_watch(&self) {
        let mut inner = self.inner();
        if inner.flags.dom_observers {
            return;
        }
        inner.flags.dom_observers = true;
        let weak = self.this.clone();
        let period = self.timing.container_watch();
        inner.timers.container_watch = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(adapter) = weak.upgrade() else { break };
                adapter.restore_control().await;
                adapter.apply_control_clicks().await;
            }
        }));
    }

    /// Each click on the rendered control flips the MCP switch.
    async fn apply_control_clicks(&self) {
        if self.inner().handle.is_none() {
            return;
        }
        let clicks = match self.doc.take_control_clicks(self.ctx.registry.container_id()).await {
            Ok(clicks) => clicks,
            Err(e) => {
                debug!("[{}] reading control clicks failed: {}", self.profile.name, e);
                return;
            }
        };
        if clicks % 2 == 0 {
            return;
        }
        let enabled = !self.ctx.ui.toggle_state().mcp_enabled;
        info!("[{}] control clicked, mcp enabled={}", self.profile.name, enabled);
        self.set_mcp_enabled(enabled).await;
    }

    /// Re-mount the control if this adapter integrated it and it is gone.
    async fn restore_control(&self) {
        let expected = {
            let inner = self.inner();
            inner.state == AdapterState::Active && inner.flags.ui_integration
        };
        if !expected {
            return;
        }
        match self.doc.exists_by_id(self.ctx.registry.container_id()).await {
            Ok(true) => {}
            Ok(false) => {
                info!("[{}] control container was removed, restoring", self.profile.name);
                self.inner().handle = None;
                if let Err(e) = self.mount_control().await {
                    debug!("[{}] restore failed: {}", self.profile.name, e);
                }
            }
            Err(e) => debug!("[{}] container check failed: {}", self.profile.name, e),
        }
    }

    /// Run the bounded insertion-point wait and mount retries as an owned
    /// task and wait for its verdict.
    async fn integrate_ui(&self) -> bool {
        let integrated = self.inner().flags.ui_integration;
        if integrated {
            match self.doc.exists_by_id(self.ctx.registry.container_id()).await {
                Ok(true) => {
                    debug!("[{}] UI already integrated", self.profile.name);
                    return true;
                }
                _ => self.inner().flags.ui_integration = false,
            }
        }

        let (tx, rx) = watch::channel(None);
        let weak = self.this.clone();
        let task = tokio::spawn(async move {
            let mounted = match weak.upgrade() {
                Some(adapter) => adapter.run_ui_integration().await,
                None => false,
            };
            let _ = tx.send(Some(mounted));
        });
        let (generation, previous) = {
            let mut inner = self.inner();
            inner.timers.ui_generation += 1;
            let generation = inner.timers.ui_generation;
            inner.timers.ui_outcome = Some((generation, rx.clone()));
            (generation, inner.timers.ui_retry.replace(task))
        };
        if let Some(previous) = previous {
            previous.abort();
        }
        self.await_integration(generation, rx).await
    }

    /// Wait for an integration verdict. An integration superseded by a newer
    /// one hands its waiters over to the newer one; a cancelled one is `false`.
    async fn await_integration(
        &self,
        mut generation: u64,
        mut rx: watch::Receiver<Option<bool>>,
    ) -> bool {
        loop {
            let changed = rx.changed().await;
            if let Some(mounted) = *rx.borrow() {
                return mounted;
            }
            if changed.is_ok() {
                continue;
            }
            let next = self.inner().timers.ui_outcome.clone();
            match next {
                Some((newer, next_rx)) if newer > generation => {
                    debug!(
                        "[{}] integration {} superseded by {}",
                        self.profile.name, generation, newer
                    );
                    generation = newer;
                    rx = next_rx;
                }
                _ => return false,
            }
        }
    }

    async fn run_ui_integration(&self) -> bool {
        let name = self.profile.name;
        let timing = &self.timing;

        tokio::time::sleep(timing.insertion_first_check()).await;
        let attempts = timing.insertion_attempts();
        let mut found = false;
        for attempt in 1..=attempts {
            if locate(self.doc.as_ref(), self.profile.insertion_point_selectors, None)
                .await
                .is_some()
            {
                found = true;
                break;
            }
            debug!("[{}] insertion point not ready ({}/{})", name, attempt, attempts);
            if attempt < attempts {
                tokio::time::sleep(timing.insertion_poll()).await;
            }
        }
        if !found {
            warn!("[{}] no insertion point after {} attempts", name, attempts);
            return false;
        }

        let attempts = timing.mount_attempts();
        for attempt in 1..=attempts {
            match self.mount_control().await {
                Ok(outcome) => {
                    debug!("[{}] mount outcome {:?}", name, outcome);
                    self.inner().flags.ui_integration = true;
                    return true;
                }
                Err(e) => warn!("[{}] mount attempt {}/{} failed: {}", name, attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(timing.mount_poll()).await;
            }
        }
        error!("[{}] gave up mounting the control after {} attempts", name, attempts);
        false
    }

    /// Check-then-mount under the mount gate. An existing container, ours or
    /// another instance's, makes this a no-op.
    async fn mount_control(&self) -> AdapterResult<MountOutcome> {
        let _gate = self.mount_gate.lock().await;
        let registry = &self.ctx.registry;
        let id = registry.container_id();

        if self.doc.exists_by_id(id).await? {
            return Ok(MountOutcome::AlreadyPresent);
        }
        if !registry.claim(self.instance) {
            debug!(
                "[{}] control owned by instance {:?}",
                self.profile.name,
                registry.owner()
            );
            return Ok(MountOutcome::AlreadyPresent);
        }

        match self.mount_and_render(id).await {
            Ok(Some(handle)) => {
                info!("[{}] control mounted", self.profile.name);
                self.inner().handle = Some(handle);
                Ok(MountOutcome::Mounted)
            }
            Ok(None) => {
                registry.release(self.instance);
                Ok(MountOutcome::AlreadyPresent)
            }
            Err(e) => {
                registry.release(self.instance);
                Err(e)
            }
        }
    }

    async fn mount_and_render(&self, id: &str) -> AdapterResult<Option<InjectionHandle>> {
        let anchor = locate(self.doc.as_ref(), self.profile.insertion_point_selectors, None)
            .await
            .ok_or_else(|| AdapterError::ElementNotFound("insertion point".into()))?;

        if self
            .doc
            .mount_container(id, &anchor, self.profile.placement)
            .await?
            == MountOutcome::AlreadyPresent
        {
            return Ok(None);
        }

        let view = self.control_view().await;
        let rendered = match self.doc.render_control(id, &view).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AdapterError::RenderFailed(
                "container vanished before render".into(),
            )),
            Err(e) => Err(AdapterError::RenderFailed(e.to_string())),
        };
        if let Err(e) = rendered {
            if let Err(remove_err) = self.doc.remove_by_id(id).await {
                debug!("[{}] cleanup after render failure: {}", self.profile.name, remove_err);
            }
            return Err(e);
        }

        Ok(Some(InjectionHandle {
            container_id: id.to_string(),
            anchor,
            view: Some(view),
        }))
    }

    async fn unmount_control(&self) {
        let _gate = self.mount_gate.lock().await;
        let registry = &self.ctx.registry;
        let handle = self.inner().handle.take();
        let owned = registry.owner() == Some(self.instance);
        if handle.is_none() && !owned {
            return;
        }
        let id = handle
            .as_ref()
            .map(|h| h.container_id.clone())
            .unwrap_or_else(|| registry.container_id().to_string());

        if handle.as_ref().map_or(false, |h| h.view.is_some()) {
            if let Err(e) = self.doc.clear_container(&id).await {
                debug!("[{}] clearing control failed: {}", self.profile.name, e);
            }
        }
        if let Err(e) = self.doc.remove_by_id(&id).await {
            warn!("[{}] remove() failed ({}), detaching from parent", self.profile.name, e);
            if let Err(e) = self.doc.detach_by_id(&id).await {
                error!("[{}] control could not be removed: {}", self.profile.name, e);
            }
        }
        registry.release(self.instance);
        info!("[{}] control unmounted", self.profile.name);
    }

    async fn control_view(&self) -> ControlView {
        let theme = theme::detect(self.doc.as_ref(), self.profile.id).await;
        let toggles = self.ctx.ui.toggle_state();
        ControlView {
            label: "MCP".into(),
            title: format!(
                "MCP tools for {} ({})",
                self.profile.name,
                if toggles.mcp_enabled { "on" } else { "off" }
            ),
            active: toggles.mcp_enabled,
            background: theme.palette.surface.to_string(),
            foreground: theme.palette.text.to_string(),
            border: theme.palette.border.to_string(),
            accent: theme.palette.accent.to_string(),
        }
    }

    /// Flip the MCP switch in the store and redraw the control.
    pub async fn set_mcp_enabled(&self, enabled: bool) -> bool {
        if let Err(e) = self.ctx.ui.set_mcp_enabled(enabled, "popover toggle") {
            warn!("[{}] storing mcp toggle failed: {}", self.profile.name, e);
            return false;
        }
        let container = self.inner().handle.as_ref().map(|h| h.container_id.clone());
        let Some(container) = container else {
            return true;
        };
        let view = self.control_view().await;
        match self.doc.render_control(&container, &view).await {
            Ok(true) => {
                if let Some(handle) = self.inner().handle.as_mut() {
                    handle.view = Some(view);
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("[{}] redraw failed: {}", self.profile.name, e);
                false
            }
        }
    }

    // ---------- bus handlers ----------

    fn register_bus_handlers(&self) {
        let mut inner = self.inner();
        if inner.flags.store_listeners {
            return;
        }
        inner.flags.store_listeners = true;

        let weak = self.this.clone();
        let completed = self.ctx.events.on(TOOL_EXECUTION_COMPLETED, move |payload| {
            if let Some(adapter) = weak.upgrade() {
                adapter.handle_tool_completed(payload);
            }
        });
        let weak = self.this.clone();
        let toggled = self.ctx.events.on(SIDEBAR_TOGGLE, move |payload| {
            if let Some(adapter) = weak.upgrade() {
                adapter.handle_sidebar_toggle(payload);
            }
        });
        inner.subscriptions.extend([completed, toggled]);
    }

    fn handle_tool_completed(&self, payload: &Value) {
        let execution: ExecutionResult = match serde_json::from_value(payload.clone()) {
            Ok(execution) => execution,
            Err(e) => {
                debug!("[{}] ignoring malformed execution event: {}", self.profile.name, e);
                return;
            }
        };
        if OWN_TOOLS.contains(&execution.tool_name.as_str()) {
            return;
        }

        if let Err(e) = self.ctx.tools.record_execution(&execution) {
            warn!("[{}] recording execution failed: {}", self.profile.name, e);
        }
        let tool = DetectedTool {
            name: execution.tool_name.clone(),
            server: None,
            detected_at: execution.timestamp,
        };
        if let Err(e) = self.ctx.tools.add_detected_tool(tool) {
            warn!("[{}] recording tool failed: {}", self.profile.name, e);
        }

        let toggles = self.ctx.ui.toggle_state();
        if execution.status != ExecutionStatus::Success
            || !toggles.mcp_enabled
            || !toggles.auto_insert
        {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("[{}] auto-insert skipped: no async runtime", self.profile.name);
            return;
        }
        let weak = self.this.clone();
        let text = format_execution_result(&execution);
        let auto_submit = toggles.auto_submit;
        // Tracked so teardown aborts a submit still polling for the button.
        self.spawn_tracked(async move {
            let Some(adapter) = weak.upgrade() else { return };
            if adapter.insert_text(&text).await && auto_submit {
                adapter.submit_form().await;
            }
        });
    }

    fn handle_sidebar_toggle(&self, payload: &Value) {
        match serde_json::from_value::<SidebarTogglePayload>(payload.clone()) {
            Ok(toggle) => {
                debug!("[{}] sidebar visible={}", self.profile.name, toggle.visible);
                if let Err(e) = self.ctx.ui.set_sidebar_visible(toggle.visible) {
                    warn!("[{}] storing sidebar state failed: {}", self.profile.name, e);
                }
            }
            Err(e) => debug!("[{}] ignoring malformed sidebar event: {}", self.profile.name, e),
        }
    }

    // ---------- capabilities ----------

    pub fn is_supported_url(&self, url: &str) -> bool {
        self.matcher.is_supported(url)
    }

    pub async fn is_supported(&self) -> bool {
        match self.doc.current_url().await {
            Ok(url) => self.matcher.is_supported(&url),
            Err(e) => {
                debug!("[{}] cannot read page url: {}", self.profile.name, e);
                false
            }
        }
    }

    pub async fn theme(&self) -> Theme {
        theme::detect(self.doc.as_ref(), self.profile.id).await
    }

    pub async fn insert_text(&self, text: &str) -> bool {
        let result = self.try_insert_text(text).await;
        self.report(
            "insertText",
            json!({ "text": text }),
            result.map(|()| json!({ "inserted": text.chars().count() })),
        )
    }

    pub async fn submit_form(&self) -> bool {
        let result = self.try_submit().await;
        self.report(
            "submitForm",
            Value::Null,
            result.map(|path| json!({ "method": path.as_str() })),
        )
    }

    pub async fn attach_file(&self, file: &FilePayload) -> bool {
        let result = self.try_attach(file).await;
        self.report(
            "attachFile",
            json!({ "name": file.name, "mimeType": file.mime_type, "size": file.bytes.len() }),
            result.map(|method| json!({ "method": method.as_str() })),
        )
    }

    async fn chat_input(&self) -> AdapterResult<ElementHandle> {
        locate(self.doc.as_ref(), self.profile.chat_input_selectors, None)
            .await
            .ok_or_else(|| AdapterError::ElementNotFound(format!("{} chat input", self.profile.name)))
    }

    async fn try_insert_text(&self, text: &str) -> AdapterResult<()> {
        let input = self.chat_input().await?;
        injector::insert_text(self.doc.as_ref(), &input, text).await
    }

    async fn try_submit(&self) -> AdapterResult<submit::SubmitPath> {
        let input = self.chat_input().await?;
        submit::submit(
            self.doc.as_ref(),
            &input,
            self.profile.submit_button_selectors,
            self.timing.submit_poll(),
            self.timing.submit_max_wait(),
        )
        .await
    }

    async fn try_attach(&self, file: &FilePayload) -> AdapterResult<injector::AttachMethod> {
        let doc = self.doc.as_ref();
        let file_input = locate(doc, self.profile.file_input_selectors, None).await;
        let drop_zone = locate(doc, self.profile.drop_zone_selectors, None).await;
        injector::attach_file(doc, file_input.as_ref(), drop_zone.as_ref(), file).await
    }

    /// Turn a capability outcome into its execution event and a boolean.
    fn report(&self, tool: &str, parameters: Value, result: AdapterResult<Value>) -> bool {
        let timestamp = now_millis();
        match result {
            Ok(value) => {
                let sequence = self.executions.fetch_add(1, Ordering::Relaxed) + 1;
                info!("[{}] {} succeeded", self.profile.name, tool);
                self.ctx.events.emit(
                    TOOL_EXECUTION_COMPLETED,
                    &ExecutionResult {
                        id: format!("{}-{}-{}", self.profile.plugin_name, self.instance, sequence),
                        tool_name: tool.to_string(),
                        parameters,
                        result: value,
                        status: ExecutionStatus::Success,
                        timestamp,
                    },
                );
                true
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", self.profile.name, tool, e);
                self.ctx.events.emit(
                    TOOL_EXECUTION_FAILED,
                    &ExecutionFailure {
                        tool_name: tool.to_string(),
                        error: e.to_string(),
                        kind: e.kind().to_string(),
                        timestamp,
                    },
                );
                false
            }
        }
    }

    fn lifecycle_payload(&self, reason: Option<String>) -> LifecyclePayload {
        LifecyclePayload {
            plugin_name: self.profile.plugin_name.to_string(),
            timestamp: now_millis(),
            reason,
        }
    }
}

impl Drop for SiteAdapter {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        let timers = &mut inner.timers;
        for task in timers
            .url_poll
            .take()
            .into_iter()
            .chain(timers.take_ui())
        {
            task.abort();
        }
        for subscription in inner.subscriptions.drain(..) {
            self.ctx.events.off(subscription);
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn format_execution_result(execution: &ExecutionResult) -> String {
    let body = match &execution.result {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    format!(
        "<function_result call_id=\"{}\" tool=\"{}\">\n{}\n</function_result>",
        execution.id, execution.tool_name, body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::claude;
    use crate::dom::memory::MemoryDocument;
    use crate::dom::ElementKind;
    use crate::host::registry::CONTAINER_ID;
    use crate::host::stores::{MemoryStore, ToggleState};
    use std::time::Duration;

    fn claude_page(url: &str) -> Arc<MemoryDocument> {
        let doc = Arc::new(MemoryDocument::new(url));
        let profile = &claude::PROFILE;
        doc.add("composer", None, MemoryDocument::element("fieldset", ElementKind::Other, ""));
        doc.add(
            "input",
            Some("composer"),
            MemoryDocument::element("div", ElementKind::Rich, ""),
        );
        doc.add(
            "send",
            Some("composer"),
            MemoryDocument::element("button", ElementKind::Other, ""),
        );
        doc.add(
            "toolbar",
            Some("composer"),
            MemoryDocument::element("div", ElementKind::Other, ""),
        );
        doc.bind(profile.chat_input_selectors[0], "input");
        doc.bind(profile.submit_button_selectors[0], "send");
        doc.bind(profile.insertion_point_selectors[0], "toolbar");
        doc
    }

    fn context(toggles: ToggleState) -> PluginContext {
        PluginContext::in_memory(Arc::new(MemoryStore::with_toggles(toggles)))
    }

    fn adapter(doc: &Arc<MemoryDocument>, ctx: &PluginContext) -> Arc<SiteAdapter> {
        SiteAdapter::new(
            &claude::PROFILE,
            doc.clone(),
            ctx.clone(),
            TimingConfig::default(),
        )
        .expect("adapter")
    }

    fn capture(ctx: &PluginContext, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        ctx.events.on(event, move |payload| {
            sink.lock().unwrap().push(payload.clone());
        });
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn activate_twice_mounts_one_container() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let activated = capture(&ctx, ADAPTER_ACTIVATED);
        let adapter = adapter(&doc, &ctx);

        assert!(adapter.activate().await);
        assert!(adapter.activate().await);

        assert_eq!(adapter.state(), AdapterState::Active);
        assert_eq!(doc.count_by_id(CONTAINER_ID), 1);
        assert_eq!(doc.count_by_id(claude::PROFILE.stylesheet_id), 1);
        assert_eq!(activated.lock().unwrap().len(), 1);
        let handle = adapter.injection().expect("mounted");
        assert_eq!(handle.anchor.token(), "toolbar");
        assert_eq!(doc.rendered(CONTAINER_ID).map(|v| v.label), Some("MCP".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn two_instances_share_one_container() {
        let doc = claude_page("https://claude.ai/chat/abc");
        let ctx = context(ToggleState::default());
        let first = adapter(&doc, &ctx);
        let second = adapter(&doc, &ctx);

        assert!(first.activate().await);
        assert!(second.activate().await);

        assert_eq!(doc.count_by_id(CONTAINER_ID), 1);
        assert_eq!(ctx.registry.owner(), Some(first.instance()));
        assert!(second.injection().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_insertion_point_gives_up() {
        let doc = Arc::new(MemoryDocument::new("https://claude.ai/new"));
        let ctx = context(ToggleState::default());
        let adapter = adapter(&doc, &ctx);

        assert!(!adapter.activate().await);
        assert_eq!(adapter.state(), AdapterState::Active);
        assert_eq!(doc.count_by_id(CONTAINER_ID), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn activation_follows_a_superseding_integration() {
        let doc = Arc::new(MemoryDocument::new("https://claude.ai/new"));
        doc.add("composer", None, MemoryDocument::element("fieldset", ElementKind::Other, ""));
        let ctx = context(ToggleState::default());
        let adapter = adapter(&doc, &ctx);

        let activating = adapter.clone();
        let activation = tokio::spawn(async move { activating.activate().await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        adapter.on_host_changed("claude.ai").await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        doc.add(
            "toolbar",
            Some("composer"),
            MemoryDocument::element("div", ElementKind::Other, ""),
        );
        doc.bind(claude::PROFILE.insertion_point_selectors[0], "toolbar");

        assert!(activation.await.expect("join"));
        assert_eq!(doc.count_by_id(CONTAINER_ID), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_releases_everything() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let deactivated = capture(&ctx, ADAPTER_DEACTIVATED);
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;
        assert!(adapter.pending_timers() >= 2);

        adapter.cleanup().await;

        assert_eq!(adapter.state(), AdapterState::Uninitialized);
        assert_eq!(adapter.pending_timers(), 0);
        assert_eq!(doc.count_by_id(CONTAINER_ID), 0);
        assert_eq!(doc.count_by_id(claude::PROFILE.stylesheet_id), 0);
        assert_eq!(ctx.events.listener_count(TOOL_EXECUTION_COMPLETED), 0);
        assert_eq!(ctx.registry.owner(), None);
        assert_eq!(deactivated.lock().unwrap().len(), 1);

        adapter.cleanup().await;
        assert_eq!(deactivated.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_unsubscribes_and_falls_back_to_detach() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;
        assert_eq!(ctx.events.listener_count(SIDEBAR_TOGGLE), 1);

        doc.set_remove_fails(true);
        adapter.deactivate().await;

        assert_eq!(adapter.state(), AdapterState::Inactive);
        assert_eq!(ctx.events.listener_count(SIDEBAR_TOGGLE), 0);
        assert_eq!(doc.count_by_id(CONTAINER_ID), 0);
        assert!(adapter.injection().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn url_changes_emit_site_changed_and_unsupported_pages_unmount() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let changes = capture(&ctx, SITE_CHANGED);
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;

        doc.set_url("https://claude.ai/chat/abc");
        tokio::time::sleep(Duration::from_millis(1100)).await;
        {
            let seen = changes.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0]["supported"], true);
            assert_eq!(seen[0]["hostname"], "claude.ai");
        }
        assert_eq!(doc.count_by_id(CONTAINER_ID), 1);

        doc.set_url("https://claude.ai/settings");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(changes.lock().unwrap()[1]["supported"], false);
        assert_eq!(doc.count_by_id(CONTAINER_ID), 0);
        assert_eq!(adapter.state(), AdapterState::Active);

        doc.set_url("https://claude.ai/chat/def");
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(doc.count_by_id(CONTAINER_ID), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_host_reports_deactivation() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let deactivated = capture(&ctx, ADAPTER_DEACTIVATED);
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;

        adapter.on_host_changed("evil.example").await;

        let seen = deactivated.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["reason"], "unsupported host evil.example");
    }

    #[tokio::test(start_paused = true)]
    async fn wiped_container_is_restored() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;

        doc.wipe_by_id(CONTAINER_ID);
        assert_eq!(doc.count_by_id(CONTAINER_ID), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(doc.count_by_id(CONTAINER_ID), 1);
        assert!(adapter.injection().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_adapter_refuses_activation() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;

        adapter.disable().await;
        assert_eq!(adapter.state(), AdapterState::Disabled);
        assert!(!adapter.activate().await);
        assert_eq!(doc.count_by_id(CONTAINER_ID), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn insert_and_submit_report_execution_events() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let completed = capture(&ctx, TOOL_EXECUTION_COMPLETED);
        let failed = capture(&ctx, TOOL_EXECUTION_FAILED);
        let adapter = adapter(&doc, &ctx);

        assert!(adapter.insert_text("hello").await);
        assert_eq!(doc.content("input"), "hello");
        assert!(adapter.submit_form().await);
        assert_eq!(doc.clicks("send"), 1);

        let seen = completed.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["toolName"], "insertText");
        assert_eq!(seen[1]["result"]["method"], "button_click");
        assert!(failed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn attach_without_targets_fails_with_event() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let failed = capture(&ctx, TOOL_EXECUTION_FAILED);
        let adapter = adapter(&doc, &ctx);

        let file = FilePayload::new("notes.txt", "text/plain", b"hi".to_vec());
        assert!(!adapter.attach_file(&file).await);
        assert_eq!(failed.lock().unwrap()[0]["toolName"], "attachFile");
    }

    #[tokio::test(start_paused = true)]
    async fn completed_tool_is_auto_inserted_and_submitted() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState {
            mcp_enabled: true,
            auto_insert: true,
            auto_submit: true,
            auto_execute: false,
        });
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;

        ctx.events.emit(
            TOOL_EXECUTION_COMPLETED,
            &ExecutionResult {
                id: "call-7".into(),
                tool_name: "search".into(),
                parameters: json!({"q": "rust"}),
                result: json!("42 results"),
                status: ExecutionStatus::Success,
                timestamp: 1,
            },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let content = doc.content("input");
        assert!(content.starts_with("<function_result call_id=\"call-7\" tool=\"search\">"));
        assert!(content.contains("42 results"));
        assert_eq!(doc.clicks("send"), 1);
        let tools = ctx.tools.detected_tools().expect("tools");
        assert_eq!(tools[0].name, "search");
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_cancels_pending_auto_submit() {
        let doc = claude_page("https://claude.ai/new");
        doc.set_enabled("send", false);
        let ctx = context(ToggleState {
            mcp_enabled: true,
            auto_insert: true,
            auto_submit: true,
            auto_execute: false,
        });
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;

        ctx.events.emit(
            TOOL_EXECUTION_COMPLETED,
            &json!({
                "id": "call-9",
                "toolName": "search",
                "result": "done",
                "status": "success",
                "timestamp": 3
            }),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(doc.content("input").contains("call-9"));
        assert!(adapter.pending_timers() >= 1);

        adapter.cleanup().await;
        assert_eq!(adapter.pending_timers(), 0);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(doc.clicks("send"), 0);
        assert!(!doc.events_on("input").contains(&"keydown"));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_insert_off_leaves_input_alone() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState {
            mcp_enabled: true,
            ..ToggleState::default()
        });
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;

        ctx.events.emit(
            TOOL_EXECUTION_COMPLETED,
            &json!({
                "id": "call-8",
                "toolName": "search",
                "status": "success",
                "timestamp": 2
            }),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(doc.content("input"), "");
    }

    #[tokio::test(start_paused = true)]
    async fn sidebar_toggle_reaches_the_store() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let adapter = adapter(&doc, &ctx);
        adapter.initialize().await;

        ctx.events.emit(SIDEBAR_TOGGLE, &SidebarTogglePayload { visible: true });
        assert!(ctx.ui.sidebar_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn toggling_mcp_redraws_the_control() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;
        assert_eq!(doc.rendered(CONTAINER_ID).map(|v| v.active), Some(false));

        assert!(adapter.set_mcp_enabled(true).await);
        assert_eq!(doc.rendered(CONTAINER_ID).map(|v| v.active), Some(true));
        assert!(ctx.ui.toggle_state().mcp_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn clicking_the_control_flips_mcp() {
        let doc = claude_page("https://claude.ai/new");
        let ctx = context(ToggleState::default());
        let adapter = adapter(&doc, &ctx);
        adapter.activate().await;

        doc.click_control(CONTAINER_ID);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(ctx.ui.toggle_state().mcp_enabled);
        assert_eq!(doc.rendered(CONTAINER_ID).map(|v| v.active), Some(true));

        doc.click_control(CONTAINER_ID);
        doc.click_control(CONTAINER_ID);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(ctx.ui.toggle_state().mcp_enabled);

        doc.click_control(CONTAINER_ID);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!ctx.ui.toggle_state().mcp_enabled);
    }
}
