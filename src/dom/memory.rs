//! In-memory `Document` for unit tests. Selectors are bound to nodes
//! explicitly instead of being parsed.

use super::*;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Recorded {
    Event {
        target: String,
        event: &'static str,
        key: Option<String>,
        file: Option<String>,
    },
    Click(String),
    Focus(String),
    FilesAssigned { target: String, name: String },
}

#[derive(Debug, Clone)]
struct Node {
    handle: String,
    state: ElementState,
    parent: Option<String>,
    dom_id: Option<String>,
    connected: bool,
    view: Option<ControlView>,
    clicks: u32,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<Node>,
    selectors: HashMap<String, Vec<String>>,
    url: String,
    background: Option<String>,
    log: Vec<Recorded>,
    next_id: usize,
    remove_fails: bool,
    rich_rejects: bool,
}

impl State {
    fn node(&self, handle: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.handle == handle)
    }

    fn node_mut(&mut self, handle: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.handle == handle)
    }

    fn live(&self, element: &ElementHandle) -> DomResult<&Node> {
        match self.node(element.token()) {
            Some(node) if node.connected => Ok(node),
            _ => Err(DomError::Stale(element.to_string())),
        }
    }

    fn live_mut(&mut self, element: &ElementHandle) -> DomResult<&mut Node> {
        match self.node_mut(element.token()) {
            Some(node) if node.connected => Ok(node),
            _ => Err(DomError::Stale(element.to_string())),
        }
    }

    fn by_id(&self, id: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|node| node.connected && node.dom_id.as_deref() == Some(id))
    }

    fn is_within(&self, handle: &str, ancestor: &str) -> bool {
        let mut current = Some(handle.to_string());
        while let Some(h) = current {
            if h == ancestor {
                return true;
            }
            current = self.node(&h).and_then(|node| node.parent.clone());
        }
        false
    }

    fn disconnect_tree(&mut self, handle: &str) {
        let children: Vec<String> = self
            .nodes
            .iter()
            .filter(|node| node.parent.as_deref() == Some(handle))
            .map(|node| node.handle.clone())
            .collect();
        if let Some(node) = self.node_mut(handle) {
            node.connected = false;
        }
        for child in children {
            self.disconnect_tree(&child);
        }
    }

    fn fresh_handle(&mut self) -> String {
        self.next_id += 1;
        format!("node-{}", self.next_id)
    }
}

pub(crate) struct MemoryDocument {
    state: Mutex<State>,
}

impl MemoryDocument {
    pub(crate) fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(State {
                url: url.to_string(),
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn element(tag: &str, kind: ElementKind, content: &str) -> ElementState {
        ElementState {
            tag: tag.to_string(),
            kind,
            content: content.to_string(),
            disabled: false,
            aria_disabled: false,
            classes: Vec::new(),
            width: 100.0,
            height: 30.0,
        }
    }

    pub(crate) fn add(&self, handle: &str, parent: Option<&str>, state: ElementState) -> ElementHandle {
        let mut st = self.lock();
        st.nodes.push(Node {
            handle: handle.to_string(),
            state,
            parent: parent.map(str::to_string),
            dom_id: None,
            connected: true,
            view: None,
            clicks: 0,
        });
        ElementHandle::new(handle)
    }

    pub(crate) fn bind(&self, selector: &str, handle: &str) {
        self.lock()
            .selectors
            .entry(selector.to_string())
            .or_default()
            .push(handle.to_string());
    }

    pub(crate) fn set_url(&self, url: &str) {
        self.lock().url = url.to_string();
    }

    pub(crate) fn set_background(&self, color: Option<&str>) {
        self.lock().background = color.map(str::to_string);
    }

    pub(crate) fn set_enabled(&self, handle: &str, enabled: bool) {
        if let Some(node) = self.lock().node_mut(handle) {
            node.state.disabled = !enabled;
        }
    }

    pub(crate) fn set_remove_fails(&self, fails: bool) {
        self.lock().remove_fails = fails;
    }

    pub(crate) fn set_rich_rejects(&self, rejects: bool) {
        self.lock().rich_rejects = rejects;
    }

    /// Drop a node the way a host re-render wipes injected markup.
    pub(crate) fn wipe_by_id(&self, id: &str) {
        let mut st = self.lock();
        let handle = st.by_id(id).map(|node| node.handle.clone());
        if let Some(handle) = handle {
            st.disconnect_tree(&handle);
        }
    }

    /// A user click on the rendered control.
    pub(crate) fn click_control(&self, id: &str) {
        let mut st = self.lock();
        let Some(handle) = st.by_id(id).map(|node| node.handle.clone()) else {
            return;
        };
        if let Some(node) = st.node_mut(&handle) {
            node.clicks += 1;
        }
    }

    pub(crate) fn count_by_id(&self, id: &str) -> usize {
        self.lock()
            .nodes
            .iter()
            .filter(|node| node.connected && node.dom_id.as_deref() == Some(id))
            .count()
    }

    pub(crate) fn rendered(&self, id: &str) -> Option<ControlView> {
        self.lock().by_id(id).and_then(|node| node.view.clone())
    }

    pub(crate) fn content(&self, handle: &str) -> String {
        self.lock()
            .node(handle)
            .map(|node| node.state.content.clone())
            .unwrap_or_default()
    }

    pub(crate) fn clicks(&self, handle: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|entry| matches!(entry, Recorded::Click(target) if target == handle))
            .count()
    }

    pub(crate) fn events_on(&self, handle: &str) -> Vec<&'static str> {
        self.lock()
            .log
            .iter()
            .filter_map(|entry| match entry {
                Recorded::Event { target, event, .. } if target == handle => Some(*event),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn log(&self) -> Vec<Recorded> {
        self.lock().log.clone()
    }
}

#[async_trait]
impl Document for MemoryDocument {
    async fn query_selector(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> DomResult<Option<ElementHandle>> {
        if selector.starts_with("::invalid") {
            return Err(DomError::Script(format!("'{}' is not a valid selector", selector)));
        }
        let st = self.lock();
        let Some(handles) = st.selectors.get(selector) else {
            return Ok(None);
        };
        let found = handles.iter().find(|handle| {
            let connected = st.node(handle).map(|node| node.connected).unwrap_or(false);
            let in_scope = scope.map_or(true, |root| st.is_within(handle, root.token()));
            connected && in_scope
        });
        Ok(found.map(|handle| ElementHandle::new(handle.clone())))
    }

    async fn inspect(&self, element: &ElementHandle) -> DomResult<ElementState> {
        Ok(self.lock().live(element)?.state.clone())
    }

    async fn write_value(&self, element: &ElementHandle, value: &str) -> DomResult<()> {
        self.lock().live_mut(element)?.state.content = value.to_string();
        Ok(())
    }

    async fn insert_rich_text(
        &self,
        element: &ElementHandle,
        text: &str,
        paragraph_break: bool,
    ) -> DomResult<bool> {
        let mut st = self.lock();
        if st.rich_rejects {
            st.live(element)?;
            return Ok(false);
        }
        let node = st.live_mut(element)?;
        if paragraph_break {
            node.state.content.push('\n');
        }
        node.state.content.push_str(text);
        Ok(true)
    }

    async fn dispatch(&self, element: &ElementHandle, event: SyntheticEvent<'_>) -> DomResult<()> {
        let mut st = self.lock();
        st.live(element)?;
        let (key, file) = match event {
            SyntheticEvent::Key { key, .. } => (Some(key.to_string()), None),
            SyntheticEvent::Drag { file, .. } => (None, Some(file.name.clone())),
            _ => (None, None),
        };
        st.log.push(Recorded::Event {
            target: element.token().to_string(),
            event: event.event_type(),
            key,
            file,
        });
        Ok(())
    }

    async fn focus(&self, element: &ElementHandle) -> DomResult<()> {
        let mut st = self.lock();
        st.live(element)?;
        st.log.push(Recorded::Focus(element.token().to_string()));
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> DomResult<()> {
        let mut st = self.lock();
        st.live(element)?;
        st.log.push(Recorded::Click(element.token().to_string()));
        Ok(())
    }

    async fn closest(
        &self,
        element: &ElementHandle,
        selector: &str,
    ) -> DomResult<Option<ElementHandle>> {
        let st = self.lock();
        st.live(element)?;
        let bound = st.selectors.get(selector).cloned().unwrap_or_default();
        let mut current = Some(element.token().to_string());
        while let Some(handle) = current {
            let Some(node) = st.node(&handle) else { break };
            if node.state.tag == selector || bound.contains(&handle) {
                return Ok(Some(ElementHandle::new(handle)));
            }
            current = node.parent.clone();
        }
        Ok(None)
    }

    async fn assign_files(&self, element: &ElementHandle, file: &FilePayload) -> DomResult<()> {
        let mut st = self.lock();
        st.live(element)?;
        st.log.push(Recorded::FilesAssigned {
            target: element.token().to_string(),
            name: file.name.clone(),
        });
        Ok(())
    }

    async fn current_url(&self) -> DomResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn exists_by_id(&self, id: &str) -> DomResult<bool> {
        Ok(self.lock().by_id(id).is_some())
    }

    async fn inject_style(&self, id: &str, css: &str) -> DomResult<bool> {
        let mut st = self.lock();
        if st.by_id(id).is_some() {
            return Ok(false);
        }
        let handle = st.fresh_handle();
        st.nodes.push(Node {
            handle,
            state: Self::element("style", ElementKind::Other, css),
            parent: None,
            dom_id: Some(id.to_string()),
            connected: true,
            view: None,
            clicks: 0,
        });
        Ok(true)
    }

    async fn mount_container(
        &self,
        id: &str,
        anchor: &ElementHandle,
        placement: Placement,
    ) -> DomResult<MountOutcome> {
        let mut st = self.lock();
        if st.by_id(id).is_some() {
            return Ok(MountOutcome::AlreadyPresent);
        }
        let anchor_node = st.live(anchor)?;
        let parent = match placement {
            Placement::Append | Placement::Prepend => Some(anchor_node.handle.clone()),
            Placement::Before | Placement::After => anchor_node.parent.clone(),
        };
        let handle = st.fresh_handle();
        st.nodes.push(Node {
            handle,
            state: Self::element("div", ElementKind::Other, ""),
            parent,
            dom_id: Some(id.to_string()),
            connected: true,
            view: None,
            clicks: 0,
        });
        Ok(MountOutcome::Mounted)
    }

    async fn render_control(&self, id: &str, view: &ControlView) -> DomResult<bool> {
        let mut st = self.lock();
        let handle = match st.by_id(id) {
            Some(node) => node.handle.clone(),
            None => return Ok(false),
        };
        if let Some(node) = st.node_mut(&handle) {
            node.view = Some(view.clone());
        }
        Ok(true)
    }

    async fn take_control_clicks(&self, id: &str) -> DomResult<u32> {
        let mut st = self.lock();
        let Some(handle) = st.by_id(id).map(|node| node.handle.clone()) else {
            return Ok(0);
        };
        Ok(st
            .node_mut(&handle)
            .map(|node| std::mem::take(&mut node.clicks))
            .unwrap_or(0))
    }

    async fn clear_container(&self, id: &str) -> DomResult<bool> {
        let mut st = self.lock();
        let handle = match st.by_id(id) {
            Some(node) => node.handle.clone(),
            None => return Ok(false),
        };
        if let Some(node) = st.node_mut(&handle) {
            node.view = None;
        }
        Ok(true)
    }

    async fn remove_by_id(&self, id: &str) -> DomResult<bool> {
        let mut st = self.lock();
        if st.remove_fails {
            return Err(DomError::Script("element.remove is not a function".into()));
        }
        let handle = st.by_id(id).map(|node| node.handle.clone());
        match handle {
            Some(handle) => {
                st.disconnect_tree(&handle);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn detach_by_id(&self, id: &str) -> DomResult<bool> {
        let mut st = self.lock();
        let handle = st.by_id(id).map(|node| node.handle.clone());
        match handle {
            Some(handle) => {
                st.disconnect_tree(&handle);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn background_color(&self) -> DomResult<Option<String>> {
        Ok(self.lock().background.clone())
    }
}
