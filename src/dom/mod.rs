pub mod injector;
pub mod locator;
#[cfg(test)]
pub(crate) mod memory;
pub mod submit;
pub mod theme;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("page script failed: {0}")]
    Script(String),
    #[error("devtools protocol error: {0}")]
    Protocol(String),
    #[error("element {0} is no longer attached to the document")]
    Stale(String),
}

pub type DomResult<T> = std::result::Result<T, DomError>;

/// Opaque reference to a live element inside the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How text reaches an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// `<input>` / `<textarea>` holding a form value.
    Value,
    /// contenteditable region driven by the host page's own editor.
    Rich,
    /// `<input type="file">`.
    File,
    Other,
}

/// Snapshot of the element properties the injector and submit trigger read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementState {
    pub tag: String,
    pub kind: ElementKind,
    /// Form value for `Value` elements, text content otherwise.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub aria_disabled: bool,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl ElementState {
    /// A control can be clicked when nothing marks it disabled and it has a rendered box.
    pub fn is_enabled(&self) -> bool {
        !self.disabled
            && !self.aria_disabled
            && !self.classes.iter().any(|class| class == "disabled")
            && self.width > 0.0
            && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    Down,
    Press,
    Up,
}

impl KeyPhase {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Down => "keydown",
            Self::Press => "keypress",
            Self::Up => "keyup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Enter,
    Over,
    Drop,
}

impl DragPhase {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enter => "dragenter",
            Self::Over => "dragover",
            Self::Drop => "drop",
        }
    }
}

/// Events the bridge synthesizes on page elements.
#[derive(Debug, Clone, Copy)]
pub enum SyntheticEvent<'a> {
    Input,
    Change,
    Submit,
    Key { phase: KeyPhase, key: &'a str },
    Drag { phase: DragPhase, file: &'a FilePayload },
}

impl SyntheticEvent<'_> {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Change => "change",
            Self::Submit => "submit",
            Self::Key { phase, .. } => phase.event_type(),
            Self::Drag { phase, .. } => phase.event_type(),
        }
    }
}

/// A file handed to the chat site, either through its file input or a drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        Ok(Self::new(name, guess_mime(&ext), bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn guess_mime(ext: &str) -> &'static str {
    match ext {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Where the control container goes relative to the insertion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Append,
    Prepend,
    Before,
    After,
}

impl Placement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    /// A node with the container id was already in the document.
    AlreadyPresent,
}

/// What the injected control shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlView {
    pub label: String,
    pub title: String,
    pub active: bool,
    pub background: String,
    pub foreground: String,
    pub border: String,
    pub accent: String,
}

/// The page surface the bridge operates on.
///
/// Every mutating method performs its existence check and its mutation in
/// one step on the page side, so callers never interleave a check with
/// another caller's mutation.
#[async_trait]
pub trait Document: Send + Sync {
    /// First match of `selector` under `scope` (or the whole document).
    /// A selector the page rejects is an `Err`.
    async fn query_selector(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> DomResult<Option<ElementHandle>>;

    async fn inspect(&self, element: &ElementHandle) -> DomResult<ElementState>;

    /// Write through the native value setter and move the cursor to the end.
    async fn write_value(&self, element: &ElementHandle, value: &str) -> DomResult<()>;

    /// Move the caret to the end and insert `text` with in-place edit commands.
    /// Returns whether the page accepted the insertion.
    async fn insert_rich_text(
        &self,
        element: &ElementHandle,
        text: &str,
        paragraph_break: bool,
    ) -> DomResult<bool>;

    async fn dispatch(&self, element: &ElementHandle, event: SyntheticEvent<'_>) -> DomResult<()>;

    async fn focus(&self, element: &ElementHandle) -> DomResult<()>;

    async fn click(&self, element: &ElementHandle) -> DomResult<()>;

    async fn closest(
        &self,
        element: &ElementHandle,
        selector: &str,
    ) -> DomResult<Option<ElementHandle>>;

    /// Replace the file list of a file input with `file`.
    async fn assign_files(&self, element: &ElementHandle, file: &FilePayload) -> DomResult<()>;

    async fn current_url(&self) -> DomResult<String>;

    async fn exists_by_id(&self, id: &str) -> DomResult<bool>;

    /// Add a `<style id=..>` unless one exists. Returns true when created.
    async fn inject_style(&self, id: &str, css: &str) -> DomResult<bool>;

    /// Create the control container next to `anchor` unless the id is taken.
    async fn mount_container(
        &self,
        id: &str,
        anchor: &ElementHandle,
        placement: Placement,
    ) -> DomResult<MountOutcome>;

    /// Render `view` into the container. Returns false when the container is gone.
    async fn render_control(&self, id: &str, view: &ControlView) -> DomResult<bool>;

    /// Clicks on the rendered control since the last call; resets the count.
    async fn take_control_clicks(&self, id: &str) -> DomResult<u32>;

    /// Empty the container.
    async fn clear_container(&self, id: &str) -> DomResult<bool>;

    /// `element.remove()`. Returns false when no such node exists.
    async fn remove_by_id(&self, id: &str) -> DomResult<bool>;

    /// `parentNode.removeChild(element)`, for nodes `remove()` failed on.
    async fn detach_by_id(&self, id: &str) -> DomResult<bool>;

    /// Computed background colour of the body, or of the root element when the body is transparent.
    async fn background_color(&self) -> DomResult<Option<String>>;
}
