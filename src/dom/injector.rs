use super::{Document, DragPhase, ElementHandle, ElementKind, FilePayload, SyntheticEvent};
use crate::error::{AdapterError, AdapterResult};
use log::{debug, warn};

/// Blank line between text already in a value input and appended text.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMethod {
    /// Files assigned to a native file input.
    Direct,
    /// Synthetic dragenter/dragover/drop on the drop zone.
    DragDrop,
}

impl AttachMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::DragDrop => "drag_drop",
        }
    }
}

pub fn merge_value(current: &str, text: &str) -> String {
    if current.is_empty() {
        text.to_string()
    } else {
        format!("{}{}{}", current, PARAGRAPH_SEPARATOR, text)
    }
}

/// Append `text` to a chat input using the technique its editor needs.
///
/// Value inputs go through the native setter so framework bindings see the
/// change. Rich-text regions get in-place edit commands; overwriting their
/// text content bypasses the host editor and leaves it out of sync.
pub async fn insert_text(
    doc: &dyn Document,
    element: &ElementHandle,
    text: &str,
) -> AdapterResult<()> {
    let state = doc.inspect(element).await?;
    match state.kind {
        ElementKind::Value => {
            let merged = merge_value(&state.content, text);
            doc.write_value(element, &merged).await?;
            doc.dispatch(element, SyntheticEvent::Input).await?;
            doc.focus(element).await?;
            debug!("[insert] value input {} now {} chars", element, merged.chars().count());
            Ok(())
        }
        ElementKind::Rich => {
            let has_content = !state.content.trim().is_empty();
            let accepted = doc.insert_rich_text(element, text, has_content).await?;
            if !accepted {
                return Err(AdapterError::InjectionFailed(format!(
                    "editor {} rejected in-place insertion",
                    element
                )));
            }
            doc.dispatch(element, SyntheticEvent::Input).await?;
            Ok(())
        }
        ElementKind::File | ElementKind::Other => Err(AdapterError::InjectionFailed(format!(
            "<{}> {} does not accept text",
            state.tag, element
        ))),
    }
}

/// Hand `file` to the page: native file input first, drop zone second.
pub async fn attach_file(
    doc: &dyn Document,
    file_input: Option<&ElementHandle>,
    drop_zone: Option<&ElementHandle>,
    file: &FilePayload,
) -> AdapterResult<AttachMethod> {
    if file.is_empty() {
        return Err(AdapterError::TransferFailed(format!("{} is empty", file.name)));
    }

    if let Some(input) = file_input {
        match assign_direct(doc, input, file).await {
            Ok(()) => return Ok(AttachMethod::Direct),
            Err(e) if drop_zone.is_some() => {
                warn!("[attach] file input {} refused {}: {}, trying drop zone", input, file.name, e);
            }
            Err(e) => return Err(AdapterError::TransferFailed(e.to_string())),
        }
    }

    match drop_zone {
        Some(zone) => {
            for phase in [DragPhase::Enter, DragPhase::Over, DragPhase::Drop] {
                doc.dispatch(zone, SyntheticEvent::Drag { phase, file })
                    .await
                    .map_err(|e| AdapterError::TransferFailed(e.to_string()))?;
            }
            Ok(AttachMethod::DragDrop)
        }
        None => Err(AdapterError::TransferFailed(
            "no file input or drop zone on this page".into(),
        )),
    }
}

async fn assign_direct(
    doc: &dyn Document,
    input: &ElementHandle,
    file: &FilePayload,
) -> AdapterResult<()> {
    doc.assign_files(input, file).await?;
    doc.dispatch(input, SyntheticEvent::Change).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryDocument, Recorded};

    fn file() -> FilePayload {
        FilePayload::new("report.txt", "text/plain", b"tool output".to_vec())
    }

    #[test]
    fn merge_adds_separator_only_after_existing_text() {
        assert_eq!(merge_value("", "hello"), "hello");
        assert_eq!(merge_value("draft", "hello"), "draft\n\nhello");
    }

    #[tokio::test]
    async fn empty_value_input_gets_exact_text() {
        let doc = MemoryDocument::new("https://chatgpt.com/");
        let input = doc.add("ta", None, MemoryDocument::element("textarea", ElementKind::Value, ""));
        insert_text(&doc, &input, "result: 42").await.expect("insert");
        assert_eq!(doc.content("ta"), "result: 42");
        assert_eq!(doc.events_on("ta"), vec!["input"]);
        assert!(doc.log().contains(&Recorded::Focus("ta".into())));
    }

    #[tokio::test]
    async fn filled_value_input_appends_after_blank_line() {
        let doc = MemoryDocument::new("https://chatgpt.com/");
        let input = doc.add("ta", None, MemoryDocument::element("textarea", ElementKind::Value, "previous"));
        insert_text(&doc, &input, "next").await.expect("insert");
        assert_eq!(doc.content("ta"), "previous\n\nnext");
    }

    #[tokio::test]
    async fn rich_editor_breaks_paragraph_only_when_not_empty() {
        let doc = MemoryDocument::new("https://claude.ai/new");
        let empty = doc.add("pm", None, MemoryDocument::element("div", ElementKind::Rich, "\n"));
        insert_text(&doc, &empty, "first").await.expect("insert");
        assert_eq!(doc.content("pm"), "\nfirst");

        let filled = doc.add("pm2", None, MemoryDocument::element("div", ElementKind::Rich, "draft"));
        insert_text(&doc, &filled, "second").await.expect("insert");
        assert_eq!(doc.content("pm2"), "draft\nsecond");
        assert_eq!(doc.events_on("pm2"), vec!["input"]);
    }

    #[tokio::test]
    async fn rejected_rich_insert_is_injection_failure() {
        let doc = MemoryDocument::new("https://claude.ai/new");
        doc.set_rich_rejects(true);
        let editor = doc.add("pm", None, MemoryDocument::element("div", ElementKind::Rich, ""));
        let err = insert_text(&doc, &editor, "x").await.unwrap_err();
        assert_eq!(err.kind(), "injection_failed");
        assert!(doc.events_on("pm").is_empty());
    }

    #[tokio::test]
    async fn non_text_element_is_refused() {
        let doc = MemoryDocument::new("https://claude.ai/new");
        let button = doc.add("btn", None, MemoryDocument::element("button", ElementKind::Other, ""));
        assert!(insert_text(&doc, &button, "x").await.is_err());
    }

    #[tokio::test]
    async fn file_input_preferred_over_drop_zone() {
        let doc = MemoryDocument::new("https://claude.ai/new");
        let input = doc.add("fi", None, MemoryDocument::element("input", ElementKind::File, ""));
        let zone = doc.add("dz", None, MemoryDocument::element("div", ElementKind::Other, ""));
        let method = attach_file(&doc, Some(&input), Some(&zone), &file()).await.expect("attach");
        assert_eq!(method, AttachMethod::Direct);
        assert_eq!(doc.events_on("fi"), vec!["change"]);
        assert!(doc.events_on("dz").is_empty());
    }

    #[tokio::test]
    async fn drop_zone_receives_full_drag_sequence() {
        let doc = MemoryDocument::new("https://gemini.google.com/app");
        let zone = doc.add("dz", None, MemoryDocument::element("div", ElementKind::Other, ""));
        let method = attach_file(&doc, None, Some(&zone), &file()).await.expect("attach");
        assert_eq!(method, AttachMethod::DragDrop);
        assert_eq!(doc.events_on("dz"), vec!["dragenter", "dragover", "drop"]);
        assert!(doc.log().iter().all(|entry| match entry {
            Recorded::Event { file, .. } => file.as_deref() == Some("report.txt"),
            _ => true,
        }));
    }

    #[tokio::test]
    async fn nothing_to_attach_to_or_empty_file_fails() {
        let doc = MemoryDocument::new("https://claude.ai/new");
        let err = attach_file(&doc, None, None, &file()).await.unwrap_err();
        assert_eq!(err.kind(), "transfer_failed");

        let zone = doc.add("dz", None, MemoryDocument::element("div", ElementKind::Other, ""));
        let empty = FilePayload::new("empty.txt", "text/plain", Vec::new());
        assert!(attach_file(&doc, None, Some(&zone), &empty).await.is_err());
        assert!(doc.events_on("dz").is_empty());
    }
}
