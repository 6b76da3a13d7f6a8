use crate::dom::{
    ControlView, Document, DomError, DomResult, ElementHandle, ElementState, FilePayload,
    MountOutcome, Placement, SyntheticEvent,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Page-side element registry. Handles are keys into a `Map` kept on
/// `window`, so they survive between evaluations but die with the page.
/// Detached nodes are dropped whenever a new node is tracked.
const PRELUDE: &str = r#"
const __refs = (window.__mcpBridgeRefs = window.__mcpBridgeRefs || new Map());
const __keys = (window.__mcpBridgeKeys = window.__mcpBridgeKeys || new WeakMap());
const __track = (el) => {
  if (!el) return null;
  const known = __keys.get(el);
  if (known && __refs.get(known) === el) return known;
  for (const [key, value] of __refs) { if (!value.isConnected) __refs.delete(key); }
  window.__mcpBridgeNext = (window.__mcpBridgeNext || 0) + 1;
  const key = 'e' + window.__mcpBridgeNext;
  __refs.set(key, el);
  __keys.set(el, key);
  return key;
};
const __get = (key) => {
  const el = __refs.get(key);
  if (!el || !el.isConnected) { __refs.delete(key); throw new Error('stale-element:' + key); }
  return el;
};
const __file = (f) => new File(
  [Uint8Array.from(atob(f.data), (c) => c.charCodeAt(0))],
  f.name,
  { type: f.type }
);
"#;

/// [`Document`] over a live Chrome tab.
pub struct CdpDocument {
    page: Page,
}

impl CdpDocument {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn run<T: DeserializeOwned>(&self, body: &str) -> DomResult<T> {
        let script = format!("(() => {{\n{}\n{}\n}})()", PRELUDE, body);
        let result = self.page.evaluate(script.as_str()).await.map_err(map_cdp_error)?;
        decode_result(result.value())
    }

    async fn run_on<T: DeserializeOwned>(&self, element: &ElementHandle, body: &str) -> DomResult<T> {
        self.run(&format!("const el = __get({});\n{}", js_str(element.token()), body))
            .await
    }
}

/// `null` and `undefined` come back without a value; both decode as JSON null,
/// so `Option` results see `None` instead of an error.
fn decode_result<T: DeserializeOwned>(value: Option<&Value>) -> DomResult<T> {
    serde_json::from_value(value.cloned().unwrap_or(Value::Null))
        .map_err(|e| DomError::Script(format!("unexpected script result: {}", e)))
}

fn js_str(raw: &str) -> String {
    Value::String(raw.to_string()).to_string()
}

fn js_file(file: &FilePayload) -> String {
    serde_json::json!({
        "name": file.name,
        "type": file.mime_type,
        "data": BASE64.encode(&file.bytes),
    })
    .to_string()
}

fn map_cdp_error(err: CdpError) -> DomError {
    let message = err.to_string();
    match err {
        CdpError::JavascriptException(_) => match message.split("stale-element:").nth(1) {
            Some(rest) => {
                let token: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect();
                DomError::Stale(ElementHandle::new(token).to_string())
            }
            None => DomError::Script(message),
        },
        _ => DomError::Protocol(message),
    }
}

fn event_script(event: &SyntheticEvent<'_>) -> String {
    let kind = js_str(event.event_type());
    match event {
        SyntheticEvent::Input => format!(
            "el.dispatchEvent(new InputEvent({}, {{ bubbles: true, inputType: 'insertText' }})); return true;",
            kind
        ),
        SyntheticEvent::Change | SyntheticEvent::Submit => format!(
            "el.dispatchEvent(new Event({}, {{ bubbles: true, cancelable: true }})); return true;",
            kind
        ),
        SyntheticEvent::Key { key, .. } => {
            let code = if *key == "Enter" { 13 } else { 0 };
            format!(
                "el.dispatchEvent(new KeyboardEvent({kind}, {{ key: {key}, code: {key}, keyCode: {code}, which: {code}, bubbles: true, cancelable: true }})); return true;",
                kind = kind,
                key = js_str(key),
                code = code
            )
        }
        SyntheticEvent::Drag { file, .. } => format!(
            "const dt = new DataTransfer();\n\
             dt.items.add(__file({}));\n\
             el.dispatchEvent(new DragEvent({}, {{ bubbles: true, cancelable: true, dataTransfer: dt }}));\n\
             return true;",
            js_file(file),
            kind
        ),
    }
}

#[async_trait]
impl Document for CdpDocument {
    async fn query_selector(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> DomResult<Option<ElementHandle>> {
        let root = match scope {
            Some(scope) => format!("__get({})", js_str(scope.token())),
            None => "document".to_string(),
        };
        let token: Option<String> = self
            .run(&format!(
                "return __track({}.querySelector({}));",
                root,
                js_str(selector)
            ))
            .await?;
        Ok(token.map(ElementHandle::new))
    }

    async fn inspect(&self, element: &ElementHandle) -> DomResult<ElementState> {
        self.run_on(
            element,
            r#"
const tag = el.tagName.toLowerCase();
let kind = 'other';
if (tag === 'input' && (el.type || '').toLowerCase() === 'file') kind = 'file';
else if (tag === 'textarea' || tag === 'input') kind = 'value';
else if (el.isContentEditable) kind = 'rich';
const rect = el.getBoundingClientRect();
return {
  tag,
  kind,
  content: kind === 'value' ? el.value : (el.innerText || ''),
  disabled: !!el.disabled,
  ariaDisabled: el.getAttribute('aria-disabled') === 'true',
  classes: Array.from(el.classList),
  width: rect.width,
  height: rect.height,
};
"#,
        )
        .await
    }

    async fn write_value(&self, element: &ElementHandle, value: &str) -> DomResult<()> {
        // The prototype setter keeps framework-tracked inputs in sync.
        let _: bool = self
            .run_on(
                element,
                &format!(
                    "const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;\n\
                     const desc = Object.getOwnPropertyDescriptor(proto, 'value');\n\
                     if (desc && desc.set) desc.set.call(el, {v}); else el.value = {v};\n\
                     try {{ el.setSelectionRange(el.value.length, el.value.length); }} catch (_) {{}}\n\
                     return true;",
                    v = js_str(value)
                ),
            )
            .await?;
        Ok(())
    }

    async fn insert_rich_text(
        &self,
        element: &ElementHandle,
        text: &str,
        paragraph_break: bool,
    ) -> DomResult<bool> {
        self.run_on(
            element,
            &format!(
                r#"
el.focus();
const selection = window.getSelection();
const range = document.createRange();
range.selectNodeContents(el);
range.collapse(false);
selection.removeAllRanges();
selection.addRange(range);
if ({brk}) document.execCommand('insertParagraph', false);
const lines = {text}.split('\n');
let ok = true;
lines.forEach((line, i) => {{
  if (i > 0) document.execCommand('insertParagraph', false);
  if (line.length > 0) ok = document.execCommand('insertText', false, line) && ok;
}});
return ok;
"#,
                brk = paragraph_break,
                text = js_str(text)
            ),
        )
        .await
    }

    async fn dispatch(&self, element: &ElementHandle, event: SyntheticEvent<'_>) -> DomResult<()> {
        let _: bool = self.run_on(element, &event_script(&event)).await?;
        Ok(())
    }

    async fn focus(&self, element: &ElementHandle) -> DomResult<()> {
        let _: bool = self.run_on(element, "el.focus(); return true;").await?;
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> DomResult<()> {
        let _: bool = self.run_on(element, "el.click(); return true;").await?;
        Ok(())
    }

    async fn closest(
        &self,
        element: &ElementHandle,
        selector: &str,
    ) -> DomResult<Option<ElementHandle>> {
        let token: Option<String> = self
            .run_on(
                element,
                &format!("return __track(el.closest({}));", js_str(selector)),
            )
            .await?;
        Ok(token.map(ElementHandle::new))
    }

    async fn assign_files(&self, element: &ElementHandle, file: &FilePayload) -> DomResult<()> {
        let assigned: usize = self
            .run_on(
                element,
                &format!(
                    "const dt = new DataTransfer();\n\
                     dt.items.add(__file({}));\n\
                     el.files = dt.files;\n\
                     return el.files ? el.files.length : 0;",
                    js_file(file)
                ),
            )
            .await?;
        if assigned == 0 {
            return Err(DomError::Script(format!(
                "{} did not accept {}",
                element, file.name
            )));
        }
        Ok(())
    }

    async fn current_url(&self) -> DomResult<String> {
        self.run("return window.location.href;").await
    }

    async fn exists_by_id(&self, id: &str) -> DomResult<bool> {
        self.run(&format!(
            "return document.getElementById({}) !== null;",
            js_str(id)
        ))
        .await
    }

    async fn inject_style(&self, id: &str, css: &str) -> DomResult<bool> {
        self.run(&format!(
            r#"
if (document.getElementById({id})) return false;
const style = document.createElement('style');
style.id = {id};
style.textContent = {css};
(document.head || document.documentElement).appendChild(style);
return true;
"#,
            id = js_str(id),
            css = js_str(css)
        ))
        .await
    }

    async fn mount_container(
        &self,
        id: &str,
        anchor: &ElementHandle,
        placement: Placement,
    ) -> DomResult<MountOutcome> {
        let outcome: String = self
            .run_on(
                anchor,
                &format!(
                    r#"
if (document.getElementById({id})) return 'present';
const container = document.createElement('div');
container.id = {id};
switch ({placement}) {{
  case 'prepend': el.insertBefore(container, el.firstChild); break;
  case 'before': el.parentNode.insertBefore(container, el); break;
  case 'after': el.parentNode.insertBefore(container, el.nextSibling); break;
  default: el.appendChild(container);
}}
return 'mounted';
"#,
                    id = js_str(id),
                    placement = js_str(placement.as_str())
                ),
            )
            .await?;
        Ok(match outcome.as_str() {
            "present" => MountOutcome::AlreadyPresent,
            _ => MountOutcome::Mounted,
        })
    }

    async fn render_control(&self, id: &str, view: &ControlView) -> DomResult<bool> {
        let view = serde_json::to_string(view)
            .map_err(|e| DomError::Script(format!("cannot encode control: {}", e)))?;
        self.run(&format!(
            r#"
const container = document.getElementById({id});
if (!container) return false;
const view = {view};
const button = document.createElement('button');
button.type = 'button';
button.className = 'mcp-popover-toggle';
button.textContent = view.label;
button.title = view.title;
button.setAttribute('aria-pressed', String(view.active));
button.dataset.state = view.active ? 'on' : 'off';
button.style.background = view.background;
button.style.color = view.active ? view.accent : view.foreground;
button.style.border = '1px solid ' + view.border;
button.addEventListener('click', () => {{
  container.dataset.clicks = String(Number(container.dataset.clicks || 0) + 1);
}});
container.replaceChildren(button);
return true;
"#,
            id = js_str(id),
            view = view
        ))
        .await
    }

    async fn take_control_clicks(&self, id: &str) -> DomResult<u32> {
        self.run(&format!(
            "const c = document.getElementById({}); if (!c) return 0; const n = Number(c.dataset.clicks || 0); delete c.dataset.clicks; return n;",
            js_str(id)
        ))
        .await
    }

    async fn clear_container(&self, id: &str) -> DomResult<bool> {
        self.run(&format!(
            "const c = document.getElementById({}); if (!c) return false; c.replaceChildren(); return true;",
            js_str(id)
        ))
        .await
    }

    async fn remove_by_id(&self, id: &str) -> DomResult<bool> {
        self.run(&format!(
            "const n = document.getElementById({}); if (!n) return false; n.remove(); return true;",
            js_str(id)
        ))
        .await
    }

    async fn detach_by_id(&self, id: &str) -> DomResult<bool> {
        self.run(&format!(
            "const n = document.getElementById({}); if (!n || !n.parentNode) return false; n.parentNode.removeChild(n); return true;",
            js_str(id)
        ))
        .await
    }

    async fn background_color(&self) -> DomResult<Option<String>> {
        self.run(
            r#"
const pick = (node) => node ? getComputedStyle(node).backgroundColor : null;
const body = pick(document.body);
if (body && body !== 'transparent' && body !== 'rgba(0, 0, 0, 0)') return body;
return pick(document.documentElement);
"#,
        )
        .await
    }
}
