use super::profile::{SiteId, SiteProfile};
use crate::dom::Placement;

pub static PROFILE: SiteProfile = SiteProfile {
    id: SiteId::Claude,
    name: "Claude",
    plugin_name: "claude-adapter",
    home_url: "https://claude.ai/new",
    hostnames: &["claude.ai"],
    path_patterns: &[
        r"^/$",
        r"^/new/?$",
        r"^/chat/[^/]+/?$",
        r"^/project/[^/]+/?$",
    ],
    chat_input_selectors: &[
        r#"div.ProseMirror[contenteditable="true"]"#,
        r#"div[contenteditable="true"][aria-label*="prompt" i]"#,
        r#"div[contenteditable="true"][role="textbox"]"#,
        r#"fieldset textarea"#,
    ],
    submit_button_selectors: &[
        r#"button[aria-label="Send message"]"#,
        r#"button[aria-label="Send Message"]"#,
        r#"fieldset button[type="submit"]"#,
    ],
    file_input_selectors: &[
        r#"input[data-testid="file-upload"]"#,
        r#"fieldset input[type="file"]"#,
        r#"input[type="file"]"#,
    ],
    drop_zone_selectors: &[
        r#"div[aria-label="Write your prompt to Claude"]"#,
        r#"fieldset"#,
        r#"div.ProseMirror"#,
    ],
    insertion_point_selectors: &[
        r#"div[data-testid="chat-input-grid-area"] .flex.items-center.gap-2"#,
        r#".relative.flex-1.flex.items-center.gap-2.shrink.min-w-0"#,
        r#"fieldset .flex.gap-2.items-center"#,
    ],
    placement: Placement::Append,
    stylesheet_id: "mcp-claude-ui-styles",
    stylesheet: r#"
#mcp-popover-container {
  display: inline-flex;
  align-items: center;
  margin: 0 4px;
}
#mcp-popover-container .mcp-popover-toggle {
  height: 32px;
  min-width: 32px;
  padding: 0 10px;
  border-radius: 8px;
  font: 500 13px/1 ui-sans-serif, system-ui, sans-serif;
  cursor: pointer;
}
#mcp-popover-container .mcp-popover-toggle[data-state="off"] {
  opacity: 0.7;
}
"#,
};
