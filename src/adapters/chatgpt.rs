use super::profile::{SiteId, SiteProfile};
use crate::dom::Placement;

pub static PROFILE: SiteProfile = SiteProfile {
    id: SiteId::ChatGpt,
    name: "ChatGPT",
    plugin_name: "chatgpt-adapter",
    home_url: "https://chatgpt.com/",
    hostnames: &["chatgpt.com", "chat.openai.com"],
    path_patterns: &[
        r"^/$",
        r"^/c/[^/]+/?$",
        r"^/g/[^/]+/?$",
        r"^/g/[^/]+/c/[^/]+/?$",
        r"^/g/[^/]+/project/?$",
    ],
    chat_input_selectors: &[
        r#"#prompt-textarea[contenteditable="true"]"#,
        r#"#prompt-textarea"#,
        r#"textarea[data-id="root"]"#,
        r#"form textarea"#,
    ],
    submit_button_selectors: &[
        r#"button[data-testid="send-button"]"#,
        r#"button[aria-label="Send prompt"]"#,
        r#"form button[type="submit"]"#,
    ],
    file_input_selectors: &[r#"form input[type="file"]"#, r#"input[type="file"]"#],
    drop_zone_selectors: &[r#"form[data-type="unified-composer"]"#, r#"main form"#],
    insertion_point_selectors: &[
        r#"[data-testid="composer-footer-actions"]"#,
        r#"div[data-testid="composer-trailing-actions"]"#,
        r#"form .flex.items-center.gap-2"#,
    ],
    placement: Placement::Prepend,
    stylesheet_id: "mcp-chatgpt-ui-styles",
    stylesheet: r#"
#mcp-popover-container {
  display: inline-flex;
  align-items: center;
  margin-right: 6px;
}
#mcp-popover-container .mcp-popover-toggle {
  height: 36px;
  padding: 0 12px;
  border-radius: 9999px;
  font: 500 14px/1 ui-sans-serif, -apple-system, sans-serif;
  cursor: pointer;
}
"#,
};
