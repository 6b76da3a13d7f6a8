use super::profile::{SiteId, SiteProfile};
use crate::dom::Placement;

pub static PROFILE: SiteProfile = SiteProfile {
    id: SiteId::Gemini,
    name: "Gemini",
    plugin_name: "gemini-adapter",
    home_url: "https://gemini.google.com/app",
    hostnames: &["gemini.google.com"],
    path_patterns: &[
        r"^/$",
        r"^/app/?$",
        r"^/app/[^/]+/?$",
        r"^/gem/[^/]+(/[^/]+)?/?$",
    ],
    chat_input_selectors: &[
        r#"rich-textarea .ql-editor[contenteditable="true"]"#,
        r#".ql-editor[contenteditable="true"]"#,
        r#"div[contenteditable="true"][role="textbox"]"#,
    ],
    submit_button_selectors: &[
        r#"button.send-button"#,
        r#"button[aria-label="Send message"]"#,
        r#"button[aria-label*="Send" i]"#,
    ],
    file_input_selectors: &[r#"input[type="file"][name="Filedata"]"#, r#"input[type="file"]"#],
    drop_zone_selectors: &[r#"rich-textarea"#, r#".text-input-field"#, r#".input-area"#],
    insertion_point_selectors: &[
        r#".leading-actions-wrapper"#,
        r#".input-area .leading-actions"#,
        r#"toolbox-drawer"#,
    ],
    placement: Placement::Append,
    stylesheet_id: "mcp-gemini-ui-styles",
    stylesheet: r#"
#mcp-popover-container {
  display: inline-flex;
  align-items: center;
  margin-left: 4px;
}
#mcp-popover-container .mcp-popover-toggle {
  height: 40px;
  padding: 0 14px;
  border-radius: 20px;
  font: 500 14px/1 "Google Sans", Roboto, sans-serif;
  cursor: pointer;
}
"#,
};
