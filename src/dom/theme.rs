use super::Document;
use crate::adapters::SiteId;
use log::debug;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub background: &'static str,
    pub surface: &'static str,
    pub text: &'static str,
    pub border: &'static str,
    pub accent: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Theme {
    pub mode: ThemeMode,
    pub palette: &'static Palette,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

const CLAUDE_LIGHT: Palette = Palette {
    background: "#ffffff",
    surface: "#f5f4ef",
    text: "#29261b",
    border: "#e5e4df",
    accent: "#c96442",
};
const CLAUDE_DARK: Palette = Palette {
    background: "#2b2a27",
    surface: "#1f1e1d",
    text: "#f5f4ef",
    border: "#3e3d39",
    accent: "#d97757",
};
const CHATGPT_LIGHT: Palette = Palette {
    background: "#ffffff",
    surface: "#f4f4f4",
    text: "#0d0d0d",
    border: "#e5e5e5",
    accent: "#10a37f",
};
const CHATGPT_DARK: Palette = Palette {
    background: "#212121",
    surface: "#2f2f2f",
    text: "#ececec",
    border: "#424242",
    accent: "#10a37f",
};
const GEMINI_LIGHT: Palette = Palette {
    background: "#ffffff",
    surface: "#f0f4f9",
    text: "#1f1f1f",
    border: "#c4c7c5",
    accent: "#0b57d0",
};
const GEMINI_DARK: Palette = Palette {
    background: "#131314",
    surface: "#1e1f20",
    text: "#e3e3e3",
    border: "#444746",
    accent: "#a8c7fa",
};

pub fn palette(site: SiteId, mode: ThemeMode) -> &'static Palette {
    match (site, mode) {
        (SiteId::Claude, ThemeMode::Light) => &CLAUDE_LIGHT,
        (SiteId::Claude, ThemeMode::Dark) => &CLAUDE_DARK,
        (SiteId::ChatGpt, ThemeMode::Light) => &CHATGPT_LIGHT,
        (SiteId::ChatGpt, ThemeMode::Dark) => &CHATGPT_DARK,
        (SiteId::Gemini, ThemeMode::Light) => &GEMINI_LIGHT,
        (SiteId::Gemini, ThemeMode::Dark) => &GEMINI_DARK,
    }
}

/// Parse the colour forms `getComputedStyle` produces, plus hex.
pub fn parse_css_color(input: &str) -> Option<Rgba> {
    let value = input.trim().to_ascii_lowercase();
    if value == "transparent" {
        return Some(Rgba { r: 0, g: 0, b: 0, a: 0.0 });
    }
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }

    let inner = value
        .strip_prefix("rgba(")
        .or_else(|| value.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = inner
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() < 3 {
        return None;
    }
    let channel = |s: &str| s.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
    let alpha = match parts.get(3) {
        Some(raw) => match raw.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok()? / 100.0,
            None => raw.parse::<f32>().ok()?,
        },
        None => 1.0,
    };
    Some(Rgba {
        r: channel(parts[0])?,
        g: channel(parts[1])?,
        b: channel(parts[2])?,
        a: alpha.clamp(0.0, 1.0),
    })
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let byte = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some(Rgba {
        r: byte(0)?,
        g: byte(2)?,
        b: byte(4)?,
        a: 1.0,
    })
}

/// Dark when perceived luminance is under one half. Transparent or
/// unreadable colours count as light.
pub fn classify(color: Option<&str>) -> ThemeMode {
    match color.and_then(parse_css_color) {
        Some(rgba) if rgba.a > 0.0 => {
            let luminance =
                (0.299 * rgba.r as f32 + 0.587 * rgba.g as f32 + 0.114 * rgba.b as f32) / 255.0;
            if luminance < 0.5 {
                ThemeMode::Dark
            } else {
                ThemeMode::Light
            }
        }
        _ => ThemeMode::Light,
    }
}

pub async fn detect(doc: &dyn Document, site: SiteId) -> Theme {
    let color = doc.background_color().await.unwrap_or_else(|e| {
        debug!("[theme] background colour unreadable: {}", e);
        None
    });
    let mode = classify(color.as_deref());
    Theme {
        mode,
        palette: palette(site, mode),
    }
}
