use crate::dom::Placement;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteId {
    Claude,
    #[serde(rename = "chatgpt")]
    ChatGpt,
    Gemini,
}

impl SiteId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::ChatGpt => "chatgpt",
            Self::Gemini => "gemini",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "chatgpt" => Some(Self::ChatGpt),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }
}

/// Static description of one chat site. Selector lists are ordered most
/// specific first.
#[derive(Debug)]
pub struct SiteProfile {
    pub id: SiteId,
    pub name: &'static str,
    pub plugin_name: &'static str,
    pub home_url: &'static str,
    pub hostnames: &'static [&'static str],
    /// Regexes matched against the URL path only.
    pub path_patterns: &'static [&'static str],
    pub chat_input_selectors: &'static [&'static str],
    pub submit_button_selectors: &'static [&'static str],
    pub file_input_selectors: &'static [&'static str],
    pub drop_zone_selectors: &'static [&'static str],
    pub insertion_point_selectors: &'static [&'static str],
    pub placement: Placement,
    pub stylesheet_id: &'static str,
    pub stylesheet: &'static str,
}

/// Compiled form of a profile's URL rules.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    hostnames: &'static [&'static str],
    paths: Vec<Regex>,
}

impl UrlMatcher {
    pub fn new(profile: &SiteProfile) -> Result<Self, regex::Error> {
        let paths = profile
            .path_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            hostnames: profile.hostnames,
            paths,
        })
    }

    pub fn host_allowed(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.hostnames.iter().any(|allowed| *allowed == host)
    }

    /// Host on the allow-list and path matching one of the patterns.
    /// Query string and fragment are ignored.
    pub fn is_supported(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.host_allowed(host) && self.paths.iter().any(|re| re.is_match(parsed.path()))
    }
}

pub fn hostname_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
}
