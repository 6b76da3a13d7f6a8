pub mod chatgpt;
pub mod claude;
pub mod gemini;
pub mod lifecycle;
pub mod profile;

pub use lifecycle::{AdapterState, InjectionHandle, SiteAdapter};
pub use profile::{hostname_of, SiteId, SiteProfile, UrlMatcher};

/// Get the profile for a site
pub fn profile_for(site: SiteId) -> &'static SiteProfile {
    match site {
        SiteId::Claude => &claude::PROFILE,
        SiteId::ChatGpt => &chatgpt::PROFILE,
        SiteId::Gemini => &gemini::PROFILE,
    }
}

/// Get all supported sites
pub fn all_profiles() -> [&'static SiteProfile; 3] {
    [&claude::PROFILE, &chatgpt::PROFILE, &gemini::PROFILE]
}

/// Find the site whose allow-list contains the URL's host, whatever the path.
pub fn profile_for_url(url: &str) -> Option<&'static SiteProfile> {
    let host = hostname_of(url)?;
    all_profiles()
        .into_iter()
        .find(|profile| profile.hostnames.iter().any(|allowed| *allowed == host))
}
