use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

const DEBUG_PORT_START: u16 = 9300;
const DEBUG_PORT_END: u16 = 9800;

/// One entry of Chrome's `/json/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpTarget {
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromeSessionMode {
    Attached,
    ReusedExisting,
    LaunchedNew,
}

impl ChromeSessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attached => "attached",
            Self::ReusedExisting => "reused_existing",
            Self::LaunchedNew => "launched_new",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChromeSession {
    pub port: u16,
    pub mode: ChromeSessionMode,
}

/// Allocate an available debugging port by probing localhost listeners.
pub fn allocate_port() -> Result<u16> {
    for port in DEBUG_PORT_START..=DEBUG_PORT_END {
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }

    bail!(
        "No available Chrome debugging port in range {}-{}",
        DEBUG_PORT_START,
        DEBUG_PORT_END
    )
}

/// Detect Chrome installation path on the current OS
pub fn detect_chrome() -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let paths = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for p in &paths {
            let path = PathBuf::from(p);
            if path.exists() {
                return Ok(path);
            }
        }
        if let Ok(path) = which::which("google-chrome") {
            return Ok(path);
        }
    }

    #[cfg(target_os = "windows")]
    {
        let paths = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for p in &paths {
            let path = PathBuf::from(p);
            if path.exists() {
                return Ok(path);
            }
        }
        if let Ok(path) = which::which("chrome") {
            return Ok(path);
        }
    }

    #[cfg(target_os = "linux")]
    {
        let names = [
            "google-chrome",
            "google-chrome-stable",
            "chromium-browser",
            "chromium",
        ];
        for name in &names {
            if let Ok(path) = which::which(name) {
                return Ok(path);
            }
        }
    }

    bail!("Could not find Chrome browser. Please install Google Chrome.")
}

/// Base directory holding the bridge's Chrome profiles.
pub fn profiles_base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot find home directory")?;
    let base = home.join(".mcp-popover-bridge").join("profiles");
    std::fs::create_dir_all(&base)?;
    Ok(base)
}

/// Profile directory for `name`, created if missing. Path separators and
/// other unsafe characters in the name are replaced.
pub fn profile_dir(name: &str) -> Result<PathBuf> {
    let dir = profiles_base_dir()?.join(sanitize_profile_name(name));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn sanitize_profile_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// Launch Chrome with a debugging port and return (Child, port)
pub fn launch_chrome_with_debug(
    chrome_path: &Path,
    profile_dir: &Path,
    url: &str,
) -> Result<(Child, u16)> {
    let port = allocate_port()?;
    info!(
        "[Chrome launch] profile={} port={} url={}",
        profile_dir.display(),
        port,
        url
    );

    let child = Command::new(chrome_path)
        .arg(format!("--user-data-dir={}", profile_dir.display()))
        .arg(format!("--remote-debugging-port={}", port))
        .arg("--new-window")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-default-apps")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-renderer-backgrounding")
        .arg(format!("--window-size={},{}", 1280, 900))
        .arg(url)
        .spawn()
        .context("Failed to launch Chrome")?;

    info!("Launched Chrome (PID: {}, port: {})", child.id(), port);
    Ok((child, port))
}

/// Get a debuggable Chrome for `profile_dir`:
/// - an explicit port is attached to as-is,
/// - a running debuggable session on the profile is reused,
/// - a profile locked by a non-debuggable Chrome is an error,
/// - otherwise a new Chrome is launched on `url`.
pub async fn prepare_chrome_session(
    explicit_port: Option<u16>,
    profile_dir: &Path,
    url: &str,
) -> Result<ChromeSession> {
    if let Some(port) = explicit_port {
        return Ok(ChromeSession {
            port,
            mode: ChromeSessionMode::Attached,
        });
    }

    if let Some(port) = discover_profile_debug_port(profile_dir).await? {
        info!(
            "[Chrome session] reusing debuggable session profile={} port={}",
            profile_dir.display(),
            port
        );
        return Ok(ChromeSession {
            port,
            mode: ChromeSessionMode::ReusedExisting,
        });
    }

    if is_profile_busy(profile_dir) {
        bail!(
            "PROFILE_BUSY: Chrome is already running on profile {} without a debugging port. Close it and retry.",
            profile_dir.display()
        );
    }

    let chrome_path = detect_chrome()?;
    // The child is left running when the bridge exits, like a user-opened window.
    let (_child, port) = launch_chrome_with_debug(&chrome_path, profile_dir, url)?;
    Ok(ChromeSession {
        port,
        mode: ChromeSessionMode::LaunchedNew,
    })
}

/// Wait until the debugging endpoint answers and lists a page target.
/// Returns the active port, which may differ after one profile rediscovery.
pub async fn wait_for_chrome_ready(
    session: &ChromeSession,
    profile_dir: &Path,
    timeout_secs: u64,
) -> Result<u16> {
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    let mut active_port = session.port;
    let mut saw_version = false;
    let mut rediscovered_once = session.mode == ChromeSessionMode::Attached;

    loop {
        if start.elapsed() > timeout {
            if saw_version {
                bail!(
                    "CHROME_NOT_READY: port {} answers but has no page target after {}s",
                    active_port,
                    timeout_secs
                );
            }
            bail!(
                "CHROME_NOT_READY: Chrome did not open port {} within {}s",
                active_port,
                timeout_secs
            );
        }

        if is_port_version_ready(active_port).await {
            saw_version = true;
            match page_targets(active_port).await {
                Ok(targets) if targets.iter().any(|t| t.target_type == "page") => {
                    info!("Chrome is ready on port {}", active_port);
                    return Ok(active_port);
                }
                Ok(_) => debug!("Chrome on port {} has no page target yet", active_port),
                Err(e) => debug!("Chrome on port {} target list failed: {}", active_port, e),
            }
        }

        if !rediscovered_once {
            if let Some(discovered_port) = discover_profile_debug_port(profile_dir).await? {
                if discovered_port != active_port {
                    info!(
                        "[Chrome ready] switched port by profile rediscovery: {} -> {}",
                        active_port, discovered_port
                    );
                    active_port = discovered_port;
                }
            }
            rediscovered_once = true;
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Discover an existing debuggable Chrome session port for a profile.
pub async fn discover_profile_debug_port(profile_dir: &Path) -> Result<Option<u16>> {
    let mut candidates: BTreeSet<u16> = BTreeSet::new();
    if let Some(port) = read_devtools_active_port(profile_dir) {
        candidates.insert(port);
    }
    for port in running_profile_debug_ports(profile_dir) {
        candidates.insert(port);
    }

    for port in candidates {
        if is_port_version_ready(port).await {
            return Ok(Some(port));
        }
    }

    Ok(None)
}

fn read_devtools_active_port(profile_dir: &Path) -> Option<u16> {
    let file = profile_dir.join("DevToolsActivePort");
    let body = std::fs::read_to_string(file).ok()?;
    let first_line = body.lines().next()?.trim();
    first_line.parse::<u16>().ok()
}

#[cfg(unix)]
fn running_profile_debug_ports(profile_dir: &Path) -> Vec<u16> {
    let output = match Command::new("ps").args(["-ax", "-o", "command="]).output() {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| matches_profile_user_data_dir(line, profile_dir))
        .filter_map(|line| extract_flag_u16(line, "--remote-debugging-port="))
        .collect()
}

#[cfg(not(unix))]
fn running_profile_debug_ports(_profile_dir: &Path) -> Vec<u16> {
    Vec::new()
}

fn matches_profile_user_data_dir(cmdline: &str, profile_dir: &Path) -> bool {
    let profile = profile_dir.to_string_lossy();
    [
        format!("--user-data-dir={}", profile),
        format!("--user-data-dir=\"{}\"", profile),
        format!("--user-data-dir='{}'", profile),
    ]
    .iter()
    .any(|flag| cmdline.contains(flag.as_str()))
}

fn extract_flag_u16(cmdline: &str, prefix: &str) -> Option<u16> {
    cmdline.split_whitespace().find_map(|token| {
        token
            .strip_prefix(prefix)
            .and_then(|raw| raw.trim_matches('"').trim_matches('\'').parse::<u16>().ok())
    })
}

async fn is_port_version_ready(port: u16) -> bool {
    let version_url = format!("http://127.0.0.1:{}/json/version", port);
    match reqwest::get(&version_url).await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

fn singleton_lock_pid(profile_dir: &Path) -> Option<u32> {
    let target = std::fs::read_link(profile_dir.join("SingletonLock")).ok()?;
    let name = target.file_name()?.to_string_lossy();
    name.rsplit('-').next()?.parse::<u32>().ok()
}

#[cfg(unix)]
fn is_pid_running(pid: u32) -> bool {
    let pid_text = pid.to_string();
    match Command::new("ps").args(["-p", &pid_text, "-o", "pid="]).output() {
        Ok(output) if output.status.success() => {
            !String::from_utf8_lossy(&output.stdout).trim().is_empty()
        }
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_pid_running(_pid: u32) -> bool {
    false
}

pub fn is_profile_busy(profile_dir: &Path) -> bool {
    let locked = ["SingletonLock", "SingletonCookie", "SingletonSocket"]
        .iter()
        .any(|name| profile_dir.join(name).exists());
    if !locked {
        return false;
    }
    match singleton_lock_pid(profile_dir) {
        Some(pid) => is_pid_running(pid),
        None => true,
    }
}

/// Targets currently listed by the debugging endpoint.
pub async fn page_targets(port: u16) -> Result<Vec<CdpTarget>> {
    let list_url = format!("http://127.0.0.1:{}/json/list", port);
    let resp = reqwest::get(&list_url)
        .await
        .context("Failed to request Chrome json/list")?;
    if !resp.status().is_success() {
        return Ok(Vec::new());
    }
    let targets = resp
        .json::<Vec<CdpTarget>>()
        .await
        .context("Invalid Chrome json/list body")?;
    Ok(targets)
}
