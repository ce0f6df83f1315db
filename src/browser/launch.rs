//! Browser launch: candidate-chain executable discovery + CDP launch.

use std::path::PathBuf;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;

/// Locations a bundled headless shell is installed to in production images.
const BUNDLED_PATHS: &[&str] = &[
    "/opt/threadharvest/chrome-headless-shell/chrome-headless-shell",
    "/usr/lib/threadharvest/chrome-headless-shell",
];

/// Locally installed browsers, probed in order.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

/// Browser names resolved through `which`, stable channels first. The
/// pre-release channels are only tried outside production builds.
const PATH_LOOKUPS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];
const CHANNEL_LOOKUPS: &[&str] = &["google-chrome-beta", "google-chrome-unstable", "chrome"];

fn which(command: &str) -> Option<PathBuf> {
    let output = std::process::Command::new("which").arg(command).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// Candidate executables in launch order: bundled shell (production Linux
/// only), the `CHROME_EXECUTABLE_PATH` override, probed install paths,
/// `which` lookups, then pre-release channels in dev builds.
pub fn candidate_executables() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if cfg!(all(target_os = "linux", not(debug_assertions))) {
        for path in BUNDLED_PATHS {
            let p = PathBuf::from(path);
            if p.exists() {
                candidates.push(p);
            }
        }
    }

    if let Ok(path) = std::env::var("CHROME_EXECUTABLE_PATH") {
        let p = PathBuf::from(path.trim());
        if p.exists() {
            candidates.push(p);
        } else {
            warn!("CHROME_EXECUTABLE_PATH points at a missing file: {:?}", p);
        }
    }

    for path in CHROME_PATHS {
        let p = PathBuf::from(path);
        if p.exists() && !candidates.contains(&p) {
            candidates.push(p);
        }
    }

    for command in PATH_LOOKUPS {
        if let Some(p) = which(command) {
            if !candidates.contains(&p) {
                candidates.push(p);
            }
        }
    }

    if cfg!(debug_assertions) {
        for command in CHANNEL_LOOKUPS {
            if let Some(p) = which(command) {
                if !candidates.contains(&p) {
                    candidates.push(p);
                }
            }
        }
    }

    candidates
}

fn build_config(executable: &PathBuf, proxy: Option<&str>) -> Result<BrowserConfig, ScrapeError> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(executable)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--mute-audio")
        .arg("--no-sandbox")
        .arg("--disable-gpu")
        .arg("--disable-software-rasterizer");

    if let Some(proxy) = proxy {
        builder = builder.arg(format!("--proxy-server={proxy}"));
    }

    builder
        .build()
        .map_err(|e| ScrapeError::BrowserLaunch(format!("failed to build browser config: {e}")))
}

/// Launch the first candidate that starts, spawning its CDP event loop.
pub async fn launch(proxy: Option<&str>) -> Result<(Browser, JoinHandle<()>), ScrapeError> {
    let candidates = candidate_executables();
    if candidates.is_empty() {
        return Err(ScrapeError::BrowserLaunch(
            "Chrome/Chromium not found; install one or set CHROME_EXECUTABLE_PATH".to_string(),
        ));
    }

    let mut failures = Vec::new();
    for executable in &candidates {
        debug!("Trying browser executable {:?}", executable);
        let config = build_config(executable, proxy)?;
        match Browser::launch(config).await {
            Ok((browser, mut handler)) => {
                info!(
                    "Launched headless browser {:?} (proxy: {})",
                    executable,
                    proxy.unwrap_or("none")
                );
                let handle = tokio::spawn(async move {
                    while let Some(event) = handler.next().await {
                        if event.is_err() {
                            break;
                        }
                    }
                });
                return Ok((browser, handle));
            }
            Err(e) => {
                warn!("Browser candidate {:?} failed to launch: {}", executable, e);
                failures.push(format!("{executable:?}: {e}"));
            }
        }
    }

    Err(ScrapeError::BrowserLaunch(format!(
        "no candidate executable worked: {}",
        failures.join("; ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_list_dedupes() {
        let candidates = candidate_executables();
        for (i, a) in candidates.iter().enumerate() {
            assert!(!candidates[i + 1..].contains(a));
        }
    }
}
