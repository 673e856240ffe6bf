//! Chrome process discovery and launch.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Flags every launch gets. Site isolation is off so that cross-origin
/// consent iframes are reachable from the page's DevTools session.
const BASE_ARGS: &[&str] = &[
    "--remote-debugging-port=0",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
    "--no-zygote",
    "--disable-site-isolation-trials",
    "--disable-features=IsolateOrigins,site-per-process",
];

const EXECUTABLE_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no Chrome or Chromium executable found (set browser.executable or CHROME_PATH)")]
    NotFound,

    #[error("configured browser executable does not exist: {0}")]
    MissingExecutable(PathBuf),

    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("browser exited before announcing its DevTools endpoint")]
    Exited,

    #[error("browser did not announce its DevTools endpoint within {0:?}")]
    Timeout(Duration),
}

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub extra_args: Vec<String>,
    pub launch_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            extra_args: Vec::new(),
            launch_timeout: Duration::from_secs(20),
        }
    }
}

/// Locate a browser binary: configured path, `CHROME_PATH`, well-known
/// install locations, then `PATH`.
pub fn find_chrome(configured: Option<&Path>) -> Result<PathBuf, LaunchError> {
    if let Some(path) = configured {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(LaunchError::MissingExecutable(path.to_path_buf()))
        };
    }

    if let Some(path) = std::env::var_os("CHROME_PATH").map(PathBuf::from) {
        if path.is_file() {
            return Ok(path);
        }
        warn!(path = %path.display(), "CHROME_PATH does not point to a file, ignoring");
    }

    if let Some(path) = candidate_paths().iter().map(PathBuf::from).find(|p| p.is_file()) {
        return Ok(path);
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&path_var)
        .flat_map(|dir| EXECUTABLE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.is_file())
        .ok_or(LaunchError::NotFound)
}

fn candidate_paths() -> &'static [&'static str] {
    #[cfg(target_os = "macos")]
    {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    }

    #[cfg(target_os = "linux")]
    {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
            "/usr/lib/chromium/chromium",
        ]
    }

    #[cfg(target_os = "windows")]
    {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        &[]
    }
}

/// Full argument list for one launch.
pub fn build_args(options: &LaunchOptions, user_data_dir: &Path) -> Vec<String> {
    let mut args: Vec<String> = BASE_ARGS.iter().map(|s| s.to_string()).collect();
    args.push(format!("--user-data-dir={}", user_data_dir.display()));
    if options.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(options.extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

/// Pull the endpoint out of Chrome's `DevTools listening on ws://...` line.
pub fn parse_devtools_line(line: &str) -> Option<&str> {
    let url = line.trim().strip_prefix(DEVTOOLS_PREFIX)?.trim();
    url.starts_with("ws://").then_some(url)
}

/// A browser process owned by this run. Killed when dropped.
pub struct ChromeProcess {
    child: Child,
    ws_url: String,
    user_data_dir: PathBuf,
}

impl ChromeProcess {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, LaunchError> {
        let executable = find_chrome(options.executable.as_deref())?;
        let user_data_dir =
            std::env::temp_dir().join(format!("vendorscope-profile-{}", uuid::Uuid::new_v4()));
        let args = build_args(options, &user_data_dir);

        info!(
            executable = %executable.display(),
            headless = options.headless,
            "Launching browser"
        );
        debug!(?args, "Browser arguments");

        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                path: executable.clone(),
                source,
            })?;

        let stderr = child.stderr.take().ok_or(LaunchError::Exited)?;
        let mut lines = BufReader::new(stderr).lines();

        let ws_url = tokio::time::timeout(options.launch_timeout, async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(url) = parse_devtools_line(&line) {
                    return Ok(url.to_string());
                }
                debug!(line = %line, "browser stderr");
            }
            Err(LaunchError::Exited)
        })
        .await
        .map_err(|_| LaunchError::Timeout(options.launch_timeout))??;

        // Keep draining stderr so the browser never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(line = %line, "browser stderr");
            }
        });

        info!(ws_url = %ws_url, "Browser ready");
        Ok(Self {
            child,
            ws_url,
            user_data_dir,
        })
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Kill the process and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill browser process");
        }
    }
}

impl Drop for ChromeProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!(error = %e, dir = %self.user_data_dir.display(), "Profile dir not removed");
        }
    }
}
