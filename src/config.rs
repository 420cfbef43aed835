use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8888";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "10m";

/// Editing apps the guidance prompt knows by name. Anything else is still
/// forwarded as typed.
pub const KNOWN_EDITING_APPS: [&str; 5] = ["CapCut", "Canva", "InShot", "DaVinci Resolve", "Other"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server_url: String,
    pub request_timeout: String,
    pub selected_app: String,
    pub capture: CaptureConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT.to_string(),
            selected_app: String::new(),
            capture: CaptureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: "screencapture".to_string(),
            args: vec!["-v".to_string(), "-x".to_string(), "preview.mov".to_string()],
        }
    }
}

impl AppConfig {
    /// Missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&text).with_context(|| {
            format!("failed to parse config {} (expected TOML)", path.display())
        })?;
        config.request_timeout()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration(&self.request_timeout)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("invalid request_timeout {:?}", self.request_timeout))
    }
}

pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let duration = humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than 0".to_string());
    }
    Ok(duration)
}

pub fn ensure_sample_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create config parent directory {}",
                parent.display()
            )
        })?;
    }

    let sample = r#"# Video Edit Assistant configuration (TOML)

# Base URL of the analysis/chat service.
server_url = "http://localhost:8888"

# Upper bound for a single analyze or chat request (e.g. "90s", "10m").
request_timeout = "10m"

# Editing app used for guidance: CapCut, Canva, InShot, DaVinci Resolve, Other.
selected_app = ""

[capture]
# Command that records the screen while sharing is on. It is killed on stop;
# if it exits by itself, sharing is treated as ended.
command = "screencapture"
args = ["-v", "-x", "preview.mov"]
"#;

    std::fs::write(path, sample)
        .with_context(|| format!("failed to write sample config {}", path.display()))?;
    Ok(true)
}
