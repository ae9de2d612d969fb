use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MIN_TIMEOUT_MS: u64 = 5_000;
pub const MIN_VIEWPORT_WIDTH: u32 = 320;
pub const MIN_VIEWPORT_HEIGHT: u32 = 240;
pub const DEFAULT_SCREENSHOT_DIR: &str = ".scrape-check";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    #[default]
    Png,
    Jpeg,
}

impl ScreenshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Jpeg => "jpeg",
        }
    }
}

/// Which page-loading engine backs a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Headless Chromium over CDP
    #[default]
    Chromium,
    /// Single HTTP GET parsed as a static HTML snapshot (no JavaScript)
    Http,
}

/// Per-detector enable switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DetectionToggles {
    pub anti_bot: bool,
    pub rate_limit: bool,
    pub robots_txt: bool,
    pub authentication: bool,
}

impl Default for DetectionToggles {
    fn default() -> Self {
        Self::all()
    }
}

impl DetectionToggles {
    pub const fn all() -> Self {
        Self {
            anti_bot: true,
            rate_limit: true,
            robots_txt: true,
            authentication: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            anti_bot: false,
            rate_limit: false,
            robots_txt: false,
            authentication: false,
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.anti_bot || self.rate_limit || self.robots_txt || self.authentication
    }
}

/// Confidence policy for the authentication detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationPolicy {
    /// Total indicators needed before weak signals (keywords, URL path)
    /// alone mark a page as requiring authentication.
    pub min_weak_indicators: usize,
}

impl Default for AuthenticationPolicy {
    fn default() -> Self {
        Self {
            min_weak_indicators: 2,
        }
    }
}

/// Immutable settings for one check. Build it once, then only read it.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOptions {
    pub timeout: Duration,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub screenshot_enabled: bool,
    pub screenshot_path: PathBuf,
    pub screenshot_format: ScreenshotFormat,
    pub screenshot_quality: u8,
    pub check_console_errors: bool,
    pub detections: DetectionToggles,
    pub authentication: AuthenticationPolicy,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            viewport: Viewport::default(),
            user_agent: None,
            screenshot_enabled: true,
            screenshot_path: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            screenshot_format: ScreenshotFormat::Png,
            screenshot_quality: 90,
            check_console_errors: true,
            detections: DetectionToggles::all(),
            authentication: AuthenticationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub engine: Engine,
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Explicit Chromium binary; discovered automatically when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    pub viewport: Viewport,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            engine: Engine::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: None,
            executable: None,
            viewport: Viewport::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotSettings {
    pub enabled: bool,
    pub path: String,
    pub format: ScreenshotFormat,
    pub quality: u8,
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: DEFAULT_SCREENSHOT_DIR.to_string(),
            format: ScreenshotFormat::Png,
            quality: 90,
        }
    }
}

/// On-disk configuration (TOML). Every field falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub check_console_errors: bool,
    pub browser: BrowserSettings,
    pub screenshot: ScreenshotSettings,
    pub detections: DetectionToggles,
    pub authentication: AuthenticationPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            check_console_errors: true,
            browser: BrowserSettings::default(),
            screenshot: ScreenshotSettings::default(),
            detections: DetectionToggles::default(),
            authentication: AuthenticationPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(raw)?;
        config.browser.user_agent = config
            .browser
            .user_agent
            .take()
            .map(|agent| agent.trim().to_string())
            .filter(|agent| !agent.is_empty());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Collects every violated bound rather than stopping at the first one.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.browser.timeout_ms < MIN_TIMEOUT_MS {
            errors.push(format!("Browser timeout must be at least {}ms", MIN_TIMEOUT_MS));
        }
        if self.browser.viewport.width < MIN_VIEWPORT_WIDTH {
            errors.push(format!("Viewport width must be at least {}px", MIN_VIEWPORT_WIDTH));
        }
        if self.browser.viewport.height < MIN_VIEWPORT_HEIGHT {
            errors.push(format!("Viewport height must be at least {}px", MIN_VIEWPORT_HEIGHT));
        }
        if self.screenshot.path.trim().is_empty() {
            errors.push("Screenshot path cannot be empty".to_string());
        }
        if self.screenshot.quality > 100 {
            errors.push("Screenshot quality must be between 0 and 100".to_string());
        }

        errors
    }

    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Freezes the file settings into per-check options. A relative
    /// screenshot directory is resolved against `base_dir`.
    pub fn to_check_options(&self, base_dir: &Path) -> CheckOptions {
        let screenshot_dir = PathBuf::from(&self.screenshot.path);
        let screenshot_path = if screenshot_dir.is_absolute() {
            screenshot_dir
        } else {
            base_dir.join(screenshot_dir)
        };

        CheckOptions {
            timeout: Duration::from_millis(self.browser.timeout_ms),
            viewport: self.browser.viewport,
            user_agent: self.browser.user_agent.clone(),
            screenshot_enabled: self.screenshot.enabled,
            screenshot_path,
            screenshot_format: self.screenshot.format,
            screenshot_quality: self.screenshot.quality,
            check_console_errors: self.check_console_errors,
            detections: self.detections,
            authentication: self.authentication,
        }
    }
}

/// Per-check adjustments layered over an [`AppConfig`], shared by the CLI
/// flags and the `POST /api/check` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckOverrides {
    pub timeout_ms: Option<u64>,
    pub engine: Option<Engine>,
    pub user_agent: Option<String>,
    pub no_screenshot: bool,
    pub no_detections: bool,
    pub skip_anti_bot: bool,
    pub skip_rate_limit: bool,
    pub skip_robots_txt: bool,
    pub skip_authentication: bool,
}

impl CheckOverrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(timeout_ms) = self.timeout_ms {
            config.browser.timeout_ms = timeout_ms;
        }
        if let Some(engine) = self.engine {
            config.browser.engine = engine;
        }
        if let Some(agent) = self.user_agent.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            config.browser.user_agent = Some(agent.to_string());
        }
        if self.no_screenshot {
            config.screenshot.enabled = false;
        }

        if self.no_detections {
            config.detections = DetectionToggles::none();
        }
        let toggles = &mut config.detections;
        toggles.anti_bot &= !self.skip_anti_bot;
        toggles.rate_limit &= !self.skip_rate_limit;
        toggles.robots_txt &= !self.skip_robots_txt;
        toggles.authentication &= !self.skip_authentication;
    }
}
