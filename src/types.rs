use serde::{Deserialize, Serialize};

/// Outcome of one scrapeability check.
///
/// `success == false` always carries `error` and never `detections`;
/// `success == true` never carries `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub success: bool,
    pub url: String,
    pub status_code: Option<u16>,
    pub title: String,
    pub load_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default)]
    pub console_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detections: Option<DetectionResults>,
}

impl CheckResult {
    pub fn succeeded(
        url: impl Into<String>,
        status_code: Option<u16>,
        title: impl Into<String>,
        load_time_ms: u64,
        screenshot_path: Option<String>,
        console_errors: Vec<String>,
        detections: Option<DetectionResults>,
    ) -> Self {
        Self {
            success: true,
            url: url.into(),
            status_code,
            title: title.into(),
            load_time_ms,
            screenshot_path,
            console_errors,
            error: None,
            detections,
        }
    }

    /// Builds a failed result. An empty title is reported as `"N/A"`.
    pub fn failed(
        url: impl Into<String>,
        status_code: Option<u16>,
        title: &str,
        load_time_ms: u64,
        screenshot_path: Option<String>,
        console_errors: Vec<String>,
        error: impl Into<String>,
    ) -> Self {
        let title = if title.is_empty() { "N/A" } else { title };
        Self {
            success: false,
            url: url.into(),
            status_code,
            title: title.to_string(),
            load_time_ms,
            screenshot_path,
            console_errors,
            error: Some(error.into()),
            detections: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleMessageType {
    Error,
    Warning,
}

/// A console error/warning or uncaught page error seen during navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    #[serde(rename = "type")]
    pub kind: ConsoleMessageType,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ConsoleMessage {
    pub fn now(kind: ConsoleMessageType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Sparse map of detector outputs. A missing key means the detector was
/// disabled or failed; a present key with negative values means it ran and
/// found nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_bot: Option<AntiBotDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots_txt: Option<RobotsTxtInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationInfo>,
}

impl DetectionResults {
    pub fn is_empty(&self) -> bool {
        self.anti_bot.is_none()
            && self.rate_limit.is_none()
            && self.robots_txt.is_none()
            && self.authentication.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiBotDetection {
    pub cloudflare: bool,
    pub recaptcha: bool,
    pub hcaptcha: bool,
    pub datadome: bool,
    pub perimeter81: bool,
    /// One entry per positive signal, in detection order.
    pub details: Vec<String>,
}

impl AntiBotDetection {
    pub fn any_detected(&self) -> bool {
        self.cloudflare || self.recaptcha || self.hcaptcha || self.datadome || self.perimeter81
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotsTxtInfo {
    pub exists: bool,
    pub allows_crawling: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_delay: Option<u64>,
    #[serde(default)]
    pub disallowed_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap: Option<String>,
}

impl RobotsTxtInfo {
    /// Fail-open record: crawling allowed, no rules.
    pub fn permissive(exists: bool) -> Self {
        Self {
            exists,
            allows_crawling: true,
            crawl_delay: None,
            disallowed_paths: Vec::new(),
            sitemap: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Form,
    OAuth,
    Basic,
    Session,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthType::Form => "form",
            AuthType::OAuth => "oauth",
            AuthType::Basic => "basic",
            AuthType::Session => "session",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationInfo {
    pub required: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
}
