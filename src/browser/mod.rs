//! Page-loading collaborators used by the checker and detectors.
//!
//! The core never talks to a concrete browser. It drives a [`Browser`] that
//! hands out [`Page`]s, reads headers through [`PageResponse`] and inspects
//! the document through a closed set of read-only [`DomProbe`]s. Two engines
//! implement these traits: headless Chromium (`chromium` feature) and a
//! browserless HTTP snapshot engine.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ScreenshotFormat, Viewport};
use crate::types::ConsoleMessage;

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod http;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser. Is Chromium installed? ({0})")]
    Launch(String),

    #[error("page error: {0}")]
    Page(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("navigation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("page evaluation failed: {0}")]
    Evaluation(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("{0} is not supported by this engine")]
    Unsupported(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Source of pages. Launch and shutdown belong to the concrete engine.
#[async_trait]
pub trait Browser: Send + Sync {
    type Page: Page;

    async fn new_page(
        &self,
        viewport: Viewport,
        user_agent: Option<&str>,
    ) -> Result<Self::Page, BrowserError>;
}

/// One tab. Detectors only ever get `&Page`, and every probe is read-only.
#[async_trait]
pub trait Page: Send + Sync {
    /// Starts appending console errors/warnings and uncaught page errors to
    /// `capture`. Must be called before [`Page::goto`].
    async fn capture_console(&self, capture: ConsoleCapture) -> Result<(), BrowserError>;

    /// Navigates and waits for the network to settle. `Ok(None)` means the
    /// navigation produced no inspectable main-document response.
    async fn goto(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<ResponseSnapshot>, BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    async fn url(&self) -> Result<String, BrowserError>;

    async fn evaluate(&self, probe: &DomProbe) -> Result<serde_json::Value, BrowserError>;

    async fn screenshot(&self, request: &ScreenshotRequest) -> Result<(), BrowserError>;

    async fn close(self) -> Result<(), BrowserError>
    where
        Self: Sized;
}

/// Main-document response as seen by the detectors.
pub trait PageResponse: Send + Sync {
    fn status(&self) -> u16;

    /// Header map keyed by lower-cased header name.
    fn headers(&self) -> Result<HashMap<String, String>, BrowserError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl ResponseSnapshot {
    pub fn new<I, K, V>(status: u16, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
            .collect();
        Self { status, headers }
    }
}

impl PageResponse for ResponseSnapshot {
    fn status(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> Result<HashMap<String, String>, BrowserError> {
        Ok(self.headers.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotRequest {
    pub path: PathBuf,
    pub full_page: bool,
    pub format: ScreenshotFormat,
    pub quality: u8,
}

/// Shared append-only sink for console messages.
#[derive(Debug, Clone, Default)]
pub struct ConsoleCapture {
    messages: Arc<Mutex<Vec<ConsoleMessage>>>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: ConsoleMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }

    pub fn messages(&self) -> Vec<ConsoleMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Message texts in append order.
    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|message| message.text).collect()
    }
}

/// Marker-based presence test: any script `src` containing a marker, a
/// defined window global, or an element matching a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceProbe {
    pub script_markers: &'static [&'static str],
    pub global: Option<&'static str>,
    pub selectors: &'static [&'static str],
}

/// Read-only document probes a page can answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomProbe {
    /// `src` of every `<script>`; answers `Vec<String>`.
    ScriptSources,
    /// Answers `bool`.
    Presence(PresenceProbe),
    /// Answers [`LoginFormSnapshot`].
    LoginForm,
    /// Visible body text; answers `String`.
    BodyText,
}

impl DomProbe {
    /// JavaScript expression evaluated in the page by script-capable engines.
    pub fn script(&self) -> String {
        match self {
            DomProbe::ScriptSources => {
                "Array.from(document.getElementsByTagName('script')).map((s) => s.src).filter((src) => src)"
                    .to_string()
            }
            DomProbe::Presence(probe) => {
                let markers = serde_json::to_string(probe.script_markers).unwrap_or_else(|_| "[]".into());
                let selectors = serde_json::to_string(probe.selectors).unwrap_or_else(|_| "[]".into());
                let global = probe
                    .global
                    .and_then(|name| serde_json::to_string(name).ok())
                    .unwrap_or_else(|| "null".into());
                format!(
                    r#"(() => {{
                        const markers = {markers};
                        const selectors = {selectors};
                        const globalName = {global};
                        const hasScript = Array.from(document.getElementsByTagName('script'))
                            .some((s) => markers.some((m) => s.src.includes(m)));
                        const hasGlobal = globalName !== null && typeof window[globalName] !== 'undefined';
                        const hasElement = selectors.some((sel) => document.querySelector(sel) !== null);
                        return hasScript || hasGlobal || hasElement;
                    }})()"#
                )
            }
            DomProbe::LoginForm => r#"(() => {
                    const passwordInput = document.querySelector('input[type="password"]');
                    if (!passwordInput) {
                        return { hasPasswordInput: false };
                    }
                    const form = passwordInput.closest('form');
                    if (!form) {
                        return { hasPasswordInput: true, hasForm: false };
                    }
                    const hasUsernameInput =
                        form.querySelector('input[type="text"]') !== null ||
                        form.querySelector('input[type="email"]') !== null ||
                        form.querySelector('input[name*="user"]') !== null ||
                        form.querySelector('input[name*="email"]') !== null;
                    return { hasPasswordInput: true, hasForm: true, hasUsernameInput, action: form.action };
                })()"#
                .to_string(),
            DomProbe::BodyText => "document.body ? document.body.innerText : ''".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginFormSnapshot {
    pub has_password_input: bool,
    #[serde(default)]
    pub has_form: bool,
    #[serde(default)]
    pub has_username_input: bool,
    #[serde(default)]
    pub action: Option<String>,
}

/// Evaluates `probe` and decodes the answer.
pub async fn probe<P, T>(page: &P, probe: &DomProbe) -> Result<T, BrowserError>
where
    P: Page + ?Sized,
    T: DeserializeOwned,
{
    let value = page.evaluate(probe).await?;
    serde_json::from_value(value).map_err(|e| BrowserError::Evaluation(e.to_string()))
}
