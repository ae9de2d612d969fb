//! Scripted in-memory browser for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    Browser, BrowserError, ConsoleCapture, DomProbe, LoginFormSnapshot, Page, PageResponse,
    ResponseSnapshot, ScreenshotRequest,
};
use crate::config::Viewport;
use crate::types::ConsoleMessage;

/// Response whose header map cannot be read.
pub struct BrokenHeaders {
    pub status: u16,
}

impl PageResponse for BrokenHeaders {
    fn status(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> Result<HashMap<String, String>, BrowserError> {
        Err(BrowserError::Page("headers unavailable".to_string()))
    }
}

/// Minimal document model the fake page answers probes from.
#[derive(Debug, Clone, Default)]
pub struct FakeDocument {
    pub script_sources: Vec<String>,
    pub globals: Vec<String>,
    pub selectors: Vec<String>,
    pub login_form: LoginFormSnapshot,
    pub body_text: String,
}

#[derive(Debug, Clone)]
pub struct FakePage {
    /// `None` makes `goto` resolve without a response.
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub navigation_error: Option<String>,
    pub title: String,
    pub current_url: String,
    pub document: FakeDocument,
    pub evaluation_fails: bool,
    pub panics_on_evaluate: bool,
    /// Applied to every probe, before it is answered.
    pub evaluate_delay: Option<Duration>,
    pub console_events: Vec<ConsoleMessage>,
    pub screenshot_fails: bool,
    pub close_fails: bool,
    pub close_delay: Option<Duration>,
    pub close_calls: Arc<AtomicUsize>,
    pub screenshots: Arc<AtomicUsize>,
    pub evaluations: Arc<AtomicUsize>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            status: Some(200),
            headers: Vec::new(),
            navigation_error: None,
            title: "Test Page".to_string(),
            current_url: "https://example.com/".to_string(),
            document: FakeDocument::default(),
            evaluation_fails: false,
            panics_on_evaluate: false,
            evaluate_delay: None,
            console_events: Vec::new(),
            screenshot_fails: false,
            close_fails: false,
            close_delay: None,
            close_calls: Arc::new(AtomicUsize::new(0)),
            screenshots: Arc::new(AtomicUsize::new(0)),
            evaluations: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FakePage {
    pub fn response(&self) -> Option<ResponseSnapshot> {
        self.status
            .map(|status| ResponseSnapshot::new(status, self.headers.iter().map(|(k, v)| (k, v.clone()))))
    }

    pub fn closed(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Page for FakePage {
    async fn capture_console(&self, capture: ConsoleCapture) -> Result<(), BrowserError> {
        for event in &self.console_events {
            capture.push(event.clone());
        }
        Ok(())
    }

    async fn goto(
        &self,
        _url: &str,
        _timeout: Duration,
    ) -> Result<Option<ResponseSnapshot>, BrowserError> {
        if let Some(message) = &self.navigation_error {
            return Err(BrowserError::Navigation(message.clone()));
        }
        Ok(self.response())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.title.clone())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self.current_url.clone())
    }

    async fn evaluate(&self, probe: &DomProbe) -> Result<serde_json::Value, BrowserError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.evaluate_delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics_on_evaluate {
            panic!("probe exploded");
        }
        if self.evaluation_fails {
            return Err(BrowserError::Evaluation("Execution context was destroyed".to_string()));
        }

        let doc = &self.document;
        let value = match probe {
            DomProbe::ScriptSources => serde_json::json!(doc.script_sources),
            DomProbe::Presence(presence) => {
                let has_script = doc
                    .script_sources
                    .iter()
                    .any(|src| presence.script_markers.iter().any(|m| src.contains(m)));
                let has_global = presence
                    .global
                    .is_some_and(|name| doc.globals.iter().any(|g| g == name));
                let has_element = presence
                    .selectors
                    .iter()
                    .any(|sel| doc.selectors.iter().any(|s| s == sel));
                serde_json::json!(has_script || has_global || has_element)
            }
            DomProbe::LoginForm => serde_json::to_value(&doc.login_form)
                .map_err(|e| BrowserError::Evaluation(e.to_string()))?,
            DomProbe::BodyText => serde_json::json!(doc.body_text),
        };
        Ok(value)
    }

    async fn screenshot(&self, request: &ScreenshotRequest) -> Result<(), BrowserError> {
        if self.screenshot_fails {
            return Err(BrowserError::Screenshot("capture failed".to_string()));
        }
        std::fs::write(&request.path, b"fake-image")
            .map_err(|e| BrowserError::Screenshot(e.to_string()))?;
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self) -> Result<(), BrowserError> {
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(BrowserError::Page("target already closed".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    pub page: FakePage,
    pub new_page_fails: bool,
}

impl FakeBrowser {
    pub fn with_page(page: FakePage) -> Self {
        Self {
            page,
            new_page_fails: false,
        }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    type Page = FakePage;

    async fn new_page(
        &self,
        _viewport: Viewport,
        _user_agent: Option<&str>,
    ) -> Result<FakePage, BrowserError> {
        if self.new_page_fails {
            return Err(BrowserError::Page("browser has disconnected".to_string()));
        }
        Ok(self.page.clone())
    }
}
