//! Headless Chromium engine driven over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::{
    Browser, BrowserError, ConsoleCapture, DomProbe, Page, ResponseSnapshot, ScreenshotRequest,
};
use crate::config::{BrowserSettings, ScreenshotFormat, Viewport};
use crate::types::{ConsoleMessage, ConsoleMessageType};

pub const LAUNCH_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
];

/// Quiet period required before a navigation counts as settled.
const NETWORK_IDLE_MS: u64 = 500;

/// Slack on top of the navigation timeout for the CDP request deadline, so
/// only the navigation timeout ever fires.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

fn cdp_request_timeout(settings: &BrowserSettings) -> Duration {
    Duration::from_millis(settings.timeout_ms) + REQUEST_TIMEOUT_MARGIN
}

pub struct ChromiumBrowser {
    browser: CdpBrowser,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .args(LAUNCH_ARGS.iter().copied())
            .request_timeout(cdp_request_timeout(settings));
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        log::debug!("Launching headless Chromium");
        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("Chromium handler event error: {}", e);
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Best-effort shutdown; failures are logged.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            log::warn!("Error closing browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            log::debug!("Error waiting for browser exit: {}", e);
        }
        self.handler.abort();
    }
}

/// Launches and immediately closes a browser to see whether Chromium works.
pub async fn is_browser_available(settings: &BrowserSettings) -> bool {
    match ChromiumBrowser::launch(settings).await {
        Ok(browser) => {
            browser.close().await;
            true
        }
        Err(e) => {
            log::debug!("Chromium is not available: {}", e);
            false
        }
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    type Page = ChromiumPage;

    async fn new_page(
        &self,
        viewport: Viewport,
        user_agent: Option<&str>,
    ) -> Result<ChromiumPage, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport.width))
            .height(i64::from(viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(BrowserError::Page)?;
        page.execute(metrics)
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;

        if let Some(user_agent) = user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent))
                .await
                .map_err(|e| BrowserError::Page(e.to_string()))?;
        }

        let main_frame = page
            .mainframe()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?
            .map(|frame| frame.inner().clone());

        let responses = Arc::new(Mutex::new(Vec::new()));
        let mut events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        let sink = Arc::clone(&responses);
        let listener = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.r#type != ResourceType::Document {
                    continue;
                }
                let response = &event.response;
                let status = u16::try_from(response.status).unwrap_or_default();
                let headers = serde_json::to_value(&response.headers).unwrap_or_default();
                sink.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(DocumentResponse {
                        url: response.url.clone(),
                        frame_id: event.frame_id.as_ref().map(|frame| frame.inner().clone()),
                        snapshot: ResponseSnapshot::new(status, header_pairs(&headers)),
                    });
            }
        });

        Ok(ChromiumPage {
            page,
            main_frame,
            responses,
            listeners: Mutex::new(vec![listener]),
        })
    }
}

#[derive(Debug, Clone)]
struct DocumentResponse {
    url: String,
    frame_id: Option<String>,
    snapshot: ResponseSnapshot,
}

pub struct ChromiumPage {
    page: chromiumoxide::Page,
    main_frame: Option<String>,
    responses: Arc<Mutex<Vec<DocumentResponse>>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl ChromiumPage {
    fn track(&self, listener: JoinHandle<()>) {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    fn stop_listeners(&self) {
        let listeners = std::mem::take(
            &mut *self
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for listener in listeners {
            listener.abort();
        }
    }

    fn main_document_response(&self, final_url: Option<&str>) -> Option<ResponseSnapshot> {
        let responses = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pick_document_response(&responses, self.main_frame.as_deref(), final_url)
    }

    async fn wait_for_network_idle(&self, budget: Duration) {
        let script = format!(
            r#"(async () => {{
                const timeoutMs = {timeout_ms};
                const idleMs = {idle_ms};
                const interval = 100;
                const start = Date.now();
                let lastCount = performance.getEntriesByType('resource').length;
                let stableMs = 0;
                while (Date.now() - start < timeoutMs) {{
                    await new Promise((r) => setTimeout(r, interval));
                    const count = performance.getEntriesByType('resource').length;
                    if (document.readyState === 'complete' && count === lastCount) {{
                        stableMs += interval;
                        if (stableMs >= idleMs) {{
                            return true;
                        }}
                    }} else {{
                        stableMs = 0;
                    }}
                    lastCount = count;
                }}
                return false;
            }})()"#,
            timeout_ms = budget.as_millis(),
            idle_ms = NETWORK_IDLE_MS,
        );

        match self.page.evaluate(script).await {
            Ok(result) => {
                if !result.into_value::<bool>().unwrap_or(false) {
                    log::debug!("Network did not go idle within {:?}", budget);
                }
            }
            Err(e) => log::debug!("Network idle wait failed: {}", e),
        }
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.stop_listeners();
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn capture_console(&self, capture: ConsoleCapture) -> Result<(), BrowserError> {
        let mut console = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        let mut exceptions = self
            .page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;

        let console_sink = capture.clone();
        self.track(tokio::spawn(async move {
            while let Some(event) = console.next().await {
                let kind = match event.r#type {
                    ConsoleApiCalledType::Error => ConsoleMessageType::Error,
                    ConsoleApiCalledType::Warning => ConsoleMessageType::Warning,
                    _ => continue,
                };
                console_sink.push(ConsoleMessage::now(kind, console_text(&event.args)));
            }
        }));

        self.track(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                let details = &event.exception_details;
                let text = details
                    .exception
                    .as_ref()
                    .and_then(|exception| exception.description.as_deref())
                    .and_then(|description| description.lines().next())
                    .unwrap_or(details.text.as_str())
                    .to_string();
                capture.push(ConsoleMessage::now(ConsoleMessageType::Error, text));
            }
        }));

        Ok(())
    }

    async fn goto(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<ResponseSnapshot>, BrowserError> {
        let started = Instant::now();
        let navigation = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            let remaining = timeout.saturating_sub(started.elapsed());
            self.wait_for_network_idle(remaining).await;
            Ok::<_, BrowserError>(())
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| BrowserError::Timeout(timeout))??;

        let final_url = self.page.url().await.ok().flatten();
        Ok(self.main_document_response(final_url.as_deref()))
    }

    async fn title(&self) -> Result<String, BrowserError> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn evaluate(&self, probe: &DomProbe) -> Result<serde_json::Value, BrowserError> {
        let result = self
            .page
            .evaluate(probe.script())
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        result
            .into_value::<serde_json::Value>()
            .map_err(|e| BrowserError::Evaluation(e.to_string()))
    }

    async fn screenshot(&self, request: &ScreenshotRequest) -> Result<(), BrowserError> {
        let mut params = ScreenshotParams::builder().full_page(request.full_page);
        params = match request.format {
            ScreenshotFormat::Png => params.format(CaptureScreenshotFormat::Png),
            ScreenshotFormat::Jpeg => params
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(i64::from(request.quality)),
        };

        self.page
            .save_screenshot(params.build(), &request.path)
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))?;
        Ok(())
    }

    async fn close(self) -> Result<(), BrowserError> {
        self.stop_listeners();
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))
    }
}

/// Console API arguments joined the way DevTools prints them.
fn console_text(args: &[RemoteObject]) -> String {
    args.iter()
        .filter_map(|arg| match &arg.value {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(value) => Some(value.to_string()),
            None => arg.description.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn header_pairs(headers: &serde_json::Value) -> Vec<(String, String)> {
    let Some(map) = headers.as_object() else {
        return Vec::new();
    };
    map.iter()
        .map(|(name, value)| {
            let value = match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
        .collect()
}

/// Main-document response of the top-level frame: the last one whose URL
/// matches the final URL ignoring fragments, else the first one recorded
/// (in-page navigations such as `pushState`). Documents loaded by other
/// frames never count. With an unknown main frame every document counts.
fn pick_document_response(
    responses: &[DocumentResponse],
    main_frame: Option<&str>,
    final_url: Option<&str>,
) -> Option<ResponseSnapshot> {
    let in_main_frame = |response: &&DocumentResponse| match main_frame {
        Some(frame) => response.frame_id.as_deref() == Some(frame),
        None => true,
    };

    final_url
        .map(without_fragment)
        .and_then(|url| {
            responses
                .iter()
                .filter(in_main_frame)
                .rev()
                .find(|response| without_fragment(&response.url) == url)
        })
        .or_else(|| responses.iter().find(in_main_frame))
        .map(|response| response.snapshot.clone())
}

fn without_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}
