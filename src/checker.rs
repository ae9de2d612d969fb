use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Instant;

#[cfg(feature = "chromium")]
use crate::browser::chromium::ChromiumBrowser;
use crate::browser::http::HttpBrowser;
use crate::browser::{Browser, ConsoleCapture, Page, PageResponse, ScreenshotRequest};
use crate::config::{BrowserSettings, CheckOptions, Engine};
use crate::detectors::run_detections;
use crate::types::{CheckResult, DetectionResults};
use crate::utils::url_to_filename;

/// Whatever a check managed to observe before it finished or failed.
#[derive(Debug, Default)]
struct Observed {
    status_code: Option<u16>,
    title: String,
    screenshot_path: Option<String>,
}

/// Runs one scrapeability check. Never fails: every error ends up in
/// [`CheckResult::error`]. The page is closed exactly once.
pub async fn check_page_scrapeability<B>(browser: &B, url: &str, options: &CheckOptions) -> CheckResult
where
    B: Browser,
{
    let start = Instant::now();
    let console = ConsoleCapture::new();

    let page = match browser
        .new_page(options.viewport, options.user_agent.as_deref())
        .await
        .context("Failed to open a new page")
    {
        Ok(page) => page,
        Err(e) => {
            log::error!("Check of {} failed: {:#}", url, e);
            return CheckResult::failed(url, None, "", elapsed_ms(start), None, Vec::new(), format!("{:#}", e));
        }
    };

    let mut observed = Observed::default();
    let outcome = run_check(&page, url, options, &console, &mut observed).await;
    let load_time_ms = elapsed_ms(start);

    if let Err(e) = page.close().await {
        log::warn!("Error closing page: {}", e);
    }

    match outcome {
        Ok(detections) => {
            log::info!("Checked {} in {}ms", url, load_time_ms);
            CheckResult::succeeded(
                url,
                observed.status_code,
                observed.title,
                load_time_ms,
                observed.screenshot_path,
                console.texts(),
                detections,
            )
        }
        Err(e) => {
            log::error!("Check of {} failed: {:#}", url, e);
            CheckResult::failed(
                url,
                observed.status_code,
                &observed.title,
                load_time_ms,
                observed.screenshot_path,
                console.texts(),
                format!("{:#}", e),
            )
        }
    }
}

/// Starts the configured engine, runs one check and shuts the engine down.
/// Only engine startup can fail; the check itself always yields a result.
pub async fn check_with_engine(
    settings: &BrowserSettings,
    url: &str,
    options: &CheckOptions,
) -> Result<CheckResult> {
    match settings.engine {
        Engine::Http => {
            let browser = HttpBrowser::new().context("Failed to build HTTP client")?;
            let options = if options.screenshot_enabled {
                log::debug!("HTTP engine cannot take screenshots, skipping");
                CheckOptions {
                    screenshot_enabled: false,
                    ..options.clone()
                }
            } else {
                options.clone()
            };
            Ok(check_page_scrapeability(&browser, url, &options).await)
        }
        Engine::Chromium => check_with_chromium(settings, url, options).await,
    }
}

#[cfg(feature = "chromium")]
async fn check_with_chromium(
    settings: &BrowserSettings,
    url: &str,
    options: &CheckOptions,
) -> Result<CheckResult> {
    let browser = ChromiumBrowser::launch(settings).await?;
    let result = check_page_scrapeability(&browser, url, options).await;
    browser.close().await;
    Ok(result)
}

#[cfg(not(feature = "chromium"))]
async fn check_with_chromium(
    _settings: &BrowserSettings,
    _url: &str,
    _options: &CheckOptions,
) -> Result<CheckResult> {
    anyhow::bail!("this build has no Chromium support; use the http engine")
}

async fn run_check<P>(
    page: &P,
    url: &str,
    options: &CheckOptions,
    console: &ConsoleCapture,
    observed: &mut Observed,
) -> Result<Option<DetectionResults>>
where
    P: Page,
{
    if options.check_console_errors {
        if let Err(e) = page.capture_console(console.clone()).await {
            log::warn!("Console capture unavailable: {}", e);
        }
    }

    log::debug!("Navigating to {} (timeout {:?})", url, options.timeout);
    let response = page
        .goto(url, options.timeout)
        .await
        .with_context(|| format!("Failed to load {}", url))?;

    observed.status_code = response.as_ref().map(|response| response.status());
    observed.title = page.title().await.context("Failed to read page title")?;

    if options.screenshot_enabled {
        observed.screenshot_path = capture_screenshot(page, url, options).await;
    }

    if !options.detections.any_enabled() {
        return Ok(None);
    }

    let response = response.as_ref().map(|response| response as &dyn PageResponse);
    let detections = run_detections(page, response, url, options).await;
    Ok(Some(detections))
}

/// Full-page capture into `{screenshot_path}/{host-date}.{ext}`. Failures
/// are logged and yield `None`.
async fn capture_screenshot<P>(page: &P, url: &str, options: &CheckOptions) -> Option<String>
where
    P: Page,
{
    let directory = &options.screenshot_path;
    if let Err(e) = tokio::fs::create_dir_all(directory).await {
        log::warn!("Failed to create screenshot directory {}: {}", directory.display(), e);
        return None;
    }

    let path: PathBuf = directory.join(format!(
        "{}.{}",
        url_to_filename(url),
        options.screenshot_format.extension()
    ));
    let request = ScreenshotRequest {
        path: path.clone(),
        full_page: true,
        format: options.screenshot_format,
        quality: options.screenshot_quality,
    };

    match page.screenshot(&request).await {
        Ok(()) => Some(path.to_string_lossy().into_owned()),
        Err(e) => {
            log::warn!("Failed to capture screenshot: {}", e);
            None
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeBrowser, FakeDocument, FakePage};
    use crate::config::DetectionToggles;
    use crate::types::{ConsoleMessage, ConsoleMessageType};

    fn quiet_options() -> CheckOptions {
        CheckOptions {
            screenshot_enabled: false,
            detections: DetectionToggles::none(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_successful_check() {
        let page = FakePage {
            title: "Example Domain".to_string(),
            ..Default::default()
        };
        let browser = FakeBrowser::with_page(page.clone());

        let result = check_page_scrapeability(&browser, "https://example.com", &quiet_options()).await;

        assert!(result.success);
        assert_eq!(result.url, "https://example.com");
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.title, "Example Domain");
        assert!(result.error.is_none());
        assert!(result.detections.is_none());
        assert!(result.screenshot_path.is_none());
        assert_eq!(page.closed(), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_is_reported_and_page_closed() {
        let page = FakePage {
            navigation_error: Some("net::ERR_NAME_NOT_RESOLVED".to_string()),
            ..Default::default()
        };
        let browser = FakeBrowser::with_page(page.clone());

        let result = check_page_scrapeability(&browser, "https://nope.invalid", &CheckOptions::default()).await;

        assert!(!result.success);
        assert!(result.error.as_deref().is_some_and(|e| e.contains("net::ERR_NAME_NOT_RESOLVED")));
        assert_eq!(result.status_code, None);
        assert_eq!(result.title, "N/A");
        assert!(result.detections.is_none());
        assert_eq!(page.closed(), 1);
    }

    #[tokio::test]
    async fn test_missing_response_gives_null_status() {
        let page = FakePage {
            status: None,
            ..Default::default()
        };
        let browser = FakeBrowser::with_page(page);

        let result = check_page_scrapeability(&browser, "https://example.com", &quiet_options()).await;
        assert!(result.success);
        assert_eq!(result.status_code, None);
    }

    #[tokio::test]
    async fn test_console_messages_are_captured_in_order() {
        let page = FakePage {
            console_events: vec![
                ConsoleMessage::now(ConsoleMessageType::Error, "Uncaught TypeError: x is undefined"),
                ConsoleMessage::now(ConsoleMessageType::Warning, "deprecated API"),
            ],
            ..Default::default()
        };
        let browser = FakeBrowser::with_page(page);

        let result = check_page_scrapeability(&browser, "https://example.com", &quiet_options()).await;
        assert_eq!(
            result.console_errors,
            vec!["Uncaught TypeError: x is undefined", "deprecated API"]
        );

        let disabled = CheckOptions {
            check_console_errors: false,
            ..quiet_options()
        };
        let result = check_page_scrapeability(&browser, "https://example.com", &disabled).await;
        assert!(result.console_errors.is_empty());
    }

    #[tokio::test]
    async fn test_screenshot_is_written_under_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::default();
        let browser = FakeBrowser::with_page(page.clone());
        let options = CheckOptions {
            screenshot_enabled: true,
            screenshot_path: dir.path().join("shots"),
            ..quiet_options()
        };

        let result = check_page_scrapeability(&browser, "https://www.example.com/page", &options).await;

        let path = result.screenshot_path.expect("screenshot path");
        assert!(path.ends_with(&format!("{}.png", url_to_filename("https://www.example.com/page"))));
        assert!(std::path::Path::new(&path).exists());
        assert_eq!(page.screenshots.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_screenshot_failure_does_not_fail_check() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage {
            screenshot_fails: true,
            ..Default::default()
        };
        let browser = FakeBrowser::with_page(page);
        let options = CheckOptions {
            screenshot_enabled: true,
            screenshot_path: dir.path().to_path_buf(),
            ..quiet_options()
        };

        let result = check_page_scrapeability(&browser, "https://example.com", &options).await;
        assert!(result.success);
        assert!(result.screenshot_path.is_none());
    }

    #[tokio::test]
    async fn test_detections_run_when_enabled() {
        let page = FakePage {
            status: Some(403),
            headers: vec![("cf-ray".to_string(), "abc".to_string())],
            document: FakeDocument {
                body_text: "Access denied".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let browser = FakeBrowser::with_page(page);
        let options = CheckOptions {
            detections: DetectionToggles {
                robots_txt: false,
                ..DetectionToggles::all()
            },
            ..quiet_options()
        };

        let result = check_page_scrapeability(&browser, "https://example.com", &options).await;
        let detections = result.detections.expect("detections present");
        assert!(detections.anti_bot.is_some_and(|a| a.cloudflare));
        assert!(detections.authentication.is_some_and(|a| a.required));
        assert!(detections.rate_limit.is_some_and(|r| !r.detected));
        assert!(detections.robots_txt.is_none());
    }

    #[tokio::test]
    async fn test_close_failure_is_not_surfaced() {
        let page = FakePage {
            close_fails: true,
            ..Default::default()
        };
        let browser = FakeBrowser::with_page(page.clone());

        let result = check_page_scrapeability(&browser, "https://example.com", &quiet_options()).await;
        assert!(result.success);
        assert_eq!(page.closed(), 1);
    }

    #[tokio::test]
    async fn test_load_time_excludes_page_teardown() {
        let page = FakePage {
            close_delay: Some(std::time::Duration::from_millis(400)),
            ..Default::default()
        };
        let browser = FakeBrowser::with_page(page.clone());

        let result = check_page_scrapeability(&browser, "https://example.com", &quiet_options()).await;
        assert!(result.success);
        assert!(result.load_time_ms < 400, "load time was {}ms", result.load_time_ms);
        assert_eq!(page.closed(), 1);
    }

    #[tokio::test]
    async fn test_new_page_failure() {
        let browser = FakeBrowser {
            new_page_fails: true,
            ..Default::default()
        };

        let result = check_page_scrapeability(&browser, "https://example.com", &quiet_options()).await;
        assert!(!result.success);
        assert_eq!(result.title, "N/A");
        assert!(result.error.as_deref().is_some_and(|e| e.contains("browser has disconnected")));
        assert_eq!(browser.page.closed(), 0);
    }

    #[tokio::test]
    async fn test_http_engine_end_to_end() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "9")
                    .set_body_string("<html><head><title>Hi</title></head><body>Welcome</body></html>"),
            )
            .mount(&server)
            .await;

        let settings = BrowserSettings {
            engine: Engine::Http,
            ..Default::default()
        };
        let options = CheckOptions {
            detections: DetectionToggles {
                rate_limit: true,
                ..DetectionToggles::none()
            },
            ..Default::default()
        };

        let url = format!("{}/", server.uri());
        let result = check_with_engine(&settings, &url, &options).await.unwrap();
        assert!(result.success);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.title, "Hi");
        assert!(result.screenshot_path.is_none());
        let rate_limit = result.detections.and_then(|d| d.rate_limit).unwrap();
        assert_eq!(rate_limit.remaining.as_deref(), Some("9"));
    }
}
