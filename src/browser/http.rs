//! Browserless engine: one HTTP GET, then probes answered from the static
//! HTML with `scraper`. No JavaScript runs, so window globals are never
//! observed, nothing reaches the console and screenshots are unsupported.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use super::{
    Browser, BrowserError, ConsoleCapture, DomProbe, LoginFormSnapshot, Page, ResponseSnapshot,
    ScreenshotRequest,
};
use crate::config::Viewport;
use crate::utils::get_random_user_agent;

const SKIPPED_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template"];

pub struct HttpBrowser {
    client: reqwest::Client,
}

impl HttpBrowser {
    pub fn new() -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    type Page = HttpPage;

    async fn new_page(
        &self,
        _viewport: Viewport,
        user_agent: Option<&str>,
    ) -> Result<HttpPage, BrowserError> {
        let user_agent = user_agent
            .map(str::to_string)
            .unwrap_or_else(|| get_random_user_agent().to_string());

        Ok(HttpPage {
            client: self.client.clone(),
            user_agent,
            document: Mutex::new(None),
        })
    }
}

#[derive(Debug, Clone)]
struct LoadedDocument {
    url: Url,
    html: String,
}

pub struct HttpPage {
    client: reqwest::Client,
    user_agent: String,
    document: Mutex<Option<LoadedDocument>>,
}

impl HttpPage {
    fn loaded(&self) -> Option<LoadedDocument> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn fetch(&self, url: &str) -> Result<ResponseSnapshot, BrowserError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else { continue };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        let html = response.text().await?;
        *self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(LoadedDocument {
            url: final_url,
            html,
        });

        Ok(ResponseSnapshot { status, headers })
    }
}

#[async_trait]
impl Page for HttpPage {
    async fn capture_console(&self, _capture: ConsoleCapture) -> Result<(), BrowserError> {
        log::debug!("HTTP engine runs no scripts; console capture yields nothing");
        Ok(())
    }

    async fn goto(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<ResponseSnapshot>, BrowserError> {
        match tokio::time::timeout(timeout, self.fetch(url)).await {
            Ok(result) => result.map(Some),
            Err(_) => Err(BrowserError::Timeout(timeout)),
        }
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self
            .loaded()
            .map(|doc| document_title(&doc.html))
            .unwrap_or_default())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self
            .loaded()
            .map(|doc| doc.url.to_string())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn evaluate(&self, probe: &DomProbe) -> Result<serde_json::Value, BrowserError> {
        let doc = self
            .loaded()
            .ok_or_else(|| BrowserError::Evaluation("no document loaded".to_string()))?;
        evaluate_static(probe, &doc.html, &doc.url)
    }

    async fn screenshot(&self, _request: &ScreenshotRequest) -> Result<(), BrowserError> {
        Err(BrowserError::Unsupported("screenshot capture"))
    }

    async fn close(self) -> Result<(), BrowserError> {
        Ok(())
    }
}

fn document_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Answers `probe` against a static HTML document located at `base`.
pub fn evaluate_static(
    probe: &DomProbe,
    html: &str,
    base: &Url,
) -> Result<serde_json::Value, BrowserError> {
    let document = Html::parse_document(html);

    let value = match probe {
        DomProbe::ScriptSources => serde_json::json!(script_sources(&document, base)),
        DomProbe::Presence(presence) => {
            let has_script = script_sources(&document, base)
                .iter()
                .any(|src| presence.script_markers.iter().any(|m| src.contains(m)));
            let has_element = presence.selectors.iter().any(|sel| {
                Selector::parse(sel)
                    .map(|selector| document.select(&selector).next().is_some())
                    .unwrap_or(false)
            });
            serde_json::json!(has_script || has_element)
        }
        DomProbe::LoginForm => serde_json::to_value(login_form(&document, base))
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?,
        DomProbe::BodyText => serde_json::json!(body_text(&document)),
    };

    Ok(value)
}

fn parse_selector(css: &str) -> Result<Selector, BrowserError> {
    Selector::parse(css).map_err(|e| BrowserError::Evaluation(format!("bad selector {css}: {e}")))
}

fn script_sources(document: &Html, base: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("script[src]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|script| script.value().attr("src"))
        .filter(|src| !src.trim().is_empty())
        .map(|src| {
            base.join(src.trim())
                .map(|resolved| resolved.to_string())
                .unwrap_or_else(|_| src.to_string())
        })
        .collect()
}

fn login_form(document: &Html, base: &Url) -> LoginFormSnapshot {
    let Ok(password) = parse_selector(r#"input[type="password"]"#) else {
        return LoginFormSnapshot::default();
    };
    let Some(password_input) = document.select(&password).next() else {
        return LoginFormSnapshot::default();
    };

    let form = password_input
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "form");

    let Some(form) = form else {
        return LoginFormSnapshot {
            has_password_input: true,
            ..Default::default()
        };
    };

    let username_selectors = [
        r#"input[type="text"]"#,
        r#"input[type="email"]"#,
        r#"input[name*="user"]"#,
        r#"input[name*="email"]"#,
    ];
    let has_username_input = username_selectors.iter().any(|css| {
        parse_selector(css)
            .map(|selector| form.select(&selector).next().is_some())
            .unwrap_or(false)
    });

    // Mirrors the DOM `form.action` property: resolved, defaulting to the page URL.
    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => base
            .join(action)
            .map(|resolved| resolved.to_string())
            .unwrap_or_else(|_| action.to_string()),
        _ => base.to_string(),
    };

    LoginFormSnapshot {
        has_password_input: true,
        has_form: true,
        has_username_input,
        action: Some(action),
    }
}

fn body_text(document: &Html) -> String {
    let Ok(selector) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&selector).next() else {
        return String::new();
    };

    body.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent()?;
            let skipped = parent
                .value()
                .as_element()
                .is_some_and(|element| SKIPPED_TEXT_PARENTS.contains(&element.name()));
            if skipped { None } else { Some(text.trim().to_string()) }
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
