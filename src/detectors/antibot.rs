//! Anti-bot vendor fingerprints from response headers and in-page probes.
//!
//! Each vendor check is independent: a failed header read or page
//! evaluation counts as "not detected" for that vendor only.

use std::collections::HashMap;

use crate::browser::{self, BrowserError, DomProbe, Page, PageResponse, PresenceProbe};
use crate::types::AntiBotDetection;

const RECAPTCHA: PresenceProbe = PresenceProbe {
    script_markers: &["recaptcha", "gstatic.com"],
    global: Some("grecaptcha"),
    selectors: &[".g-recaptcha", "[data-sitekey]"],
};

const HCAPTCHA: PresenceProbe = PresenceProbe {
    script_markers: &["hcaptcha.com"],
    global: Some("hcaptcha"),
    selectors: &[".h-captcha", "[data-hcaptcha-response]"],
};

/// Header verdict for vendors that fall back to script sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderCheck {
    Hit,
    Miss,
    Unreadable,
}

pub async fn detect_anti_bot_measures<P>(
    page: &P,
    response: Option<&dyn PageResponse>,
) -> AntiBotDetection
where
    P: Page + ?Sized,
{
    let mut details = Vec::new();

    let cloudflare = check_cloudflare(response, &mut details);
    let recaptcha = check_presence(page, &RECAPTCHA, "reCAPTCHA detected", &mut details).await;
    let hcaptcha = check_presence(page, &HCAPTCHA, "hCaptcha detected", &mut details).await;

    let datadome_headers = check_datadome_headers(response);
    let perimeter81_headers = check_perimeter81_headers(response);
    let scripts = if datadome_headers == HeaderCheck::Miss || perimeter81_headers == HeaderCheck::Miss {
        script_sources(page).await
    } else {
        None
    };

    let datadome = vendor_verdict(
        datadome_headers,
        scripts.as_deref(),
        "datadome.co",
        "DataDome",
        &mut details,
    );
    let perimeter81 = vendor_verdict(
        perimeter81_headers,
        scripts.as_deref(),
        "perimeter81",
        "Perimeter81",
        &mut details,
    );

    AntiBotDetection {
        cloudflare,
        recaptcha,
        hcaptcha,
        datadome,
        perimeter81,
        details,
    }
}

fn read_headers(response: Option<&dyn PageResponse>) -> Result<Option<HashMap<String, String>>, BrowserError> {
    response.map(|response| response.headers()).transpose()
}

fn check_cloudflare(response: Option<&dyn PageResponse>, details: &mut Vec<String>) -> bool {
    let headers = match read_headers(response) {
        Ok(Some(headers)) => headers,
        Ok(None) => return false,
        Err(e) => {
            log::warn!("Error checking Cloudflare: {}", e);
            return false;
        }
    };

    if headers.contains_key("cf-ray") {
        details.push("Cloudflare (cf-ray header detected)".to_string());
        return true;
    }
    if headers.contains_key("cf-cache-status") {
        details.push("Cloudflare (cf-cache-status header detected)".to_string());
        return true;
    }
    if server_mentions(&headers, "cloudflare") {
        details.push("Cloudflare (server header)".to_string());
        return true;
    }

    false
}

async fn check_presence<P>(
    page: &P,
    probe: &PresenceProbe,
    detail: &str,
    details: &mut Vec<String>,
) -> bool
where
    P: Page + ?Sized,
{
    match browser::probe::<P, bool>(page, &DomProbe::Presence(probe.clone())).await {
        Ok(true) => {
            details.push(detail.to_string());
            true
        }
        Ok(false) => false,
        Err(e) => {
            log::warn!("Page probe for \"{}\" failed: {}", detail, e);
            false
        }
    }
}

fn check_datadome_headers(response: Option<&dyn PageResponse>) -> HeaderCheck {
    match read_headers(response) {
        Ok(Some(headers))
            if headers.contains_key("x-datadome-cid")
                || headers.contains_key("x-dd-b")
                || server_mentions(&headers, "datadome") =>
        {
            HeaderCheck::Hit
        }
        Ok(_) => HeaderCheck::Miss,
        Err(e) => {
            log::warn!("Error checking DataDome: {}", e);
            HeaderCheck::Unreadable
        }
    }
}

fn check_perimeter81_headers(response: Option<&dyn PageResponse>) -> HeaderCheck {
    match read_headers(response) {
        Ok(Some(headers))
            if headers.contains_key("x-per-request-id") || headers.contains_key("x-per-session-id") =>
        {
            HeaderCheck::Hit
        }
        Ok(_) => HeaderCheck::Miss,
        Err(e) => {
            log::warn!("Error checking Perimeter81: {}", e);
            HeaderCheck::Unreadable
        }
    }
}

async fn script_sources<P>(page: &P) -> Option<Vec<String>>
where
    P: Page + ?Sized,
{
    match browser::probe::<P, Vec<String>>(page, &DomProbe::ScriptSources).await {
        Ok(sources) => Some(sources),
        Err(e) => {
            log::warn!("Reading script sources failed: {}", e);
            None
        }
    }
}

/// Headers win; a header miss falls back to a script `src` containing `marker`.
fn vendor_verdict(
    headers: HeaderCheck,
    scripts: Option<&[String]>,
    marker: &str,
    vendor: &str,
    details: &mut Vec<String>,
) -> bool {
    match headers {
        HeaderCheck::Hit => {
            details.push(format!("{} (headers detected)", vendor));
            true
        }
        HeaderCheck::Unreadable => false,
        HeaderCheck::Miss => {
            let found = scripts.is_some_and(|sources| sources.iter().any(|src| src.contains(marker)));
            if found {
                details.push(format!("{} (script detected)", vendor));
            }
            found
        }
    }
}

fn server_mentions(headers: &HashMap<String, String>, vendor: &str) -> bool {
    headers
        .get("server")
        .is_some_and(|server| server.to_lowercase().contains(vendor))
}
