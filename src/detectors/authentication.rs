//! Login-wall detection.
//!
//! Strong signals (401/403, a password field) decide on their own. Weak
//! signals (auth keywords in the body text, an auth-looking URL path) only
//! count once the total indicator count reaches the configured minimum.

use url::Url;

use crate::browser::{self, DomProbe, LoginFormSnapshot, Page};
use crate::config::AuthenticationPolicy;
use crate::types::{AuthType, AuthenticationInfo};

pub const AUTH_KEYWORDS: &[&str] = &[
    "sign in",
    "log in",
    "login required",
    "please log in",
    "authentication required",
    "access denied",
    "unauthorized access",
    "members only",
    "please sign in",
];

pub const AUTH_PATHS: &[&str] = &["/login", "/signin", "/auth", "/authenticate"];

#[derive(Debug, Default)]
struct LoginFormSignal {
    detected: bool,
    auth_type: Option<AuthType>,
    login_url: Option<String>,
}

pub async fn detect_authentication_wall<P>(
    page: &P,
    status_code: Option<u16>,
    policy: &AuthenticationPolicy,
) -> AuthenticationInfo
where
    P: Page + ?Sized,
{
    let mut indicators = Vec::new();

    let auth_status = check_auth_status_code(status_code, &mut indicators);
    let login_form = detect_login_form(page, &mut indicators).await;
    let has_keywords = detect_auth_keywords(page, &mut indicators).await;
    let url_indicator = check_url_for_auth(page, &mut indicators).await;

    let required = auth_status
        || login_form.detected
        || (indicators.len() >= policy.min_weak_indicators && (has_keywords || url_indicator));

    if !required {
        return AuthenticationInfo::default();
    }

    AuthenticationInfo {
        required,
        auth_type: login_form.auth_type,
        login_url: login_form.login_url,
        indicators,
    }
}

fn check_auth_status_code(status_code: Option<u16>, indicators: &mut Vec<String>) -> bool {
    match status_code {
        Some(401) => {
            indicators.push("HTTP 401 Unauthorized".to_string());
            true
        }
        Some(403) => {
            indicators.push("HTTP 403 Forbidden".to_string());
            true
        }
        _ => false,
    }
}

async fn detect_login_form<P>(page: &P, indicators: &mut Vec<String>) -> LoginFormSignal
where
    P: Page + ?Sized,
{
    let form: LoginFormSnapshot = match browser::probe(page, &DomProbe::LoginForm).await {
        Ok(form) => form,
        Err(e) => {
            log::warn!("Error detecting login form: {}", e);
            return LoginFormSignal::default();
        }
    };

    if !form.has_password_input {
        return LoginFormSignal::default();
    }

    if form.has_form {
        indicators.push("Login form detected (username + password fields)".to_string());
        return LoginFormSignal {
            detected: true,
            auth_type: Some(AuthType::Form),
            login_url: form.action.filter(|action| !action.is_empty()),
        };
    }

    indicators.push("Password input detected".to_string());
    LoginFormSignal {
        detected: true,
        auth_type: Some(AuthType::Form),
        login_url: None,
    }
}

async fn detect_auth_keywords<P>(page: &P, indicators: &mut Vec<String>) -> bool
where
    P: Page + ?Sized,
{
    let text: String = match browser::probe(page, &DomProbe::BodyText).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Error detecting auth keywords: {}", e);
            return false;
        }
    };

    let text = text.to_lowercase();
    match AUTH_KEYWORDS.iter().find(|keyword| text.contains(*keyword)) {
        Some(keyword) => {
            indicators.push(format!("Authentication keyword: \"{}\"", keyword));
            true
        }
        None => false,
    }
}

async fn check_url_for_auth<P>(page: &P, indicators: &mut Vec<String>) -> bool
where
    P: Page + ?Sized,
{
    let current = match page.url().await {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Error checking URL for auth: {}", e);
            return false;
        }
    };

    let path = Url::parse(&current)
        .map(|parsed| parsed.path().to_lowercase())
        .unwrap_or_else(|_| current.to_lowercase());

    match AUTH_PATHS.iter().find(|fragment| path.contains(*fragment)) {
        Some(fragment) => {
            indicators.push(format!("URL contains auth path: {}", fragment));
            true
        }
        None => false,
    }
}
