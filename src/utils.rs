use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Realistic desktop user agents for the HTTP engine when none is configured.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Identifies our own side-channel requests (robots.txt).
pub const CLIENT_USER_AGENT: &str = concat!("scrape-check/", env!("CARGO_PKG_VERSION"));

pub fn get_random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    let index = rng.random_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

static URL_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https?://(www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_+.~#?&/=]*)",
    )
    .expect("URL pattern is valid")
});

/// True for absolute `http`/`https` URLs with a host.
pub fn is_valid_url(url: &str) -> bool {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return false;
    }
    match Url::parse(trimmed) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed
                    .host_str()
                    .is_some_and(|host| host.contains('.') || host == "localhost")
        }
        Err(_) => false,
    }
}

/// Adds `https://` when no scheme is present.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// First URL found in free text, or the whole text when it is a bare host.
pub fn extract_url_from_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(found) = URL_IN_TEXT.find(trimmed) {
        return Some(found.as_str().to_string());
    }

    let normalized = normalize_url(trimmed);
    is_valid_url(&normalized).then_some(normalized)
}

/// Filesystem-safe stem: hostname with dots as hyphens plus today's UTC date.
pub fn url_to_filename(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some() => {
            let host = parsed.host_str().unwrap_or_default().replace('.', "-");
            let date = chrono::Utc::now().format("%Y-%m-%d");
            format!("{}-{}", host, date)
        }
        _ => url
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .take(100)
            .collect(),
    }
}

pub fn is_timeout_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("timeout") || message.contains("timed out")
}

pub fn is_network_error(message: &str) -> bool {
    let message = message.to_lowercase();
    ["net::", "network", "connection", "enotfound", "econnrefused", "dns error"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// One-line error for people, tagged by category.
pub fn format_error_for_user(message: &str) -> String {
    if is_timeout_error(message) {
        format!("Timeout: {}", message)
    } else if is_network_error(message) {
        format!("Network error: {}", message)
    } else {
        format!("Error: {}", message)
    }
}
