use std::collections::HashMap;

use crate::browser::PageResponse;
use crate::types::RateLimitInfo;

/// Reads rate-limit headers. `X-` prefixed names win over the IETF draft
/// names; a missing response or unreadable headers report nothing detected.
pub fn detect_rate_limiting(response: Option<&dyn PageResponse>) -> RateLimitInfo {
    let Some(response) = response else {
        return RateLimitInfo::default();
    };

    let headers = match response.headers() {
        Ok(headers) => headers,
        Err(e) => {
            log::warn!("Error detecting rate limits: {}", e);
            return RateLimitInfo::default();
        }
    };

    let limit = first_present(&headers, &["x-ratelimit-limit", "ratelimit-limit"]);
    let remaining = first_present(&headers, &["x-ratelimit-remaining", "ratelimit-remaining"]);
    let reset = first_present(&headers, &["x-ratelimit-reset", "ratelimit-reset"]);
    let retry_after = first_present(&headers, &["retry-after"]);

    let detected = limit.is_some() || remaining.is_some() || reset.is_some() || retry_after.is_some();
    if !detected {
        return RateLimitInfo::default();
    }

    RateLimitInfo {
        detected,
        limit,
        remaining,
        reset,
        retry_after,
    }
}

fn first_present(headers: &HashMap<String, String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .find(|value| !value.is_empty())
        .cloned()
}
