//! Human-readable rendering of a [`CheckResult`] for the terminal.

use crate::types::{
    AntiBotDetection, AuthenticationInfo, CheckResult, DetectionResults, RateLimitInfo,
    RobotsTxtInfo,
};

const RULE_WIDTH: usize = 80;
const MAX_DISALLOWED_SHOWN: usize = 5;

pub fn format_report(result: &CheckResult) -> String {
    let mut lines = Vec::new();
    let rule = "=".repeat(RULE_WIDTH);

    lines.push(String::new());
    lines.push(rule.clone());

    if result.success {
        lines.push(format!("✅ SUCCESS: {}", result.url));
        lines.push(format!(
            "   Status Code: {}",
            result
                .status_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "N/A".to_string())
        ));
        lines.push(format!("   Title: {}", result.title));
        lines.push(format!("   Load Time: {}ms", result.load_time_ms));

        if let Some(path) = &result.screenshot_path {
            lines.push(format!("   Screenshot: {}", path));
        }

        if result.console_errors.is_empty() {
            lines.push("   Console Errors: None".to_string());
        } else {
            lines.push(format!("   Console Errors: {}", result.console_errors.len()));
            for error in &result.console_errors {
                lines.push(format!("      - {}", error));
            }
        }

        if let Some(detections) = &result.detections {
            render_detections(detections, &mut lines);
        }
    } else {
        lines.push(format!("❌ FAILED: {}", result.url));
        if let Some(error) = &result.error {
            lines.push(format!("   Error: {}", error));
        }
        lines.push(format!("   Load Time: {}ms", result.load_time_ms));
    }

    lines.push(rule);
    lines.push(String::new());
    lines.join("\n")
}

fn render_detections(detections: &DetectionResults, lines: &mut Vec<String>) {
    lines.push(String::new());
    lines.push("🔍 DETECTIONS:".to_string());

    if let Some(rate_limit) = &detections.rate_limit {
        render_rate_limit(rate_limit, lines);
    }
    if let Some(anti_bot) = &detections.anti_bot {
        render_anti_bot(anti_bot, lines);
    }
    if let Some(robots) = &detections.robots_txt {
        render_robots_txt(robots, lines);
    }
    if let Some(auth) = &detections.authentication {
        render_authentication(auth, lines);
    }
}

fn render_rate_limit(info: &RateLimitInfo, lines: &mut Vec<String>) {
    if !info.detected {
        lines.push("   📊 Rate Limiting: Not detected".to_string());
        return;
    }

    lines.push("   📊 Rate Limiting: Detected".to_string());
    let fields = [
        ("Limit", &info.limit),
        ("Remaining", &info.remaining),
        ("Reset", &info.reset),
        ("Retry After", &info.retry_after),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            lines.push(format!("      - {}: {}", label, value));
        }
    }
}

fn render_anti_bot(info: &AntiBotDetection, lines: &mut Vec<String>) {
    if !info.any_detected() {
        lines.push("   🤖 Anti-Bot Measures: None detected".to_string());
        return;
    }

    lines.push("   🤖 Anti-Bot Measures: Detected".to_string());
    let vendors = [
        ("Cloudflare", info.cloudflare),
        ("reCAPTCHA", info.recaptcha),
        ("hCaptcha", info.hcaptcha),
        ("DataDome", info.datadome),
        ("Perimeter81", info.perimeter81),
    ];
    for (vendor, _) in vendors.iter().filter(|(_, hit)| *hit) {
        lines.push(format!("      - {}: Yes", vendor));
    }

    if !info.details.is_empty() {
        lines.push("      Details:".to_string());
        for detail in &info.details {
            lines.push(format!("        • {}", detail));
        }
    }
}

fn render_robots_txt(info: &RobotsTxtInfo, lines: &mut Vec<String>) {
    if !info.exists {
        lines.push("   🤖 robots.txt: Not found".to_string());
        return;
    }

    lines.push("   🤖 robots.txt: Found".to_string());
    lines.push(format!(
        "      - Allows Crawling: {}",
        if info.allows_crawling { "Yes" } else { "No" }
    ));
    if let Some(delay) = info.crawl_delay.filter(|delay| *delay > 0) {
        lines.push(format!("      - Crawl Delay: {}s", delay));
    }
    if !info.disallowed_paths.is_empty() {
        lines.push("      - Disallowed Paths:".to_string());
        for path in info.disallowed_paths.iter().take(MAX_DISALLOWED_SHOWN) {
            lines.push(format!("        • {}", path));
        }
        if info.disallowed_paths.len() > MAX_DISALLOWED_SHOWN {
            lines.push(format!(
                "        • ... and {} more",
                info.disallowed_paths.len() - MAX_DISALLOWED_SHOWN
            ));
        }
    }
    if let Some(sitemap) = &info.sitemap {
        lines.push(format!("      - Sitemap: {}", sitemap));
    }
}

fn render_authentication(info: &AuthenticationInfo, lines: &mut Vec<String>) {
    if !info.required {
        lines.push("   🔐 Authentication: Not required".to_string());
        return;
    }

    lines.push("   🔐 Authentication: Required".to_string());
    if let Some(auth_type) = &info.auth_type {
        lines.push(format!("      - Type: {}", auth_type));
    }
    if let Some(login_url) = &info.login_url {
        lines.push(format!("      - Login URL: {}", login_url));
    }
    if !info.indicators.is_empty() {
        lines.push("      - Indicators:".to_string());
        for indicator in &info.indicators {
            lines.push(format!("        • {}", indicator));
        }
    }
}
