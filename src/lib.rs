// Scrape Check Library
//
// Loads a single page through a real (or snapshot) browser and reports how
// scrapeable it is: reachability, timing, console errors, anti-bot shields,
// rate limits, robots.txt rules and login walls.

pub mod api;
pub mod browser;
pub mod checker;
pub mod config;
pub mod detectors;
pub mod report;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use browser::{Browser, BrowserError, Page, PageResponse};
pub use checker::{check_page_scrapeability, check_with_engine};
pub use config::{AppConfig, CheckOptions, CheckOverrides, DetectionToggles, Engine};
pub use detectors::run_detections;
pub use report::format_report;
pub use types::{
    AntiBotDetection, AuthType, AuthenticationInfo, CheckResult, DetectionResults, RateLimitInfo,
    RobotsTxtInfo,
};
