//! Scrapeability detectors and the aggregator that runs them.

pub mod antibot;
pub mod authentication;
pub mod ratelimit;
pub mod robotstxt;

pub use antibot::detect_anti_bot_measures;
pub use authentication::detect_authentication_wall;
pub use ratelimit::detect_rate_limiting;
pub use robotstxt::{RobotsTxtChecker, fetch_robots_txt, parse_robots_txt};

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::browser::{Page, PageResponse};
use crate::config::CheckOptions;
use crate::types::DetectionResults;

/// Runs every enabled detector concurrently against the same page and
/// response. A detector that panics is logged and its key left out.
pub async fn run_detections<P>(
    page: &P,
    response: Option<&dyn PageResponse>,
    url: &str,
    options: &CheckOptions,
) -> DetectionResults
where
    P: Page + ?Sized,
{
    let toggles = options.detections;
    let status = response.map(|response| response.status());

    let anti_bot = async {
        if !toggles.anti_bot {
            return None;
        }
        isolate("antiBot", detect_anti_bot_measures(page, response)).await
    };
    let rate_limit = async {
        if !toggles.rate_limit {
            return None;
        }
        isolate("rateLimit", async { detect_rate_limiting(response) }).await
    };
    let robots_txt = async {
        if !toggles.robots_txt {
            return None;
        }
        isolate("robotsTxt", fetch_robots_txt(url)).await
    };
    let authentication = async {
        if !toggles.authentication {
            return None;
        }
        isolate(
            "authentication",
            detect_authentication_wall(page, status, &options.authentication),
        )
        .await
    };

    let (anti_bot, rate_limit, robots_txt, authentication) =
        futures::join!(anti_bot, rate_limit, robots_txt, authentication);

    DetectionResults {
        anti_bot,
        rate_limit,
        robots_txt,
        authentication,
    }
}

async fn isolate<F, T>(name: &str, detector: F) -> Option<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(detector).catch_unwind().await {
        Ok(value) => Some(value),
        Err(payload) => {
            log::error!("{} detection failed: {}", name, panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
