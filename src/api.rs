use actix_web::{web, HttpResponse, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::checker::check_with_engine;
use crate::config::{AppConfig, CheckOverrides};
use crate::types::CheckResult;
use crate::utils::extract_url_from_text;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Relative screenshot directories resolve against this.
    pub base_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckRequest {
    pub url: String,
    #[serde(default)]
    pub options: CheckOverrides,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub id: Uuid,
    pub success: bool,
    pub message: String,
    pub result: Option<CheckResult>,
}

impl CheckResponse {
    fn rejected(message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            success: false,
            message,
            result: None,
        }
    }
}

pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "scrape-check",
        "chromium": cfg!(feature = "chromium"),
    })))
}

pub async fn check_handler(
    state: web::Data<AppState>,
    req: web::Json<CheckRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    log::info!("Received check request for {}", req.url);

    let Some(url) = extract_url_from_text(&req.url) else {
        return Ok(HttpResponse::BadRequest()
            .json(CheckResponse::rejected(format!("No valid URL found in \"{}\"", req.url))));
    };

    let mut config = state.config.clone();
    req.options.apply(&mut config);
    let errors = config.validate();
    if !errors.is_empty() {
        return Ok(HttpResponse::BadRequest()
            .json(CheckResponse::rejected(format!("Invalid options: {}", errors.join("; ")))));
    }

    let options = config.to_check_options(&state.base_dir);
    match check_with_engine(&config.browser, &url, &options).await {
        Ok(result) => {
            let message = if result.success {
                format!("Checked {} in {}ms", result.url, result.load_time_ms)
            } else {
                format!("Check failed: {}", result.error.as_deref().unwrap_or("unknown error"))
            };
            Ok(HttpResponse::Ok().json(CheckResponse {
                id: Uuid::new_v4(),
                success: result.success,
                message,
                result: Some(result),
            }))
        }
        Err(e) => {
            log::error!("Check could not start: {:#}", e);
            Ok(HttpResponse::InternalServerError().json(CheckResponse::rejected(format!("{:#}", e))))
        }
    }
}

/// Mounts the HTTP API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(health_check))
        .route("/api/check", web::post().to(check_handler));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use crate::config::Engine;

    fn state() -> web::Data<AppState> {
        web::Data::new(AppState {
            config: AppConfig::default(),
            base_dir: std::env::temp_dir(),
        })
    }

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "scrape-check");
    }

    #[actix_web::test]
    async fn test_rejects_text_without_url() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/check")
            .set_json(serde_json::json!({ "url": "no link here" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        let body: CheckResponse = test::read_body_json(resp).await;
        assert!(!body.success);
        assert!(body.result.is_none());
    }

    #[actix_web::test]
    async fn test_rejects_invalid_overrides() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/check")
            .set_json(serde_json::json!({ "url": "example.com", "options": { "timeoutMs": 100 } }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        let body: CheckResponse = test::read_body_json(resp).await;
        assert!(body.message.contains("Browser timeout must be at least"));
    }

    #[actix_web::test]
    async fn test_check_with_http_engine() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><head><title>Shop</title></head></html>"),
            )
            .mount(&server)
            .await;

        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let overrides = CheckOverrides {
            engine: Some(Engine::Http),
            no_detections: true,
            ..Default::default()
        };
        let req = test::TestRequest::post()
            .uri("/api/check")
            .set_json(CheckRequest {
                url: format!("{}/", server.uri()),
                options: overrides,
            })
            .to_request();
        let body: CheckResponse = test::call_and_read_body_json(&app, req).await;

        assert!(body.success);
        let result = body.result.expect("check result");
        assert_eq!(result.title, "Shop");
        assert_eq!(result.status_code, Some(200));
        assert!(result.detections.is_none());
    }
}
