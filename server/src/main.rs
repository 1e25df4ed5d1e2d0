//! PlantVillage Inference Server
//!
//! HTTP API serving the trained plant disease classifier. Uploads go to
//! `POST /predict` and come back with the predicted class, its confidence
//! and a remedy; `GET /health` reports liveness.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use plantvillage_tl::backend::{backend_name, default_device, DefaultBackend};
use plantvillage_tl::inference::remedy::{
    API_KEY_ENV, DEFAULT_REMEDY_ENDPOINT, DEFAULT_REMEDY_MODEL,
};
use plantvillage_tl::inference::{DiagnosisService, GeminiRemedyClient, RemedyConfig};

use crate::state::{AppState, SharedState};

/// PlantVillage Inference Server
#[derive(Parser, Debug)]
#[command(name = "plantvillage-server")]
#[command(version)]
#[command(about = "HTTP API serving the plant disease classifier")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "PLANTVILLAGE_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "PLANTVILLAGE_HOST")]
    host: String,

    /// Directory holding best_model.mpk, class_names.txt and model_meta.json
    #[arg(long, default_value = "model", env = "PLANTVILLAGE_MODEL_DIR")]
    model_dir: PathBuf,

    /// Generative model used for remedy text
    #[arg(long, default_value = DEFAULT_REMEDY_MODEL, env = "PLANTVILLAGE_REMEDY_MODEL")]
    remedy_model: String,

    /// Base URL of the remedy text API
    #[arg(long, default_value = DEFAULT_REMEDY_ENDPOINT, env = "PLANTVILLAGE_REMEDY_ENDPOINT")]
    remedy_endpoint: String,

    /// Timeout of a single remedy request
    #[arg(long, default_value = "30", env = "PLANTVILLAGE_REMEDY_TIMEOUT")]
    remedy_timeout_secs: u64,

    /// API key for the remedy service; lookups fall back when unset
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum upload size in megabytes
    #[arg(long, default_value = "16", env = "PLANTVILLAGE_MAX_UPLOAD_MB")]
    max_upload_mb: usize,
}

/// Build the router around an already loaded state
fn app(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/predict", post(routes::predict::predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let remedy_config = RemedyConfig {
        endpoint: cli.remedy_endpoint.clone(),
        model: cli.remedy_model.clone(),
        api_key: cli.api_key.clone().filter(|k| !k.is_empty()),
        timeout_secs: cli.remedy_timeout_secs,
    };

    info!("PlantVillage Inference Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Model dir:    {:?}", cli.model_dir);
    info!("  Backend:      {}", backend_name());
    info!("  Remedy model: {}", remedy_config.model);
    info!("  Max upload:   {} MB", cli.max_upload_mb);

    // The blocking HTTP client and the model load both stay off the async workers
    let model_dir = cli.model_dir.clone();
    let service = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let client = GeminiRemedyClient::new(remedy_config)?;
        let service =
            DiagnosisService::<DefaultBackend>::load(&model_dir, &default_device(), Arc::new(client))
                .with_context(|| format!("Failed to load model from {}", model_dir.display()))?;
        Ok(service)
    })
    .await
    .context("Model loading task panicked")??;

    info!("Serving {} classes", service.num_classes());

    let state = Arc::new(AppState::new(service));
    let app = app(state, cli.max_upload_mb * 1024 * 1024);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use image::{DynamicImage, Rgb, RgbImage};
    use plantvillage_tl::dataset::ClassCatalog;
    use plantvillage_tl::inference::{
        PredictionResult, Predictor, RemedySource, FALLBACK_MESSAGE, HEALTHY_MESSAGE,
    };
    use plantvillage_tl::model::PlantClassifierConfig;
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "plantvillage-test-boundary";

    struct Unreachable;

    impl RemedySource for Unreachable {
        fn lookup(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn test_app(names: &[&str]) -> Router {
        let device = default_device();
        let model = PlantClassifierConfig::new(names.len()).init::<DefaultBackend>(&device);
        let catalog = ClassCatalog::new(names.iter().map(|s| s.to_string()).collect()).unwrap();
        let predictor = Predictor::new(model, catalog, 32, device).unwrap();
        let service = DiagnosisService::new(predictor, Arc::new(Unreachable));
        app(Arc::new(AppState::new(service)), 1024 * 1024)
    }

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(80, 60, Rgb([60, 150, 40])))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// One-part multipart body; `filename: None` omits the attribute
    fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
        let disposition = match filename {
            Some(name) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, name),
            None => format!("form-data; name=\"{}\"", field),
        };
        let mut body = format!(
            "--{}\r\nContent-Disposition: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, disposition
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_predict_with_remedy_outage() {
        let app = test_app(&["Tomato___Late_blight"]);

        let response = app
            .oneshot(upload(multipart_body("file", Some("leaf.png"), &png())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let result: PredictionResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result.prediction, "Tomato___Late_blight");
        assert_eq!(result.confidence, 100.0);
        assert_eq!(result.remedy, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_predict_healthy() {
        let app = test_app(&["Apple___healthy"]);

        let response = app
            .oneshot(upload(multipart_body("file", Some("leaf.png"), &png())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["remedy"], HEALTHY_MESSAGE);
    }

    #[tokio::test]
    async fn test_missing_file_part() {
        let app = test_app(&["a", "b"]);

        let response = app
            .oneshot(upload(multipart_body("image", Some("leaf.png"), &png())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], routes::predict::NO_FILE_PART);
    }

    #[tokio::test]
    async fn test_non_multipart_request() {
        let app = test_app(&["a", "b"]);

        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .body(Body::from(png()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], routes::predict::NO_FILE_PART);
    }

    #[tokio::test]
    async fn test_empty_filename() {
        let app = test_app(&["a", "b"]);

        let response = app
            .oneshot(upload(multipart_body("file", Some(""), b"")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], routes::predict::NO_FILE_SELECTED);
    }

    #[tokio::test]
    async fn test_file_field_without_filename() {
        let app = test_app(&["a", "b"]);

        let response = app
            .oneshot(upload(multipart_body("file", None, &png())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], routes::predict::NO_FILE_PART);
    }

    #[tokio::test]
    async fn test_undecodable_upload() {
        let app = test_app(&["a", "b"]);

        let response = app
            .oneshot(upload(multipart_body("file", Some("notes.txt"), b"not an image")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Invalid image"));
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(&["a", "b", "c"]);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["num_classes"], 3);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
