//! ocr-gateway - image-to-text server dispatching to local and cloud
//! recognition backends.

mod config;
mod dispatcher;
mod error;
mod ocr;
mod preprocessor;
mod validator;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Settings;
use dispatcher::Dispatcher;
use error::DispatchError;
use ocr::tesseract::TesseractBackend;
use ocr::textract::TextractBackend;
use ocr::{BackendKind, Recognition};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    dispatcher: Arc<Dispatcher>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_gateway=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    info!(
        bind = %settings.bind_addr,
        max_upload_bytes = settings.max_upload_bytes,
        local_concurrency = settings.local_concurrency,
        cloud_concurrency = settings.cloud_concurrency,
        "configuration loaded"
    );

    // Build the two recognition backends
    let local = TesseractBackend::new(&settings.tesseract_cmd, &settings.tesseract_lang);
    local.probe();
    let cloud = TextractBackend::from_settings(&settings).await;

    let dispatcher = Dispatcher::new(&settings, Arc::new(local), Arc::new(cloud));

    let state = AppState {
        settings: Arc::new(settings),
        dispatcher: Arc::new(dispatcher),
    };

    let body_limit = state.settings.body_limit();
    let bind_addr = state.settings.bind_addr;

    // Build router
    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness banner.
async fn index() -> &'static str {
    "Image to Text Converter backend is running"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    local_engine: bool,
    cloud_service: bool,
}

/// Health check with per-backend availability.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        local_engine: state.dispatcher.is_available(BackendKind::Local),
        cloud_service: state.dispatcher.is_available(BackendKind::Cloud),
    })
}

/// Public success shape. Backend metadata stays in the logs.
#[derive(Serialize)]
struct ExtractResponse {
    text: String,
}

impl From<Recognition> for ExtractResponse {
    fn from(recognition: Recognition) -> Self {
        Self {
            text: recognition.text,
        }
    }
}

/// The two multipart fields of an upload, with the selector already parsed.
struct Upload {
    bytes: Vec<u8>,
    mime_type: Option<String>,
    backend: BackendKind,
}

/// Upload an image and run it through the selected recognition backend.
async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractResponse>, DispatchError> {
    let upload = read_upload(&mut multipart).await?;

    let request_id = uuid::Uuid::new_v4();
    let digest = {
        let mut hasher = Sha256::new();
        hasher.update(&upload.bytes);
        format!("{:x}", hasher.finalize())
    };
    info!(
        %request_id,
        backend = %upload.backend,
        bytes = upload.bytes.len(),
        digest = %digest,
        "received upload"
    );

    let decoded = validator::decode_upload(
        &upload.bytes,
        upload.mime_type.as_deref(),
        state.settings.max_upload_bytes,
    )?;
    let prepared = preprocessor::prepare(decoded, &state.settings.preprocess);

    let recognition = state.dispatcher.dispatch(&prepared, upload.backend).await?;

    info!(
        %request_id,
        backend = %recognition.backend,
        elapsed_ms = recognition.elapsed_ms,
        confidence = ?recognition.confidence,
        chars = recognition.text.len(),
        "recognition complete"
    );

    Ok(Json(ExtractResponse::from(recognition)))
}

/// Read the upload's fields. `backend` takes `"local"` or `"cloud"`; the
/// legacy field name `ocr_model` and the engine names are accepted as
/// aliases. A missing or unknown selector is rejected, never defaulted.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, DispatchError> {
    let mut image: Option<(Vec<u8>, Option<String>)> = None;
    let mut selector: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        DispatchError::InvalidInput(format!("malformed multipart upload: {}", e))
    })? {
        match field.name() {
            Some("image") => {
                let mime = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| {
                    DispatchError::InvalidInput(format!("failed to read image field: {}", e))
                })?;
                image = Some((data.to_vec(), mime));
            }
            Some("backend") | Some("ocr_model") => {
                let raw = field.text().await.map_err(|e| {
                    DispatchError::InvalidInput(format!("failed to read backend field: {}", e))
                })?;
                selector = Some(raw);
            }
            _ => {}
        }
    }

    let (bytes, mime_type) =
        image.ok_or_else(|| DispatchError::InvalidInput("missing 'image' field".into()))?;
    let raw = selector.ok_or_else(|| {
        DispatchError::InvalidInput("missing 'backend' field, expected \"local\" or \"cloud\"".into())
    })?;
    let backend = BackendKind::parse(&raw).ok_or_else(|| {
        DispatchError::InvalidInput(format!(
            "unknown backend \"{}\", expected \"local\" or \"cloud\"",
            raw
        ))
    })?;

    Ok(Upload {
        bytes,
        mime_type,
        backend,
    })
}
