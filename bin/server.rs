// Registration Reconciler - Web Server
// Upload → preview → merge → summary → xlsx download, for a single operator

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use registration_reconciler::export::XLSX_MIME;
use registration_reconciler::{
    Config, FileOutcome, ReconcileError, RegistrationRecord, Session, SessionStatus, SummaryRow,
    UnmatchedUnit, CONFIG_FILE,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const PREVIEW_ROWS: usize = 5;
const UPLOAD_LIMIT_BYTES: usize = 20 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<Session>>,
}

impl AppState {
    /// A panic in one handler must not lock the operator out
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some(message.into()),
    };
    (status, Json(body)).into_response()
}

fn status_for(err: &ReconcileError) -> StatusCode {
    match err {
        ReconcileError::NothingStaged => StatusCode::BAD_REQUEST,
        e if e.is_file_local() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct UploadResponse {
    files: Vec<FileOutcome>,
    pending: usize,
    preview: Vec<RegistrationRecord>,
}

#[derive(Serialize)]
struct MergeResponse {
    before: usize,
    after: usize,
    added: usize,
    duplicates: usize,
    summary: String,
}

#[derive(Serialize)]
struct SummaryResponse {
    rows: Vec<SummaryRow>,
    total_registrants: usize,
    matched_registrants: usize,
    unmatched_registrants: usize,
}

#[derive(Serialize)]
struct UnmatchedResponse {
    enabled: bool,
    units: Vec<UnmatchedUnit>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/status - Roster and reference table state
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status: SessionStatus = state.session().status();
    Json(ApiResponse::ok(status))
}

/// POST /api/upload - Stage one or more registration CSVs
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "malformed upload");
                return error_response(StatusCode::BAD_REQUEST, format!("malformed upload: {}", e));
            }
        };

        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        match field.bytes().await {
            Ok(bytes) => files.push((file_name, bytes.to_vec())),
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "upload interrupted");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("{}: could not read upload: {}", file_name, e),
                );
            }
        }
    }

    if files.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no files uploaded");
    }

    let mut session = state.session();
    let outcomes = session.stage_files(&files);
    let response = UploadResponse {
        pending: session.pending().len(),
        preview: session.preview(PREVIEW_ROWS).to_vec(),
        files: outcomes,
    };

    (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
}

/// POST /api/merge - Commit the staged batch into the roster file
async fn merge(State(state): State<AppState>) -> Response {
    let mut session = state.session();

    match session.commit() {
        Ok(outcome) => {
            let response = MergeResponse {
                before: outcome.before,
                after: outcome.after(),
                added: outcome.added(),
                duplicates: outcome.duplicates(),
                summary: outcome.summary(),
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "merge failed");
            error_response(status_for(&e), e.to_string())
        }
    }
}

/// GET /api/summary - Reference-ordered signup counts
async fn get_summary(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.session().report();
    let response = SummaryResponse {
        total_registrants: report.total_registrants,
        matched_registrants: report.matched_registrants,
        unmatched_registrants: report.unmatched_registrants(),
        rows: report.rows,
    };
    Json(ApiResponse::ok(response))
}

/// GET /api/roster - The deduplicated roster
async fn get_roster(State(state): State<AppState>) -> impl IntoResponse {
    let records = state.session().roster().records().to_vec();
    Json(ApiResponse::ok(records))
}

/// GET /api/unmatched - Roster units missing from the reference list
async fn get_unmatched(State(state): State<AppState>) -> impl IntoResponse {
    let unmatched = state.session().unmatched();
    let response = UnmatchedResponse {
        enabled: unmatched.is_some(),
        units: unmatched.unwrap_or_default(),
    };
    Json(ApiResponse::ok(response))
}

/// GET /api/export - xlsx download
async fn export(State(state): State<AppState>) -> Response {
    let artifact = match state.session().export_report() {
        Ok(artifact) => artifact,
        Err(e) => {
            tracing::error!(error = %e, "export failed");
            return error_response(status_for(&e), e.to_string());
        }
    };

    let disposition = format!(
        "attachment; filename=\"report.xlsx\"; filename*=UTF-8''{}",
        urlencoding::encode(&artifact.file_name)
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response()
}

/// POST /api/reference/reload - Rebuild the cached reference table
async fn reload_reference(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session();
    session.reload_reference();
    Json(ApiResponse::ok(session.status()))
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_or_default(std::path::Path::new(CONFIG_FILE))?;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🌐 Registration Reconciler - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let addr = config.server_addr.clone();
    let session = Session::open(config).context("failed to open session")?;
    let status = session.status();
    println!("✓ Roster: {} registrants", status.roster_size);
    match &status.reference_error {
        None => println!("✓ Reference: {} units", status.reference_units),
        Some(err) => println!("⚠️  Reference unavailable: {}", err),
    }

    // Create shared state
    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/upload", post(upload))
        .route("/merge", post(merge))
        .route("/summary", get(get_summary))
        .route("/roster", get(get_roster))
        .route("/unmatched", get(get_unmatched))
        .route("/export", get(export))
        .route("/reference/reload", post(reload_reference))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .with_state(state);

    // Build main router
    let app = Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/status", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
