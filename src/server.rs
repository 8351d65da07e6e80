//! Web server module.
//!
//! Provides the prediction form, dashboard/history views, and JSON API
//! endpoints over the prediction store.

use axum::{
    Json, Router,
    extract::{Form, FromRequest, Query, Request, State},
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::model::Model;
use crate::storage::{BackendKind, PredictionRecord, PredictionStore, SqlValue, StatsSummary};

/// Default page size for the logs API.
const DEFAULT_LOGS_LIMIT: u32 = 20;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: PredictionStore,
    pub model: Option<Model>,
}

/// Query parameters for the logs API.
#[derive(Debug, Deserialize)]
pub struct LogsQueryParams {
    pub limit: Option<u32>,
}

// =============================================================================
// Templates
// =============================================================================

use askama::Template;

/// Prediction input form.
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate;

/// Single prediction result page.
#[derive(Template)]
#[template(path = "result.html")]
struct ResultTemplate {
    prediction: String,
    genes: Vec<f64>,
    true_label: Option<String>,
    logged: bool,
}

/// Dashboard with statistics and recent predictions.
#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    stats: StatsSummary,
    recent: Vec<PredictionRecord>,
}

/// Full prediction history page.
#[derive(Template)]
#[template(path = "history.html")]
struct HistoryTemplate {
    stats: StatsSummary,
    predictions: Vec<PredictionRecord>,
}

/// Error page.
#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    error: String,
}

/// Wrapper to render Askama templates as Axum responses.
struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(rendered) => Html(rendered).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "Template render failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(index_handler))
        .route("/predict", post(predict_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/history", get(history_handler))
        .route("/api/logs", get(api_logs_handler))
        .route("/api/stats", get(api_stats_handler))
        .route("/health", get(health_handler))
        .route("/test-db", get(test_db_handler))
        .fallback(fallback_handler)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

// =============================================================================
// Prediction
// =============================================================================

/// Raw form/JSON input for a prediction request.
///
/// Values arrive as strings from the HTML form and as numbers (or strings)
/// from JSON clients; each gene is validated individually.
#[derive(Debug, Deserialize)]
struct PredictInput {
    gene1: Option<NumOrStr>,
    gene2: Option<NumOrStr>,
    gene3: Option<NumOrStr>,
    gene4: Option<NumOrStr>,
    gene5: Option<NumOrStr>,
    true_label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(f64),
    Str(String),
}

fn parse_gene(index: usize, value: Option<&NumOrStr>) -> Result<f64, String> {
    let parsed = match value {
        Some(NumOrStr::Num(v)) => Some(*v),
        Some(NumOrStr::Str(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(format!("Invalid or missing value for Gene {index}")),
    }
}

fn error_response(wants_json: bool, status: StatusCode, message: String) -> Response {
    if wants_json {
        (status, Json(json!({ "error": message }))).into_response()
    } else {
        (status, HtmlTemplate(ErrorTemplate { error: message })).into_response()
    }
}

/// Handle prediction requests from the HTML form or JSON clients.
async fn predict_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let wants_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    let input: PredictInput = if wants_json {
        match Json::<PredictInput>::from_request(req, &()).await {
            Ok(Json(input)) => input,
            Err(e) => {
                return error_response(
                    true,
                    StatusCode::BAD_REQUEST,
                    format!("invalid request body: {e}"),
                );
            }
        }
    } else {
        match Form::<PredictInput>::from_request(req, &()).await {
            Ok(Form(input)) => input,
            Err(e) => {
                return error_response(
                    false,
                    StatusCode::BAD_REQUEST,
                    format!("invalid form body: {e}"),
                );
            }
        }
    };

    let Some(model) = state.model.as_ref() else {
        return error_response(
            wants_json,
            StatusCode::SERVICE_UNAVAILABLE,
            "ML model not available. Please contact administrator.".to_string(),
        );
    };

    let fields = [
        &input.gene1,
        &input.gene2,
        &input.gene3,
        &input.gene4,
        &input.gene5,
    ];
    let mut genes = [0.0f64; 5];
    for (i, field) in fields.iter().enumerate() {
        match parse_gene(i + 1, field.as_ref()) {
            Ok(v) => genes[i] = v,
            Err(message) => return error_response(wants_json, StatusCode::BAD_REQUEST, message),
        }
    }

    // Empty string and "Unknown" both mean no ground truth.
    let true_label = input
        .true_label
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("unknown"))
        .map(str::to_string);

    let outcome = model.predict(&genes);
    let logged = state
        .store
        .log_prediction(genes, outcome, true_label.as_deref())
        .await;

    if wants_json {
        Json(json!({
            "prediction": outcome.to_string(),
            "prediction_numeric": outcome.numeric(),
            "genes": genes,
            "true_label": true_label,
            "logged": logged,
        }))
        .into_response()
    } else {
        HtmlTemplate(ResultTemplate {
            prediction: outcome.to_string(),
            genes: genes.to_vec(),
            true_label,
            logged,
        })
        .into_response()
    }
}

// =============================================================================
// Pages
// =============================================================================

/// Prediction form homepage.
async fn index_handler() -> impl IntoResponse {
    HtmlTemplate(IndexTemplate)
}

/// Dashboard with statistics and the ten most recent predictions.
async fn dashboard_handler(State(state): State<Arc<AppState>>) -> Response {
    let stats = state.store.get_stats().await;
    let recent = state.store.list_predictions(10).await;

    match (stats, recent) {
        (Ok(stats), Ok(recent)) => HtmlTemplate(DashboardTemplate { stats, recent }).into_response(),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "dashboard query failed");
            error_response(
                false,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Dashboard temporarily unavailable".to_string(),
            )
        }
    }
}

/// Full prediction history.
async fn history_handler(State(state): State<Arc<AppState>>) -> Response {
    let stats = state.store.get_stats().await;
    let predictions = state.store.list_predictions(100).await;

    match (stats, predictions) {
        (Ok(stats), Ok(predictions)) => {
            HtmlTemplate(HistoryTemplate { stats, predictions }).into_response()
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "history query failed");
            error_response(
                false,
                StatusCode::INTERNAL_SERVER_ERROR,
                "History temporarily unavailable".to_string(),
            )
        }
    }
}

// =============================================================================
// JSON API
// =============================================================================

/// Logs API endpoint - returns recent predictions as JSON.
async fn api_logs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsQueryParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LOGS_LIMIT);
    match state.store.list_predictions(limit).await {
        Ok(predictions) => Json(json!({
            "status": "success",
            "count": predictions.len(),
            "data": predictions,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Stats API endpoint - returns aggregate counts as JSON.
async fn api_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.get_stats().await {
        Ok(stats) => Json(json!({ "status": "success", "data": stats })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": e.to_string() })),
        )
            .into_response(),
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Health check: acquires a connection and reports the live backend.
async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.database().acquire().await {
        Ok(conn) => {
            let backend = conn.kind();
            conn.close().await;
            Json(json!({
                "status": "healthy",
                "database": backend.as_ref(),
                "model_loaded": state.model.is_some(),
                "timestamp": Utc::now(),
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                    "model_loaded": state.model.is_some(),
                    "timestamp": Utc::now(),
                })),
            )
                .into_response()
        }
    }
}

/// Database probe: reports backend kind and engine version.
async fn test_db_handler(State(state): State<Arc<AppState>>) -> Response {
    let db = state.store.database();
    let backend = match db.acquire().await {
        Ok(conn) => {
            let backend = conn.kind();
            conn.close().await;
            backend
        }
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
                .into_response();
        }
    };

    let template = match backend {
        BackendKind::Postgres => "SELECT version()",
        BackendKind::Sqlite => "SELECT sqlite_version()",
    };

    match db.fetch_all(template, &[]).await {
        Ok(rows) => {
            let version = rows
                .first()
                .and_then(|row| row.first())
                .and_then(SqlValue::as_str)
                .unwrap_or("unknown");
            let version = match backend {
                BackendKind::Sqlite => format!("SQLite {version}"),
                BackendKind::Postgres => version.to_string(),
            };
            Json(json!({
                "status": "success",
                "database_type": backend.as_ref(),
                "version": version,
                "message": format!("Successfully connected to {backend} database"),
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": e.to_string() })),
        )
            .into_response(),
    }
}

/// 404 handler: JSON under /api/, error page elsewhere.
async fn fallback_handler(uri: Uri) -> Response {
    if uri.path().starts_with("/api/") {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "API endpoint not found" })),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            HtmlTemplate(ErrorTemplate {
                error: "Page not found".to_string(),
            }),
        )
            .into_response()
    }
}
