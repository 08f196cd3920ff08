//! History API endpoints

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::headers::{HeaderMapExt, UserAgent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use super::events;
use crate::{
    models::{
        DistinctValues, FilterCriteria, HistoryPage, HistoryQuery, HistoryStatistics, LogEntry,
        RecordRequest,
    },
    services::{export::download_filename, ExportFormat, RequestEnvironment},
    utils::{validation::validate_reference, AppError, AppResult, HistoryError},
    AppState,
};

/// Header carrying the client screen as `WIDTHxHEIGHT[xDEPTH]`
pub const SCREEN_RESOLUTION_HEADER: &str = "x-screen-resolution";

/// Base name of exported files
const EXPORT_BASENAME: &str = "historique";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_entries).post(record_entry).delete(clear_history),
        )
        .route("/filter", get(filter_entries))
        .route("/export", get(export_entries))
        .route("/stats", get(get_statistics))
        .route("/facets", get(get_facets))
        .route("/cleanup", post(run_cleanup))
        .route("/events", get(events::history_event_stream))
        .route("/reference/{id_reference}", get(entries_by_reference))
        .route("/{id}", get(get_entry))
}

/// Diagnostic metadata of the calling client
///
/// Never rejects: every part is optional.
#[derive(Debug, Clone, Default)]
pub struct ClientEnvironment(pub RequestEnvironment);

impl<S> FromRequestParts<S> for ClientEnvironment
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(ClientEnvironment(RequestEnvironment {
            ip: forwarded_for(&parts.headers).or(peer),
            user_agent: parts
                .headers
                .typed_get::<UserAgent>()
                .map(|ua| ua.as_str().to_string()),
            resolution: parts
                .headers
                .get(SCREEN_RESOLUTION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }))
    }
}

/// First address of `X-Forwarded-For`, set by a reverse proxy
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Serialize)]
struct RecordResponse {
    id: String,
    persisted: bool,
    entry: LogEntry,
}

/// Record an entry (structured object or positional array)
async fn record_entry(
    State(state): State<AppState>,
    ClientEnvironment(client): ClientEnvironment,
    Json(request): Json<RecordRequest>,
) -> AppResult<(StatusCode, Json<RecordResponse>)> {
    if let RecordRequest::Structured(ref record) = request {
        record.validate()?;
    }

    let mut new_entry = request.into_new_entry()?;
    if new_entry.metadata.is_none() {
        let metadata = client.into_metadata();
        if !metadata.is_empty() {
            new_entry.metadata = Some(metadata);
        }
    }

    let recorded = state.history.try_record(new_entry).await?;
    if !recorded.persisted {
        tracing::warn!(id = %recorded.entry.id, "History entry kept in memory only");
    }

    Ok((
        StatusCode::CREATED,
        Json(RecordResponse {
            id: recorded.entry.id.clone(),
            persisted: recorded.persisted,
            entry: recorded.entry,
        }),
    ))
}

/// Paginated, sorted listing
async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryPage> {
    Json(state.history.query(&query).await)
}

/// Every matching entry, newest first
async fn filter_entries(
    State(state): State<AppState>,
    Query(criteria): Query<FilterCriteria>,
) -> Json<Vec<LogEntry>> {
    Json(state.history.filter(&criteria).await)
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<LogEntry>> {
    state
        .history
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("History entry '{}' not found", id)))
}

/// All entries of one business object, oldest first
async fn entries_by_reference(
    State(state): State<AppState>,
    Path(id_reference): Path<String>,
) -> AppResult<Json<Vec<LogEntry>>> {
    if !validate_reference(&id_reference) {
        return Err(AppError::bad_request(
            HistoryError::InvalidReference(id_reference).to_string(),
        ));
    }
    Ok(Json(state.history.by_reference(&id_reference).await))
}

#[derive(Debug, Default, Deserialize)]
struct ExportParams {
    #[serde(default)]
    format: Option<String>,
}

/// Download matching entries as CSV or JSON
async fn export_entries(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Response> {
    let format = match params.format.as_deref().map(str::trim) {
        None | Some("") => ExportFormat::default(),
        Some(f) => f.parse::<ExportFormat>().map_err(AppError::bad_request)?,
    };

    let body = state.history.export(format, &query).await.map_err(|e| {
        tracing::error!("Failed to export history: {}", e);
        AppError::internal("Failed to export history")
    })?;

    let filename = download_filename(EXPORT_BASENAME, format, state.history.now().date_naive());
    tracing::info!(format = format.extension(), %filename, "History exported");

    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

async fn get_statistics(State(state): State<AppState>) -> Json<HistoryStatistics> {
    Json(state.history.statistics().await)
}

async fn get_facets(State(state): State<AppState>) -> Json<DistinctValues> {
    Json(state.history.distinct_values().await)
}

#[derive(Debug, Default, Deserialize)]
struct ClearParams {
    #[serde(default)]
    confirm: bool,
}

/// Remove every entry; requires `?confirm=true`
async fn clear_history(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> AppResult<Json<serde_json::Value>> {
    if !params.confirm {
        return Err(AppError::bad_request(
            "Clearing the history requires confirm=true",
        ));
    }

    let persisted = state.history.clear().await;
    Ok(Json(json!({ "cleared": true, "persisted": persisted })))
}

/// Run a retention pass now
async fn run_cleanup(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = state.history.cleanup().await;
    Json(json!({
        "removed": removed,
        "retentionDays": state.history.config().retention_days,
    }))
}
