use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::record::{parse_id, HistoryRecord, NewUrl, UrlRecord};
use crate::server::AppState;
use crate::storage::UrlRegistry;
use crate::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error rendered as `{"status": ..., "error": ...}` with a matching HTTP code
#[derive(Debug)]
pub struct ApiError {
    code: StatusCode,
    status: &'static str,
    error: String,
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            code: StatusCode::BAD_REQUEST,
            status: "Invalid request.",
            error: error.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => Self::bad_request(msg),
            Error::NotFound(msg) => Self {
                code: StatusCode::NOT_FOUND,
                status: "Resource not found.",
                error: msg,
            },
            other => {
                tracing::error!("Request failed: {}", other);
                Self {
                    code: StatusCode::INTERNAL_SERVER_ERROR,
                    status: "Internal server error.",
                    error: other.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: self.status.to_string(),
            error: Some(self.error),
        };
        (self.code, Json(body)).into_response()
    }
}

/// Run a store operation on the blocking pool.
///
/// The operation is not cancelled when the request is: if the request times
/// out, a write already handed to the pool still runs to completion and
/// commits after the client has received 408.
async fn with_registry<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn UrlRegistry) -> crate::Result<T> + Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    let result = tokio::task::spawn_blocking(move || op(registry.as_ref()))
        .await
        .map_err(|e| Error::Task(e.to_string()))?;
    Ok(result?)
}

pub async fn index() -> &'static str {
    "hi"
}

pub async fn list_urls(
    State(state): State<AppState>,
) -> Result<Json<Vec<UrlRecord>>, ApiError> {
    let urls = with_registry(&state, |registry| registry.list()).await?;
    Ok(Json(urls))
}

pub async fn create_url(
    State(state): State<AppState>,
    payload: Result<Json<NewUrl>, JsonRejection>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let Json(new) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    new.validate()?;

    let url = new.url.clone();
    let id = with_registry(&state, move |registry| registry.upsert(&new)).await?;
    tracing::info!("Registered {} as id {}", url, id);
    Ok(Json(CreatedResponse { id }))
}

pub async fn get_url(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<UrlRecord>, ApiError> {
    let id = parse_id(&raw_id)?;
    let record = with_registry(&state, move |registry| registry.get(id))
        .await?
        .ok_or_else(|| Error::NotFound(format!("no url with id {}", id)))?;
    Ok(Json(record))
}

/// Deleting an unknown id still answers 200.
pub async fn delete_url(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = parse_id(&raw_id)?;
    let removed = with_registry(&state, move |registry| registry.delete(id)).await?;
    if removed {
        tracing::info!("Removed url id {}", id);
    }
    Ok(Json(StatusResponse {
        status: "OK".to_string(),
    }))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let id = parse_id(&raw_id)?;
    let history = with_registry(&state, move |registry| registry.history(id)).await?;
    Ok(Json(history))
}
