use crate::error::AppError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use backup_info::{
    AnnotationCommand, AnnotationFailure, AnnotationReport, AnnotationRequest, BackupEntry,
    FieldValue, InfoError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_servers))
        .route("/{server}/backups", get(list_backups))
        .route("/{server}/backups/{selector}", get(get_backup))
        .route(
            "/{server}/backups/{selector}/fields/{key}",
            get(get_field).put(set_field),
        )
        .route("/{server}/backups/{selector}/annotations", post(annotate))
        .route("/{server}/valid-count", get(valid_count))
}

/// Run a store call off the async runtime; every store operation touches disk.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!(e))?
}

#[derive(Serialize)]
pub struct FieldResponse {
    pub key: String,
    pub value: String,
}

#[derive(Deserialize)]
pub struct SetFieldBody {
    pub value: FieldValue,
}

#[derive(Deserialize)]
pub struct AnnotateBody {
    pub command: String,
    pub key: String,
    pub comment: Option<String>,
}

#[derive(Serialize)]
pub struct ValidCount {
    pub server: String,
    pub valid: usize,
}

async fn list_servers(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.store.servers())
}

async fn list_backups(
    State(state): State<Arc<AppState>>,
    Path(server): Path<String>,
) -> Result<Json<Vec<BackupEntry>>, AppError> {
    let store = state.store.clone();
    let entries = blocking(move || Ok(store.list(&server)?)).await?;
    Ok(Json(entries))
}

async fn get_backup(
    State(state): State<Arc<AppState>>,
    Path((server, selector)): Path<(String, String)>,
) -> Result<Json<BackupEntry>, AppError> {
    let store = state.store.clone();
    let entry = blocking(move || Ok(store.find(&server, &selector)?)).await?;
    Ok(Json(entry))
}

async fn get_field(
    State(state): State<Arc<AppState>>,
    Path((server, selector, key)): Path<(String, String, String)>,
) -> Result<Json<FieldResponse>, AppError> {
    let store = state.store.clone();
    let response = blocking(move || {
        let value = store.field(&server, &selector, &key)?;
        Ok(FieldResponse { key, value })
    })
    .await?;
    Ok(Json(response))
}

async fn set_field(
    State(state): State<Arc<AppState>>,
    Path((server, selector, key)): Path<(String, String, String)>,
    Json(body): Json<SetFieldBody>,
) -> Result<Json<BackupEntry>, AppError> {
    let store = state.store.clone();
    let entry = blocking(move || {
        let entry = store.set_field(&server, &selector, &key, &body.value)?;
        tracing::info!(server = %server, label = entry.label(), key = %key, "Field updated");
        Ok(entry)
    })
    .await?;
    Ok(Json(entry))
}

async fn annotate(
    State(state): State<Arc<AppState>>,
    Path((server, selector)): Path<(String, String)>,
    body: Result<Json<AnnotateBody>, JsonRejection>,
) -> Result<Json<AnnotationReport>, AppError> {
    let failed = |source: InfoError| AnnotationFailure {
        report: AnnotationReport::failed(None, None),
        source,
    };
    let Json(body) = body.map_err(|e| failed(InfoError::Validation(e.body_text())))?;
    let command = AnnotationCommand::parse(&body.command, &body.key, body.comment.as_deref())
        .map_err(failed)?;

    let store = state.store.clone();
    let request = AnnotationRequest {
        server,
        backup: selector,
        command,
    };
    let report = blocking(move || Ok(store.annotate(&request)?)).await?;
    Ok(Json(report))
}

async fn valid_count(
    State(state): State<Arc<AppState>>,
    Path(server): Path<String>,
) -> Result<Json<ValidCount>, AppError> {
    let store = state.store.clone();
    let valid = blocking({
        let server = server.clone();
        move || Ok(store.count_valid(&server))
    })
    .await?;
    Ok(Json(ValidCount { server, valid }))
}
