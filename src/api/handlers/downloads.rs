use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::error::{error_response, task_error_response, ApiError};
use crate::api::ApiState;
use crate::download::manager::CreateTask;
use crate::download::{DownloadTask, SinfRecord, TaskStatus};

/// Client-facing task view. Server-side fields (artifact path, license
/// records, metadata blob) never leave through this type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskEntry {
    pub(crate) id: String,
    pub(crate) account_hash: String,
    pub(crate) software: Value,
    pub(crate) status: TaskStatus,
    pub(crate) progress: u8,
    pub(crate) speed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) bytes_downloaded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_bytes: Option<u64>,
}

impl From<DownloadTask> for TaskEntry {
    fn from(task: DownloadTask) -> Self {
        Self {
            id: task.id,
            account_hash: task.account_hash,
            software: task.software,
            status: task.status,
            progress: task.progress,
            speed: task.speed,
            error: task.error,
            created_at: task.created_at,
            bytes_downloaded: task.bytes_downloaded,
            total_bytes: task.total_bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SinfBody {
    pub(crate) id: u64,
    pub(crate) sinf: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateDownloadBody {
    pub(crate) account_hash: Option<String>,
    pub(crate) software: Option<Value>,
    #[serde(rename = "downloadURL")]
    pub(crate) download_url: Option<String>,
    pub(crate) sinfs: Option<Vec<SinfBody>>,
    #[serde(rename = "iTunesMetadata", default)]
    pub(crate) itunes_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountQuery {
    pub(crate) account_hash: Option<String>,
}

fn require<T>(field: Option<T>, name: &str) -> Result<T, ApiError> {
    field.ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Missing required field: {name}"),
        )
    })
}

fn require_account(query: AccountQuery) -> Result<String, ApiError> {
    query.account_hash.ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "Missing required query parameter: accountHash",
        )
    })
}

pub(crate) async fn create(
    State(state): State<ApiState>,
    body: Result<Json<CreateDownloadBody>, JsonRejection>,
) -> Result<Json<TaskEntry>, ApiError> {
    let Json(body) = body
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Request body must be valid JSON"))?;

    let req = CreateTask {
        account_hash: require(body.account_hash, "accountHash")?,
        software: require(body.software, "software")?,
        download_url: require(body.download_url, "downloadURL")?,
        sinfs: require(body.sinfs, "sinfs")?
            .into_iter()
            .map(|s| SinfRecord {
                id: s.id,
                sinf: s.sinf,
            })
            .collect(),
        itunes_metadata: body.itunes_metadata.unwrap_or(Value::Null),
    };

    let task = state.manager.create(req).await.map_err(task_error_response)?;
    Ok(Json(TaskEntry::from(task)))
}

pub(crate) async fn list(
    State(state): State<ApiState>,
    Query(query): Query<AccountQuery>,
) -> Json<Vec<TaskEntry>> {
    let tasks = state.manager.list(query.account_hash.as_deref()).await;
    Json(tasks.into_iter().map(TaskEntry::from).collect())
}

pub(crate) async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<TaskEntry>, ApiError> {
    let account = require_account(query)?;
    let task = state
        .manager
        .get(&id, &account)
        .await
        .map_err(task_error_response)?;
    Ok(Json(TaskEntry::from(task)))
}

pub(crate) async fn pause(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<TaskEntry>, ApiError> {
    let account = require_account(query)?;
    let task = state
        .manager
        .pause(&id, &account)
        .await
        .map_err(task_error_response)?;
    Ok(Json(TaskEntry::from(task)))
}

pub(crate) async fn resume(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<TaskEntry>, ApiError> {
    let account = require_account(query)?;
    let task = state
        .manager
        .resume(&id, &account)
        .await
        .map_err(task_error_response)?;
    Ok(Json(TaskEntry::from(task)))
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteResponse {
    pub(crate) deleted: bool,
}

pub(crate) async fn remove(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let account = require_account(query)?;
    state
        .manager
        .delete(&id, &account)
        .await
        .map_err(task_error_response)?;
    Ok(Json(DeleteResponse { deleted: true }))
}

/// Server-sent task snapshots for one account: the current tasks first, then
/// every change as it happens.
pub(crate) async fn events(
    State(state): State<ApiState>,
    Query(query): Query<AccountQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let account = require_account(query)?;

    let live_rx = state.manager.subscribe();
    let initial = state.manager.list(Some(&account)).await;
    let initial_stream =
        futures_util::stream::iter(initial.into_iter().map(|task| Ok(task_event(task))));

    let live = BroadcastStream::new(live_rx).filter_map(move |item| {
        let account = account.clone();
        async move {
            match item {
                Ok(task) if task.account_hash == account => Some(Ok(task_event(task))),
                _ => None,
            }
        }
    });

    Ok(Sse::new(initial_stream.chain(live)).keep_alive(KeepAlive::default()))
}

fn task_event(task: DownloadTask) -> Event {
    let entry = TaskEntry::from(task);
    let data = serde_json::to_string(&entry).unwrap_or_default();
    Event::default().event("task").data(data)
}
