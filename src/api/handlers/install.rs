use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::api::base_url::resolve_base_url;
use crate::api::error::{error_response, ApiError};
use crate::api::ApiState;
use crate::download::{DownloadTask, TaskStatus};
use crate::install::manifest::{build_manifest, install_link, join_url, PLACEHOLDER_PNG};

/// The install routes authenticate by task id alone, so anything that is not
/// a finished, deliverable package is a plain 404.
pub(crate) async fn deliverable_task(
    state: &ApiState,
    id: &str,
) -> Result<DownloadTask, ApiError> {
    let not_found = || error_response(StatusCode::NOT_FOUND, "Package not found");
    let task = state
        .manager
        .get_unscoped(id)
        .await
        .map_err(|_| not_found())?;
    if task.status != TaskStatus::Completed || task.file_path.is_none() {
        return Err(not_found());
    }
    Ok(task)
}

pub(crate) async fn manifest(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let task = deliverable_task(&state, &id).await?;
    let base = resolve_base_url(&state.public_base_url, &headers, false);

    let xml = build_manifest(
        &task.software,
        &join_url(&base, &format!("api/install/{id}/payload.ipa")),
        &join_url(&base, &format!("api/install/{id}/icon-small.png")),
        &join_url(&base, &format!("api/install/{id}/icon-large.png")),
    );
    Ok(([(header::CONTENT_TYPE, "application/xml".to_string())], xml))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstallUrlResponse {
    pub(crate) install_url: String,
    pub(crate) manifest_url: String,
}

pub(crate) async fn install_url(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InstallUrlResponse>, ApiError> {
    deliverable_task(&state, &id).await?;
    let base = resolve_base_url(&state.public_base_url, &headers, false);
    let manifest_url = join_url(&base, &format!("api/install/{id}/manifest.plist"));
    Ok(Json(InstallUrlResponse {
        install_url: install_link(&manifest_url),
        manifest_url,
    }))
}

pub(crate) async fn payload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let task = deliverable_task(&state, &id).await?;
    stream_artifact(&state, &task, None).await
}

/// Both icon routes always answer with the placeholder; devices only care
/// that the URLs in the manifest resolve to a PNG.
pub(crate) async fn icon() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], PLACEHOLDER_PNG)
}

/// Streams the artifact from disk. The canonicalized file must live under
/// the canonicalized packages root; anything else is refused, even when the
/// task record itself points outside.
pub(crate) async fn stream_artifact(
    state: &ApiState,
    task: &DownloadTask,
    disposition: Option<String>,
) -> Result<Response, ApiError> {
    let not_found = || error_response(StatusCode::NOT_FOUND, "Package not found");
    let internal = || {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Package storage unavailable",
        )
    };

    let path = task.file_path.as_ref().ok_or_else(not_found)?;
    let root = tokio::fs::canonicalize(state.manager.packages_dir())
        .await
        .map_err(|_| internal())?;
    let real = tokio::fs::canonicalize(path).await.map_err(|_| not_found())?;
    if !real.starts_with(&root) {
        return Err(error_response(StatusCode::FORBIDDEN, "Access denied"));
    }

    let file = tokio::fs::File::open(&real).await.map_err(|_| not_found())?;
    let len = file.metadata().await.map_err(|_| internal())?.len();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, len);
    if let Some(disposition) = disposition {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }
    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|_| internal())
}
