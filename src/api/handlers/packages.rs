use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use crate::api::error::{error_response, ApiError};
use crate::api::handlers::downloads::AccountQuery;
use crate::api::handlers::install::stream_artifact;
use crate::api::ApiState;
use crate::download::TaskStatus;

/// Account-scoped artifact download, for pulling the signed package to a
/// desktop instead of installing it OTA.
pub(crate) async fn file(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Response, ApiError> {
    let account = query.account_hash.ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "Missing required query parameter: accountHash",
        )
    })?;

    let task = state.manager.get(&id, &account).await.map_err(|_| {
        error_response(StatusCode::NOT_FOUND, "Package not found")
    })?;
    if task.status != TaskStatus::Completed || task.file_path.is_none() {
        return Err(error_response(StatusCode::NOT_FOUND, "Package not found"));
    }

    let disposition = format!(
        "attachment; filename=\"{}.ipa\"",
        file_stem(&task.software, &task.id)
    );
    stream_artifact(&state, &task, Some(disposition)).await
}

fn file_stem(software: &Value, fallback: &str) -> String {
    let name = software
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(fallback);
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .collect();
    if cleaned.trim().is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}
