use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::ApiState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SettingsResponse {
    pub(crate) version: &'static str,
    pub(crate) data_dir: String,
    pub(crate) uptime_secs: u64,
}

pub(crate) async fn settings(State(state): State<ApiState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        version: env!("CARGO_PKG_VERSION"),
        data_dir: state.data_dir.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
