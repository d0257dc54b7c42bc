use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers::{downloads, install, packages, settings};
use crate::api::{apply_middleware, ApiState};

pub fn build_app(state: ApiState) -> Router {
    let api = Router::new()
        .route("/downloads", get(downloads::list).post(downloads::create))
        .route("/downloads/events", get(downloads::events))
        .route(
            "/downloads/:id",
            get(downloads::get_one).delete(downloads::remove),
        )
        .route("/downloads/:id/pause", post(downloads::pause))
        .route("/downloads/:id/resume", post(downloads::resume))
        .route("/install/:id/manifest.plist", get(install::manifest))
        .route("/install/:id/url", get(install::install_url))
        .route("/install/:id/payload.ipa", get(install::payload))
        .route("/install/:id/icon-small.png", get(install::icon))
        .route("/install/:id/icon-large.png", get(install::icon))
        .route("/packages/:id/file", get(packages::file))
        .route("/settings", get(settings::settings));

    let app = Router::new().nest("/api", api).with_state(state.clone());
    apply_middleware(app, state)
}
