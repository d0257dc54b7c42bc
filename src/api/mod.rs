use std::net::SocketAddr;
use std::time::Instant;

use axum::{middleware, Router};

use crate::config::Config;
use crate::download::TaskManager;

pub mod base_url;
pub(crate) mod error;
pub mod handlers;
pub(crate) mod redirect;
pub mod router;


#[derive(Clone)]
pub struct ApiState {
    pub manager: TaskManager,
    pub public_base_url: String,
    pub data_dir: String,
    pub disable_https_redirect: bool,
    pub started_at: Instant,
}

pub async fn serve(cfg: &Config, manager: TaskManager) -> anyhow::Result<()> {
    let state = ApiState {
        manager,
        public_base_url: cfg.server.public_base_url.clone(),
        data_dir: cfg.general.data_dir.clone(),
        disable_https_redirect: cfg.server.disable_https_redirect,
        started_at: Instant::now(),
    };
    let app = router::build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    tracing::info!(addr = %addr, "api server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn apply_middleware(app: Router, state: ApiState) -> Router {
    app.layer(middleware::from_fn_with_state(
        state,
        redirect::https_redirect_mw,
    ))
}
