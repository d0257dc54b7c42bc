use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::api::ApiState;

/// Devices refuse `itms-services` manifests served over plain HTTP, so any
/// request that did not arrive over HTTPS gets redirected. Loopback hosts are
/// exempt for local development, and the whole layer can be disabled for
/// deployments that terminate TLS in a way we cannot see.
pub(crate) async fn https_redirect_mw(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    if state.disable_https_redirect {
        return next.run(req).await;
    }

    let forwarded_https = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or("").trim() == "https")
        .unwrap_or(false);
    if forwarded_https {
        return next.run(req).await;
    }

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if host.is_empty() || is_loopback(host) {
        return next.run(req).await;
    }

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::permanent(&format!("https://{host}{path_and_query}")).into_response()
}

fn is_loopback(host: &str) -> bool {
    let bare = if let Some(rest) = host.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.split(':').next().unwrap_or(host)
    };
    matches!(bare, "localhost" | "127.0.0.1" | "::1")
}
