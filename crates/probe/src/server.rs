use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use dialprobe_core::error::{ProbeError, Result};
use dialprobe_core::model::request::CheckRequest;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::handler::Handler;
use crate::sink::MetricsSink;

pub fn router<S>(handler: Arc<Handler<S>>) -> Router
where
    S: MetricsSink + 'static,
{
    Router::new()
        .route("/invoke", post(invoke::<S>))
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(handler)
}

async fn invoke<S>(
    State(handler): State<Arc<Handler<S>>>,
    event: std::result::Result<Json<CheckRequest>, JsonRejection>,
) -> (StatusCode, String)
where
    S: MetricsSink + 'static,
{
    let Json(req) = match event {
        Ok(event) => event,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "invocation event rejected");
            return (rejection.status(), rejection.body_text());
        }
    };

    match handler.invoke(&req).await {
        Ok(message) => (StatusCode::OK, message),
        Err(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

/// Binds the invoke listener. `addr` may name a host (`localhost:9000`).
pub async fn bind_invoke_listener(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ProbeError::Io(format!("failed to bind invoke listener {addr}: {e}")))
}

pub async fn run_invoke_server<S>(handler: Arc<Handler<S>>, addr: &str) -> Result<()>
where
    S: MetricsSink + 'static,
{
    let listener = bind_invoke_listener(addr).await?;
    if let Ok(local) = listener.local_addr() {
        tracing::info!(addr = %local, "invoke server listening");
    }
    axum::serve(listener, router(handler))
        .await
        .map_err(|e| ProbeError::Io(format!("invoke server failed: {e}")))
}
