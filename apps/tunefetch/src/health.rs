use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

async fn healthz() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

#[must_use]
pub fn router() -> Router {
	Router::new().route("/healthz", get(healthz))
}

/// Serves the health endpoint until the token is cancelled.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve(port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
	let addr = SocketAddr::from(([0, 0, 0, 0], port));
	let listener = TcpListener::bind(addr).await?;
	info!(%addr, "health endpoint listening");

	axum::serve(listener, router())
		.with_graceful_shutdown(async move { cancel.cancelled().await })
		.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::{Request, StatusCode};
	use tower::ServiceExt;

	#[tokio::test]
	async fn healthz_reports_ok() {
		let response = router().oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
		let value: Value = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(value["status"], "ok");
	}
}
