use crate::collect::{self, CollectorConfig};
use crate::identity::IdentityResolver;
use crate::metrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

struct AppState<R> {
    collector: Arc<CollectorConfig>,
    resolver: Arc<R>,
    /// Overlapping scrapes wait for the running cycle instead of starting another.
    scrape_lock: Arc<Mutex<()>>,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            collector: Arc::clone(&self.collector),
            resolver: Arc::clone(&self.resolver),
            scrape_lock: Arc::clone(&self.scrape_lock),
        }
    }
}

/// Build the HTTP routes: the metrics endpoint and a health check.
pub fn router<R>(collector: Arc<CollectorConfig>, resolver: Arc<R>, metrics_path: &str) -> Router
where
    R: IdentityResolver + 'static,
{
    let state = AppState {
        collector,
        resolver,
        scrape_lock: Arc::new(Mutex::new(())),
    };

    Router::new()
        .route(metrics_path, get(scrape::<R>))
        .route("/api/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until SIGINT/SIGTERM.
pub async fn run(app: Router, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("serve listening on {local_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::signals::shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

async fn scrape<R: IdentityResolver + 'static>(State(state): State<AppState<R>>) -> Response {
    let _guard = state.scrape_lock.lock().await;

    let samples = match collect::collect(&state.collector, state.resolver.as_ref()).await {
        Ok(samples) => Some(samples),
        Err(e) => {
            tracing::error!(error = %e, "collection cycle failed, serving no stat samples");
            None
        }
    };

    match metrics::render(&state.collector.namespace, samples) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, metrics::CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::tests::{config, write_player, MapResolver};
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_ok() {
        let dir = TempDir::new().unwrap();
        let app = router(
            Arc::new(config(dir.path(), &[("n", "n")])),
            Arc::new(MapResolver::default()),
            "/metrics",
        );
        let (status, _, body) = get_body(app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn metrics_serves_samples() {
        let dir = TempDir::new().unwrap();
        write_player(dir.path(), "uuid123", "stats.json", r#"{"a": {"b": 5}}"#);
        let app = router(
            Arc::new(config(dir.path(), &[("foo", "a.b")])),
            Arc::new(MapResolver::default().with("stats", Some("Ash"))),
            "/metrics",
        );

        let (status, content_type, body) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(metrics::CONTENT_TYPE));
        assert!(body.contains(
            "cobblemon_counter{player=\"Ash\",namespace=\"cobblemon\",stat=\"foo\"} 5\n"
        ));
        assert!(body.contains("cobblemon_exporter_build_info"));
    }

    #[tokio::test]
    async fn failed_cycle_serves_no_counters() {
        let dir = TempDir::new().unwrap();
        write_player(dir.path(), "a1", "aaaa.json", r#"{"n": 1}"#);
        write_player(dir.path(), "b2", "bbbb.json", "garbage");
        let app = router(
            Arc::new(config(dir.path(), &[("n", "n")])),
            Arc::new(
                MapResolver::default()
                    .with("aaaa", Some("Ash"))
                    .with("bbbb", Some("Brock")),
            ),
            "/metrics",
        );

        let (status, _, body) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("cobblemon_counter"));
        assert!(body.contains("cobblemon_exporter_build_info"));
    }

    #[tokio::test]
    async fn custom_metrics_path() {
        let dir = TempDir::new().unwrap();
        let app = router(
            Arc::new(config(dir.path(), &[("n", "n")])),
            Arc::new(MapResolver::default()),
            "/scrape",
        );
        let (status, _, body) = get_body(app.clone(), "/scrape").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE cobblemon_exporter_build_info gauge"));

        let (status, _, _) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
