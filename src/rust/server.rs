//! HTTP endpoint for the ledger's webhooks.
//!
//! `POST /` takes a "store transaction" hook, classifies every transaction
//! in it and writes the categories back to the ledger. `POST /learn` takes an
//! "update transaction" hook and trains on the confirmed categories. Any
//! other method, or a body that is not a hook payload, gets `400`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use log::{error, info};
use tokio::net::TcpListener;

use crate::ledger::FireflyClient;
use crate::service::Categorizer;
use crate::webhook::{handle_new_transactions, handle_updated_transactions, push_categories, WebhookPayload};

/// Shared state accessible from the handlers.
#[derive(Clone)]
pub struct AppState {
    pub categorizer: Arc<Categorizer>,
    /// Where classified categories are written back. `None` only classifies.
    pub ledger: Option<Arc<FireflyClient>>,
}

impl AppState {
    pub fn new(categorizer: Arc<Categorizer>, ledger: Option<Arc<FireflyClient>>) -> Self {
        Self { categorizer, ledger }
    }
}

/// Builds the router with both hook routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(new_transaction_hook))
        .route("/learn", any(update_transaction_hook))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Serves hooks on `listener` until Ctrl-C, then writes any pending updates.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let categorizer = Arc::clone(&state.categorizer);
    info!("Listening for webhooks on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down");
    if let Err(e) = categorizer.flush_if_dirty() {
        error!("Final snapshot write failed: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
}

async fn log_request(request: axum::extract::Request, next: Next) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    info!("{} {} {}", remote, request.method(), request.uri());
    next.run(request).await
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

fn decode(method: &Method, body: &[u8]) -> Result<WebhookPayload, Response> {
    if *method != Method::POST {
        return Err(bad_request("bad request"));
    }
    serde_json::from_slice(body).map_err(|e| {
        info!("Rejecting hook body: {}", e);
        bad_request("bad data")
    })
}

/// POST /
async fn new_transaction_hook(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    let payload = match decode(&method, &body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let results = handle_new_transactions(&state.categorizer, &payload);
    if let Some(ledger) = &state.ledger {
        let failures = push_categories(ledger, &results).await;
        if !failures.is_empty() {
            error!("{} of {} category update(s) failed", failures.len(), results.len());
        }
    }
    StatusCode::OK.into_response()
}

/// POST /learn
async fn update_transaction_hook(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    let payload = match decode(&method, &body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    // Training may write the snapshot
    let categorizer = Arc::clone(&state.categorizer);
    match tokio::task::spawn_blocking(move || handle_updated_transactions(&categorizer, &payload)).await {
        Ok(results) => {
            let learned = results.iter().filter(|(_, result)| result.is_ok()).count();
            info!("hook update trn: learned {} of {} transaction(s)", learned, results.len());
            StatusCode::OK.into_response()
        }
        Err(e) => {
            error!("hook update trn: training task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceConfig;
    use crate::Classifier;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const LEARN_HOOK: &str = r#"{"content": {"transactions": [
        {"transaction_journal_id": 1, "description": "Lidl Filiale 0042", "category_name": "Groceries"},
        {"transaction_journal_id": 2, "description": "Aral Tankstelle", "category_name": "Fuel"}
    ]}}"#;

    const NEW_HOOK: &str = r#"{"content": {"transactions": [
        {"transaction_journal_id": 3, "description": "LIDL 0042 sagt danke"}
    ]}}"#;

    fn make_state(dir: &std::path::Path) -> AppState {
        let config = PersistenceConfig::new(dir.join("model.json"));
        let categorizer = Categorizer::open(Classifier::builder(), config).unwrap();
        AppState::new(Arc::new(categorizer), None)
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_learn_then_classify() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path());
        let app = router(state.clone());

        let resp = app.clone().oneshot(post("/learn", LEARN_HOOK)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.categorizer.classifier().info().total_documents, 2);
        assert!(state.categorizer.snapshot_store().exists());

        let resp = app.oneshot(post("/", NEW_HOOK)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            state.categorizer.on_new_transaction("LIDL 0042 sagt danke").to_string(),
            "Groceries"
        );
    }

    #[tokio::test]
    async fn test_non_post_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(make_state(dir.path()));

        for uri in ["/", "/learn"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

            let body = axum::body::to_bytes(resp.into_body(), 1_000).await.unwrap();
            assert_eq!(&body[..], b"bad request");
        }
    }

    #[tokio::test]
    async fn test_bad_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path());
        let app = router(state.clone());

        for uri in ["/", "/learn"] {
            let resp = app.clone().oneshot(post(uri, "{\"content\":")).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

            let body = axum::body::to_bytes(resp.into_body(), 1_000).await.unwrap();
            assert_eq!(&body[..], b"bad data");
        }
        assert_eq!(state.categorizer.classifier().info().total_documents, 0);
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(make_state(dir.path()));
        let resp = app.oneshot(post("/nonexistent", NEW_HOOK)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
