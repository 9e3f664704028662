//! In-process LibreTranslate-style HTTP server built on axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy)]
pub enum StubMode {
    /// Answers `[target] text`.
    Prefix,
    /// Answers every translate call with a 500.
    ServerError,
    /// Answers the first `n` translate calls with a 500, then prefixes.
    FailFirst(usize),
}

struct StubState {
    mode: StubMode,
    requests: AtomicUsize,
    last_request: Mutex<Option<Value>>,
}

/// Server running on its own thread and runtime, so both sync tests and
/// `tokio::test` can use it. Stopped on drop.
pub struct StubServer {
    pub base_url: String,
    state: Arc<StubState>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StubServer {
    pub fn start(mode: StubMode) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(StubState {
            mode,
            requests: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        });
        let app = Router::new()
            .route("/translate", post(translate))
            .route("/languages", get(languages))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .unwrap();
            });
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    /// Number of translate calls received.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Value> {
        self.state.last_request.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn translate(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    let call = state.requests.fetch_add(1, Ordering::SeqCst) + 1;
    *state.last_request.lock().unwrap() = Some(body.clone());

    let fail = match state.mode {
        StubMode::Prefix => false,
        StubMode::ServerError => true,
        StubMode::FailFirst(n) => call <= n,
    };
    if fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, "translation backend crashed").into_response();
    }

    let text = body["q"].as_str().unwrap_or_default();
    let target = body["target"].as_str().unwrap_or_default();
    Json(json!({ "translatedText": format!("[{}] {}", target, text) })).into_response()
}

async fn languages() -> Json<Value> {
    Json(json!([
        { "code": "en", "name": "English" },
        { "code": "es", "name": "Spanish" },
        { "code": "de", "name": "German" }
    ]))
}
