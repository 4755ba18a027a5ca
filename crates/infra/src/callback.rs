//! Loopback HTTP server that receives the OAuth redirect callback.
//!
//! Bound to 127.0.0.1 only. The server exists for exactly one authorization
//! attempt: the first callback carrying a code or an error consumes the
//! delivery slot, later callbacks get a 409, and unrelated paths get a 404.
//! State validation is deliberately not done here; the orchestrator owns the
//! expected state and compares it after delivery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use perch_domain::config::ListenerConfig;
use perch_domain::errors::{AuthorizationError, PerchError, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window and return to the app.</p></body>
</html>"#;

const DENIED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Declined</title></head>
<body><h1>Authorization Declined</h1><p>You can close this window.</p></body>
</html>"#;

const ALREADY_HANDLED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Already Completed</title></head>
<body><h1>Already Completed</h1><p>This authorization attempt has already been handled.</p></body>
</html>"#;

const MALFORMED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Invalid Callback</title></head>
<body><h1>Invalid Callback</h1><p>The callback was missing required parameters.</p></body>
</html>"#;

/// What the provider redirect delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Authorization code plus the returned state parameter
    Code { code: String, state: String },
    /// Provider-reported denial (e.g. the user declined consent)
    Denied { error: String, state: Option<String> },
}

type OutcomeSlot = Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>;

/// One-shot loopback server for a single authorization attempt.
pub struct CallbackServer {
    port: u16,
    callback_path: String,
    outcome_rx: oneshot::Receiver<CallbackOutcome>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind and start serving.
    ///
    /// Tries the configured preferred ports in order, then falls back to an
    /// ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns `AuthorizationError::ListenerBind` when no loopback port can
    /// be bound at all.
    pub async fn start(config: &ListenerConfig) -> Result<Self> {
        let listener = bind_loopback(&config.preferred_ports).await?;
        let port = listener
            .local_addr()
            .map_err(|err| {
                PerchError::from(AuthorizationError::ListenerBind(format!(
                    "failed to determine listener port: {err}"
                )))
            })?
            .port();

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let slot: OutcomeSlot = Arc::new(Mutex::new(Some(outcome_tx)));

        let app = Router::new().route(
            &config.callback_path,
            get(move |query: Query<HashMap<String, String>>| {
                handle_callback(query, slot.clone())
            }),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!(error = %err, "callback server error");
            }
        });

        info!(port, "callback listener started");
        Ok(Self {
            port,
            callback_path: config.callback_path.clone(),
            outcome_rx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Port the listener is bound to.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to register with the authorization request.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.callback_path)
    }

    /// Wait for the callback, then shut the listener down gracefully.
    ///
    /// The response to the browser is flushed before shutdown completes.
    ///
    /// # Errors
    ///
    /// Returns `AuthorizationError::Timeout` when no callback arrives within
    /// `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<CallbackOutcome> {
        let received = tokio::time::timeout(timeout, &mut self.outcome_rx).await;
        let result = match received {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => {
                Err(PerchError::Internal("callback channel closed before delivery".into()))
            }
            Err(_) => Err(AuthorizationError::Timeout.into()),
        };

        self.shutdown().await;
        result
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    error!(error = %err, "callback server panicked");
                }
            }
        }
        debug!(port = self.port, "callback listener stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn bind_loopback(preferred: &[u16]) -> Result<TcpListener> {
    for &port in preferred {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                debug!(port, "bound preferred callback port");
                return Ok(listener);
            }
            Err(err) => debug!(port, error = %err, "preferred callback port unavailable"),
        }
    }

    if !preferred.is_empty() {
        info!("all preferred callback ports unavailable, falling back to an ephemeral port");
    }

    TcpListener::bind(("127.0.0.1", 0)).await.map_err(|err| {
        AuthorizationError::ListenerBind(format!("failed to bind loopback listener: {err}"))
            .into()
    })
}

async fn handle_callback(
    Query(params): Query<HashMap<String, String>>,
    slot: OutcomeSlot,
) -> (StatusCode, Html<&'static str>) {
    let code = params.get("code").cloned();
    let error = params.get("error").cloned();
    let state = params.get("state").cloned();

    let outcome = match (code, error) {
        (Some(code), _) => {
            let Some(state) = state else {
                return (StatusCode::BAD_REQUEST, Html(MALFORMED_PAGE));
            };
            CallbackOutcome::Code { code, state }
        }
        (None, Some(error)) => {
            let error = match params.get("error_description") {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            CallbackOutcome::Denied { error, state }
        }
        (None, None) => return (StatusCode::BAD_REQUEST, Html(MALFORMED_PAGE)),
    };

    let sender = slot.lock().take();
    match sender {
        Some(tx) => {
            let page = match &outcome {
                CallbackOutcome::Code { .. } => SUCCESS_PAGE,
                CallbackOutcome::Denied { .. } => DENIED_PAGE,
            };
            let _ = tx.send(outcome);
            (StatusCode::OK, Html(page))
        }
        None => (StatusCode::CONFLICT, Html(ALREADY_HANDLED_PAGE)),
    }
}
