//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use perch_core::testing::{MockCredentialStore, MockQueueStore};
use perch_core::{NetworkMonitor, SystemClock, UrlOpener};
use perch_domain::{AuthState, PerchConfig, PerchError, ProviderConfig, Result};
use perch_infra::{
    AuthOrchestrator, HttpOAuthApi, HttpSocialApi, OrchestratorParts, RequestExecutor,
};
use tokio::sync::watch;
use wiremock::MockServer;

/// Browser stand-in that immediately completes the redirect with a code.
///
/// Parses the authorization URL the orchestrator hands to the opener and
/// issues the loopback callback the way a real provider redirect would.
pub struct AutoApprovingBrowser {
    code: String,
}

impl AutoApprovingBrowser {
    pub fn new(code: &str) -> Self {
        Self { code: code.to_string() }
    }
}

impl UrlOpener for AutoApprovingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let parsed =
            url::Url::parse(url).map_err(|err| PerchError::Validation(err.to_string()))?;
        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        let redirect = query
            .get("redirect_uri")
            .cloned()
            .ok_or_else(|| PerchError::Validation("missing redirect_uri".to_string()))?;
        let state = query.get("state").cloned().unwrap_or_default();

        let callback = format!("{redirect}?code={}&state={state}", self.code);
        tokio::spawn(async move {
            let _ = reqwest::get(&callback).await;
        });
        Ok(())
    }
}

/// Orchestrator wired with real HTTP adapters against a wiremock server.
pub struct WireHarness {
    pub orchestrator: Arc<AuthOrchestrator>,
    pub credentials: Arc<MockCredentialStore>,
    pub queue_store: Arc<MockQueueStore>,
    pub monitor: Arc<NetworkMonitor>,
}

/// Install a subscriber once so failing runs can be inspected with
/// `RUST_LOG=debug`.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn test_provider(server_uri: &str) -> ProviderConfig {
    ProviderConfig {
        client_id: "integration-client".to_string(),
        authorize_url: format!("{server_uri}/oauth/authorize"),
        token_url: format!("{server_uri}/2/oauth2/token"),
        revoke_url: format!("{server_uri}/2/oauth2/revoke"),
        api_base_url: server_uri.to_string(),
        scopes: vec![
            "tweet.read".to_string(),
            "tweet.write".to_string(),
            "users.read".to_string(),
            "offline.access".to_string(),
        ],
    }
}

/// Config pointed at the mock server, with retry delays kept test-sized.
pub fn test_config(server: &MockServer) -> PerchConfig {
    let mut config = PerchConfig::default();
    config.provider = test_provider(&server.uri());
    config.retry.max_attempts = 2;
    config.retry.base_delay_ms = 50;
    config.listener.wait_timeout_secs = 5;
    config
}

pub fn wire_harness(config: PerchConfig, opener: Arc<dyn UrlOpener>) -> WireHarness {
    wire_harness_with(
        config,
        opener,
        Arc::new(MockCredentialStore::new()),
        Arc::new(MockQueueStore::new()),
    )
}

/// Build an orchestrator reusing existing stores, as a process restart would.
pub fn wire_harness_with(
    config: PerchConfig,
    opener: Arc<dyn UrlOpener>,
    credentials: Arc<MockCredentialStore>,
    queue_store: Arc<MockQueueStore>,
) -> WireHarness {
    init_tracing();
    let monitor = Arc::new(NetworkMonitor::new(config.probe.clone()));
    let executor = Arc::new(
        RequestExecutor::new(monitor.clone(), config.retry.clone()).expect("request executor"),
    );

    let orchestrator = AuthOrchestrator::new(
        SystemClock,
        config.clone(),
        OrchestratorParts {
            oauth: Arc::new(HttpOAuthApi::new(executor.clone(), config.provider.clone())),
            social: Arc::new(HttpSocialApi::new(
                executor.clone(),
                config.provider.api_base_url.clone(),
            )),
            credentials: credentials.clone(),
            queue_store: queue_store.clone(),
            opener,
            monitor: monitor.clone(),
            probe_client: None,
        },
    )
    .expect("orchestrator config");

    WireHarness { orchestrator, credentials, queue_store, monitor }
}

/// Wait until the state channel reports a value matching `matches`.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<AuthState>,
    matches: fn(&AuthState) -> bool,
) -> AuthState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if matches(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.expect("state channel closed");
        }
    })
    .await
    .expect("state transition timed out")
}

pub fn grant_body(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({
        "token_type": "bearer",
        "expires_in": 7200,
        "access_token": access,
        "scope": "tweet.read tweet.write users.read offline.access",
        "refresh_token": refresh,
    })
}

pub fn identity_body(id: &str, username: &str, name: &str) -> serde_json::Value {
    serde_json::json!({ "data": { "id": id, "username": username, "name": name } })
}
