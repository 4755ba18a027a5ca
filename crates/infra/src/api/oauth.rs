//! OAuth token endpoint adapter.
//!
//! Implements the [`OAuthApi`] port against an RFC 6749 token endpoint with
//! PKCE (public client, no secret). Terminal rejection codes from the
//! provider are distinguished from transient failures so the token lifecycle
//! can tell "re-authenticate" apart from "try again later".

use std::sync::Arc;

use async_trait::async_trait;
use perch_core::ports::OAuthApi;
use perch_domain::config::ProviderConfig;
use perch_domain::errors::{PerchError, Result, TokenError};
use perch_domain::types::{OperationClass, TokenGrant};
use reqwest::Response;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::http::RequestExecutor;

/// OAuth error codes that make a grant permanently unusable
const TERMINAL_OAUTH_CODES: [&str; 4] =
    ["invalid_grant", "invalid_client", "unauthorized_client", "invalid_scope"];

/// Wire shape of a token endpoint success response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

const fn default_expires_in() -> i64 {
    7200
}

impl From<TokenResponse> for TokenGrant {
    fn from(wire: TokenResponse) -> Self {
        Self {
            access_token: wire.access_token,
            token_type: wire.token_type,
            expires_in: wire.expires_in,
            refresh_token: wire.refresh_token,
            scope: wire.scope,
        }
    }
}

/// Wire shape of an RFC 6749 error response
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    error_description: Option<String>,
}

impl OAuthErrorBody {
    fn detail(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {description}", self.error),
            None => self.error.clone(),
        }
    }
}

/// HTTP implementation of the [`OAuthApi`] port.
pub struct HttpOAuthApi {
    executor: Arc<RequestExecutor>,
    provider: ProviderConfig,
}

impl HttpOAuthApi {
    pub fn new(executor: Arc<RequestExecutor>, provider: ProviderConfig) -> Self {
        Self { executor, provider }
    }

    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
        class: OperationClass,
    ) -> Result<Response> {
        let request = self.executor.client().post(url).form(params);
        self.executor.send(request, class).await
    }
}

/// Status code, OAuth error code (when the body parses), and display detail.
async fn error_parts(response: Response) -> (u16, Option<String>, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<OAuthErrorBody>(&body) {
        Ok(parsed) => {
            let detail = parsed.detail();
            (status, Some(parsed.error), detail)
        }
        Err(_) => {
            let detail = if body.is_empty() {
                format!("token endpoint returned status {status}")
            } else {
                body
            };
            (status, None, detail)
        }
    }
}

async fn parse_grant(response: Response) -> Result<TokenGrant> {
    let wire: TokenResponse = response
        .json()
        .await
        .map_err(|err| PerchError::Token(TokenError::Malformed(err.to_string())))?;
    Ok(wire.into())
}

#[async_trait]
impl OAuthApi for HttpOAuthApi {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.provider.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .post_form(&self.provider.token_url, &params, OperationClass::Authentication)
            .await?;

        if !response.status().is_success() {
            let (status, _, detail) = error_parts(response).await;
            warn!(status, %detail, "authorization code exchange rejected");
            return Err(PerchError::Api { status, detail });
        }

        let grant = parse_grant(response).await?;
        info!("authorization code exchanged for tokens");
        Ok(grant)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        if refresh_token.is_empty() {
            return Err(TokenError::RefreshRejected("empty refresh token".into()).into());
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.provider.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response =
            self.post_form(&self.provider.token_url, &params, OperationClass::Refresh).await?;

        if !response.status().is_success() {
            let (status, code, detail) = error_parts(response).await;
            if code.as_deref().is_some_and(|c| TERMINAL_OAUTH_CODES.contains(&c)) {
                warn!(status, %detail, "refresh token rejected by provider");
                return Err(TokenError::RefreshRejected(detail).into());
            }
            warn!(status, %detail, "token refresh failed");
            return Err(PerchError::Api { status, detail });
        }

        let grant = parse_grant(response).await?;
        debug!("access token refreshed");
        Ok(grant)
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let params = [("token", token), ("client_id", self.provider.client_id.as_str())];

        let response =
            self.post_form(&self.provider.revoke_url, &params, OperationClass::General).await?;

        if !response.status().is_success() {
            let (status, _, detail) = error_parts(response).await;
            return Err(PerchError::Api { status, detail });
        }

        debug!("token revoked");
        Ok(())
    }
}
