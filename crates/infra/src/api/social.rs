//! Social platform API adapter.
//!
//! Implements the [`SocialApi`] port against the X API v2 surface: identity
//! verification via `GET /2/users/me` and post creation via `POST /2/tweets`.
//! Rate-limit headers on successful responses are surfaced so the tracker can
//! reconcile its local window with the server's view.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use perch_core::ports::{PostDelivery, SocialApi};
use perch_domain::errors::{PerchError, Result};
use perch_domain::types::{OperationClass, PostReceipt, RateLimitSnapshot, UserIdentity};
use reqwest::header::HeaderMap;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::http::RequestExecutor;

const IDENTITY_PATH: &str = "/2/users/me";
const POST_PATH: &str = "/2/tweets";

/// Fallback wait when a 429 arrives without a usable reset header
const RATE_LIMIT_FALLBACK_SECS: i64 = 900;

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: UserData,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct PostBody<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostEnvelope {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    title: Option<String>,
    detail: Option<String>,
}

/// HTTP implementation of the [`SocialApi`] port.
pub struct HttpSocialApi {
    executor: Arc<RequestExecutor>,
    api_base: String,
}

impl HttpSocialApi {
    pub fn new(executor: Arc<RequestExecutor>, api_base: impl Into<String>) -> Self {
        Self { executor, api_base: api_base.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl SocialApi for HttpSocialApi {
    async fn verify_identity(&self, access_token: &str) -> Result<UserIdentity> {
        let request = self
            .executor
            .client()
            .get(self.url(IDENTITY_PATH))
            .bearer_auth(access_token);

        let response = self.executor.send(request, OperationClass::General).await?;
        if !response.status().is_success() {
            return Err(map_error(response).await);
        }

        let envelope: UserEnvelope = response
            .json()
            .await
            .map_err(|err| PerchError::Api {
                status: 200,
                detail: format!("malformed identity response: {err}"),
            })?;

        debug!(user_id = %envelope.data.id, "identity verified");
        Ok(UserIdentity {
            id: envelope.data.id,
            username: envelope.data.username,
            display_name: envelope.data.name,
        })
    }

    async fn create_post(&self, access_token: &str, text: &str) -> Result<PostDelivery> {
        let request = self
            .executor
            .client()
            .post(self.url(POST_PATH))
            .bearer_auth(access_token)
            .json(&PostBody { text });

        let response = self.executor.send(request, OperationClass::Posting).await?;
        if !response.status().is_success() {
            return Err(map_error(response).await);
        }

        let rate_limit = rate_limit_snapshot(response.headers());
        let envelope: PostEnvelope = response
            .json()
            .await
            .map_err(|err| PerchError::Api {
                status: 200,
                detail: format!("malformed post response: {err}"),
            })?;

        info!(post_id = %envelope.data.id, "post created");
        Ok(PostDelivery {
            receipt: PostReceipt {
                id: envelope.data.id,
                text: envelope.data.text,
                posted_at: Utc::now(),
            },
            rate_limit,
        })
    }
}

/// Read the `x-rate-limit-*` trio; absent or unparseable headers yield `None`.
fn rate_limit_snapshot(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    let limit = header_u32(headers, "x-rate-limit-limit")?;
    let remaining = header_u32(headers, "x-rate-limit-remaining")?;
    let resets_at = rate_limit_reset(headers)?;
    Some(RateLimitSnapshot { limit, remaining, resets_at })
}

fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let epoch = headers.get("x-rate-limit-reset")?.to_str().ok()?.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(epoch, 0).single()
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

async fn map_error(response: Response) -> PerchError {
    let status = response.status().as_u16();
    let resets_at = rate_limit_reset(response.headers());
    let body = response.text().await.unwrap_or_default();

    if status == 429 {
        let resets_at = resets_at
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(RATE_LIMIT_FALLBACK_SECS));
        warn!(%resets_at, "request rejected by server rate limit");
        return PerchError::RateLimit { resets_at };
    }

    let detail = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(parsed) => parsed
            .detail
            .or(parsed.title)
            .unwrap_or_else(|| format!("api returned status {status}")),
        Err(_) if !body.is_empty() => body,
        Err(_) => format!("api returned status {status}"),
    };

    warn!(status, %detail, "api request failed");
    PerchError::Api { status, detail }
}
