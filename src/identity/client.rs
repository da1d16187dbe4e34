//! HTTP client for the remote identity verification service.
//!
//! Both operations are JSON POSTs under `/v1`. Each carries `opc-retry-token` so a
//! transport-level retry is not double-applied, and `opc-request-id` for correlation.
//! This client does not retry on its own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::provider::{
    AuthenticateClientDetails, AuthenticateClientResult, CallOptions, FilterGroupMembershipDetails,
    FilterGroupMembershipResult, IdentityError, IdentityService,
};
use super::Principal;

pub const RETRY_TOKEN_HEADER: &str = "opc-retry-token";
pub const REQUEST_ID_HEADER: &str = "opc-request-id";
pub const AUTHENTICATE_PATH: &str = "v1/authentication/authenticateClient";
pub const FILTER_GROUP_MEMBERSHIP_PATH: &str = "v1/filterGroupMembership";

/// Default service host for a region.
pub fn region_host(region: &str) -> String {
    format!("https://auth.{}.oraclecloud.com", region)
}

#[derive(Clone)]
pub struct HttpIdentityClient {
    base: Url,
    client: reqwest::Client,
}

impl HttpIdentityClient {
    pub fn new(host: &str, timeout: Duration) -> Result<Self, IdentityError> {
        // Url::join drops the last path segment unless the base ends with '/'
        let normalized = if host.ends_with('/') { host.to_string() } else { format!("{}/", host) };
        let base = Url::parse(&normalized)
            .map_err(|e| IdentityError::Transient(format!("invalid identity service url '{}': {}", host, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Transient(e.to_string()))?;
        Ok(Self { base, client })
    }

    pub fn from_settings(settings: &crate::settings::Settings) -> Result<Self, IdentityError> {
        Self::new(&settings.identity_host(), settings.identity_timeout())
    }

    pub fn base_url(&self) -> &Url { &self.base }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B, opts: &CallOptions) -> Result<R, IdentityError> {
        let url = self.base.join(path).map_err(|e| IdentityError::Transient(e.to_string()))?;
        debug!(target: "ociauth::identity", request_id = %opts.request_id, "POST {}", url);
        let resp = self.client
            .post(url)
            .header(RETRY_TOKEN_HEADER, &opts.retry_token)
            .header(REQUEST_ID_HEADER, &opts.request_id)
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }
        resp.json::<R>().await.map_err(|e| IdentityError::Decode(e.to_string()))
    }
}

/// Non-2xx status to error kind. Client-side rejections are evidence about the caller;
/// throttling and server failures are not.
pub fn classify_status(status: StatusCode, body: &str) -> IdentityError {
    let detail = if body.is_empty() { status.to_string() } else { format!("{}: {}", status, body) };
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => IdentityError::Transient(detail),
        s if s.is_server_error() => IdentityError::Transient(detail),
        s if s.is_client_error() => IdentityError::Unauthorized(detail),
        _ => IdentityError::Transient(detail),
    }
}

#[async_trait]
impl IdentityService for HttpIdentityClient {
    async fn authenticate(&self, details: &AuthenticateClientDetails, opts: &CallOptions) -> Result<Principal, IdentityError> {
        let result: AuthenticateClientResult = self.post_json(AUTHENTICATE_PATH, details, opts).await?;
        if let Some(msg) = result.error_message.filter(|m| !m.is_empty()) {
            return Err(IdentityError::Unauthorized(msg));
        }
        result.principal.ok_or_else(|| IdentityError::Unauthorized("no principal resolved".into()))
    }

    async fn filter_group_membership(&self, details: &FilterGroupMembershipDetails, opts: &CallOptions) -> Result<Vec<String>, IdentityError> {
        let result: FilterGroupMembershipResult = self.post_json(FILTER_GROUP_MEMBERSHIP_PATH, details, opts).await?;
        Ok(result.group_ids)
    }
}
