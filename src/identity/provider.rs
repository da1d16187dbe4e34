use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::principal::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Signature or credential rejected, or principal not resolvable.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Service unreachable, throttled or failing server-side.
    #[error("identity service unavailable: {0}")]
    Transient(String),
    /// 2xx response the client could not decode.
    #[error("undecodable identity service response: {0}")]
    Decode(String),
    #[error("canceled")]
    Canceled,
}

/// How the caller signed the login request. Only echoed for logging; the identity
/// service resolves both kinds through the same endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    #[serde(rename = "apikey", alias = "api-key-signed-request", alias = "api_key")]
    ApiKey,
    #[serde(rename = "ip", alias = "platform-instance-identity", alias = "instance")]
    InstancePrincipal,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::ApiKey => "apikey",
            AuthType::InstancePrincipal => "ip",
        }
    }
}

/// Signed-request material supplied by the caller and forwarded verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedRequest {
    /// Lower-cased header name to values, including `(request-target)`, `host`, `date`
    /// and `authorization`.
    pub request_headers: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl SignedRequest {
    pub fn is_empty(&self) -> bool { self.request_headers.values().all(|v| v.is_empty()) }
}

/// Body of the authenticate call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateClientDetails {
    #[serde(flatten)]
    pub signed: SignedRequest,
    pub tenant_scope: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateClientResult {
    #[serde(default)]
    pub principal: Option<Principal>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterGroupMembershipDetails {
    pub principal: Principal,
    pub group_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterGroupMembershipResult {
    #[serde(default)]
    pub group_ids: Vec<String>,
}

/// Per-call metadata. The retry token makes a transport-level retry of the same logical
/// call safe at the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    pub retry_token: String,
    pub request_id: String,
}

/// Remote identity verification service.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn authenticate(&self, details: &AuthenticateClientDetails, opts: &CallOptions) -> Result<Principal, IdentityError>;

    /// Returns the subset of `details.group_ids` the principal belongs to.
    async fn filter_group_membership(&self, details: &FilterGroupMembershipDetails, opts: &CallOptions) -> Result<Vec<String>, IdentityError>;
}
