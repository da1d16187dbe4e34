//! Login decision procedure.
//!
//! A login attempt runs linearly, with no retries at this layer:
//!
//! 1. read the config; without one no login can succeed (`DeniedPrecondition`)
//! 2. read the role; a missing role is denied exactly like a membership miss
//! 3. authenticate the signed request with the identity service
//! 4. an empty allow-list denies without a second call; otherwise filter the role's
//!    group ids down to the principal's memberships
//! 5. any surviving group grants the role
//! 6. the grant echoes the role's token parameters and carries the principal as an alias
//!
//! Store locks are only held inside the store calls in steps 1 and 2. The two identity
//! calls run with no lock held and observe the caller's cancellation and deadline.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config_store::ConfigStore;
use super::role_store::{normalize_role_name, RoleEntry, RoleStore};
use super::token_params::{duration_secs, TokenType};
use crate::error::{unauthorized_denial, AppError, AppResult};
use crate::identity::{
    AuthType, AuthenticateClientDetails, CallOptions, FilterGroupMembershipDetails, IdentityError, IdentityService,
    Principal, RequestContext, SignedRequest,
};

/// Lease bounds applied when a role leaves its TTLs at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemTtls {
    pub default_ttl: Duration,
    pub max_ttl: Duration,
}

impl Default for SystemTtls {
    fn default() -> Self {
        Self { default_ttl: Duration::from_secs(24 * 3600), max_ttl: Duration::from_secs(48 * 3600) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(alias = "auth_type")]
    pub auth_type: AuthType,
    #[serde(flatten)]
    pub signed: SignedRequest,
    #[serde(default, alias = "retry_token")]
    pub retry_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alias {
    pub name: String,
}

/// Successful login: the role's credential parameters, time-bounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub policies: Vec<String>,
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    #[serde(with = "duration_secs")]
    pub max_ttl: Duration,
    #[serde(with = "duration_secs")]
    pub period: Duration,
    #[serde(with = "duration_secs")]
    pub explicit_max_ttl: Duration,
    pub num_uses: u64,
    pub bound_cidrs: Vec<String>,
    pub token_type: TokenType,
    pub no_default_policy: bool,
    pub display_name: String,
    pub metadata: BTreeMap<String, String>,
    pub alias: Alias,
    pub issued_at: DateTime<Utc>,
}

impl Grant {
    fn assemble(role: &RoleEntry, principal: &Principal, ttls: SystemTtls) -> Self {
        let tp = &role.token_params;
        let max_ttl = if tp.token_max_ttl.is_zero() { ttls.max_ttl } else { tp.token_max_ttl };
        let ttl = if tp.token_ttl.is_zero() { ttls.default_ttl } else { tp.token_ttl };
        let mut metadata = BTreeMap::new();
        metadata.insert("role_name".to_string(), role.role.clone());
        Self {
            policies: tp.token_policies.clone(),
            ttl: ttl.min(max_ttl),
            max_ttl,
            period: tp.token_period,
            explicit_max_ttl: tp.token_explicit_max_ttl,
            num_uses: tp.token_num_uses,
            bound_cidrs: tp.token_bound_cidrs.clone(),
            token_type: tp.token_type,
            no_default_policy: tp.token_no_default_policy,
            display_name: format!("oci-{}", principal.identity()),
            metadata,
            alias: Alias { name: principal.identity().to_string() },
            issued_at: Utc::now(),
        }
    }
}

/// Why a login was denied. Kept for logs only; callers see one generic denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    RoleNotFound,
    SignatureRejected,
    EmptyAllowList,
    NoMatchingGroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Grant(Grant),
    DeniedUnauthorized(DenialReason),
    DeniedPrecondition,
    Upstream(String),
    Canceled,
    Validation(String),
    Internal(String),
}

impl LoginOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            LoginOutcome::Grant(_) => "grant",
            LoginOutcome::DeniedUnauthorized(_) => "denied_unauthorized",
            LoginOutcome::DeniedPrecondition => "denied_precondition",
            LoginOutcome::Upstream(_) => "upstream",
            LoginOutcome::Canceled => "canceled",
            LoginOutcome::Validation(_) => "validation",
            LoginOutcome::Internal(_) => "internal",
        }
    }

    pub fn is_grant(&self) -> bool { matches!(self, LoginOutcome::Grant(_)) }

    /// What the caller may observe. Role absence, missing config and membership misses
    /// are indistinguishable.
    pub fn into_result(self) -> AppResult<Grant> {
        match self {
            LoginOutcome::Grant(g) => Ok(g),
            LoginOutcome::DeniedUnauthorized(_) => Err(unauthorized_denial()),
            LoginOutcome::DeniedPrecondition => {
                Err(AppError::precondition("config_not_set", "backend config not set").narrow_for_login())
            }
            LoginOutcome::Upstream(msg) => Err(AppError::upstream("identity_unavailable".to_string(), msg)),
            LoginOutcome::Canceled => Err(AppError::canceled("canceled", "request canceled")),
            LoginOutcome::Validation(msg) => Err(AppError::validation("invalid_login_request".to_string(), msg)),
            LoginOutcome::Internal(msg) => Err(AppError::internal("internal".to_string(), msg).narrow_for_login()),
        }
    }

    fn from_identity_error(e: IdentityError) -> Self {
        match e {
            IdentityError::Unauthorized(_) => LoginOutcome::DeniedUnauthorized(DenialReason::SignatureRejected),
            IdentityError::Transient(msg) | IdentityError::Decode(msg) => LoginOutcome::Upstream(msg),
            IdentityError::Canceled => LoginOutcome::Canceled,
        }
    }

    /// Store read failures on the login path. NotFound-shaped results never get here;
    /// they are absent options.
    fn from_store_error(e: AppError) -> Self {
        match e {
            AppError::Validation { message, .. } => LoginOutcome::Validation(message),
            other => LoginOutcome::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRole {
    pub role: String,
}

pub struct LoginAuthorizer {
    config: Arc<ConfigStore>,
    roles: Arc<RoleStore>,
    identity: Arc<dyn IdentityService>,
    ttls: SystemTtls,
}

impl LoginAuthorizer {
    pub fn new(config: Arc<ConfigStore>, roles: Arc<RoleStore>, identity: Arc<dyn IdentityService>, ttls: SystemTtls) -> Self {
        Self { config, roles, identity, ttls }
    }

    /// Run one outbound call under the caller's cancellation token and deadline.
    async fn guarded<T, F>(&self, ctx: &RequestContext, call: F) -> Result<T, IdentityError>
    where
        F: Future<Output = Result<T, IdentityError>>,
    {
        let remaining = ctx.remaining();
        let bounded = async move {
            match remaining {
                Some(d) => tokio::time::timeout(d, call).await.unwrap_or(Err(IdentityError::Canceled)),
                None => call.await,
            }
        };
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(IdentityError::Canceled),
            r = bounded => r,
        }
    }

    pub async fn login(&self, role_name: &str, req: &LoginRequest, ctx: &RequestContext) -> LoginOutcome {
        let outcome = self.evaluate(role_name, req, ctx).await;
        match &outcome {
            LoginOutcome::Grant(g) => info!(
                target: "ociauth::login", request_id = %ctx.request_id, role = %role_name,
                auth_type = req.auth_type.as_str(), alias = %g.alias.name, ttl_secs = g.ttl.as_secs(), "login granted"
            ),
            LoginOutcome::DeniedUnauthorized(reason) => info!(
                target: "ociauth::login", request_id = %ctx.request_id, role = %role_name,
                auth_type = req.auth_type.as_str(), reason = ?reason, "login denied"
            ),
            LoginOutcome::DeniedPrecondition => warn!(
                target: "ociauth::login", request_id = %ctx.request_id, role = %role_name, "login denied: no config"
            ),
            other => warn!(
                target: "ociauth::login", request_id = %ctx.request_id, role = %role_name, outcome = other.tag(), "login failed: {:?}", other
            ),
        }
        outcome
    }

    async fn evaluate(&self, role_name: &str, req: &LoginRequest, ctx: &RequestContext) -> LoginOutcome {
        let role_name = match normalize_role_name(role_name) {
            Ok(n) => n,
            Err(e) => return LoginOutcome::Validation(e.message().to_string()),
        };
        if req.signed.is_empty() {
            return LoginOutcome::Validation("missing requestHeaders".into());
        }
        if ctx.cancel.is_cancelled() {
            return LoginOutcome::Canceled;
        }

        let config = match self.config.get().await {
            Ok(Some(c)) => c,
            Ok(None) => return LoginOutcome::DeniedPrecondition,
            Err(e) => return LoginOutcome::from_store_error(e),
        };
        let role = match self.roles.get(&role_name).await {
            Ok(Some(r)) => r,
            Ok(None) => return LoginOutcome::DeniedUnauthorized(DenialReason::RoleNotFound),
            Err(e) => return LoginOutcome::from_store_error(e),
        };

        let opts = CallOptions { retry_token: ctx.effective_retry_token(), request_id: ctx.request_id.clone() };
        let details = AuthenticateClientDetails { signed: req.signed.clone(), tenant_scope: config.home_tenancy_id.clone() };
        let principal = match self.guarded(ctx, self.identity.authenticate(&details, &opts)).await {
            Ok(p) => p,
            Err(e) => return LoginOutcome::from_identity_error(e),
        };
        debug!(target: "ociauth::login", request_id = %ctx.request_id, subject = %principal.identity(), "principal resolved");

        if role.allowed_group_ids.is_empty() {
            return LoginOutcome::DeniedUnauthorized(DenialReason::EmptyAllowList);
        }

        let filter = FilterGroupMembershipDetails { principal: principal.clone(), group_ids: role.allowed_group_ids.clone() };
        let mut matched = match self.guarded(ctx, self.identity.filter_group_membership(&filter, &opts)).await {
            Ok(ids) => ids,
            Err(e) => return LoginOutcome::from_identity_error(e),
        };
        // only ids the role actually lists count
        matched.retain(|g| role.allowed_group_ids.contains(g));
        if matched.is_empty() {
            return LoginOutcome::DeniedUnauthorized(DenialReason::NoMatchingGroup);
        }

        LoginOutcome::Grant(Grant::assemble(&role, &principal, self.ttls))
    }

    /// Report whether a role exists without authenticating anyone. Implies nothing about
    /// whether a later login will succeed.
    pub async fn resolve_role(&self, role_name: &str) -> AppResult<ResolvedRole> {
        let name = normalize_role_name(role_name)?;
        match self.roles.get(&name).await? {
            Some(r) => Ok(ResolvedRole { role: r.role }),
            None => Err(AppError::validation("invalid_role".to_string(), format!("invalid role name \"{}\"", name))),
        }
    }
}
