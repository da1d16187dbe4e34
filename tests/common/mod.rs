#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ociauth::backend::{Backend, SystemTtls};
use ociauth::identity::{
    AuthType, AuthenticateClientDetails, CallOptions, FilterGroupMembershipDetails, IdentityError, IdentityService,
    Principal, SignedRequest,
};
use ociauth::backend::LoginRequest;
use ociauth::storage::{InmemStorage, Storage};

/// Identity service stand-in that counts calls and records what it was sent.
pub struct FakeIdentity {
    pub authenticate_result: Mutex<Result<Principal, IdentityError>>,
    pub filter_error: Mutex<Option<IdentityError>>,
    pub memberships: Mutex<HashSet<String>>,
    pub delay: Mutex<Option<Duration>>,
    pub authenticate_calls: AtomicUsize,
    pub filter_calls: AtomicUsize,
    pub seen: Mutex<Vec<CallOptions>>,
    pub tenant_scopes: Mutex<Vec<String>>,
}

impl FakeIdentity {
    pub fn member_of<I: IntoIterator<Item = &'static str>>(groups: I) -> Arc<Self> {
        Arc::new(Self {
            authenticate_result: Mutex::new(Ok(principal("ocid1.user.oc1..alice"))),
            filter_error: Mutex::new(None),
            memberships: Mutex::new(groups.into_iter().map(String::from).collect()),
            delay: Mutex::new(None),
            authenticate_calls: AtomicUsize::new(0),
            filter_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            tenant_scopes: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        let f = Self::member_of([]);
        *f.authenticate_result.lock() = Err(IdentityError::Unauthorized("bad signature".into()));
        f
    }

    pub fn auth_count(&self) -> usize { self.authenticate_calls.load(Ordering::SeqCst) }

    pub fn filter_count(&self) -> usize { self.filter_calls.load(Ordering::SeqCst) }

    async fn pause(&self) {
        let d = *self.delay.lock();
        if let Some(d) = d {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn authenticate(&self, details: &AuthenticateClientDetails, opts: &CallOptions) -> Result<Principal, IdentityError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(opts.clone());
        self.tenant_scopes.lock().push(details.tenant_scope.clone());
        self.pause().await;
        self.authenticate_result.lock().clone()
    }

    async fn filter_group_membership(&self, details: &FilterGroupMembershipDetails, opts: &CallOptions) -> Result<Vec<String>, IdentityError> {
        self.filter_calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(opts.clone());
        self.pause().await;
        if let Some(e) = self.filter_error.lock().clone() {
            return Err(e);
        }
        let m = self.memberships.lock();
        Ok(details.group_ids.iter().filter(|g| m.contains(*g)).cloned().collect())
    }
}

pub fn principal(subject: &str) -> Principal {
    Principal { tenant_id: Some("ocid1.tenancy.oc1..home".into()), subject_id: subject.into(), claims: vec![] }
}

pub fn backend_with(identity: Arc<FakeIdentity>) -> (Backend, Arc<InmemStorage>) {
    let mem = Arc::new(InmemStorage::new());
    let storage: Arc<dyn Storage> = mem.clone();
    (Backend::new(storage, identity, SystemTtls::default()), mem)
}

pub fn signed_headers() -> SignedRequest { signed_headers_for("devrole") }

pub fn signed_headers_for(role: &str) -> SignedRequest {
    let mut h = BTreeMap::new();
    h.insert("(request-target)".to_string(), vec![format!("post /v1/login/{}", role)]);
    h.insert("host".to_string(), vec!["127.0.0.1".to_string()]);
    h.insert("date".to_string(), vec!["Thu, 05 Jan 2014 21:31:40 GMT".to_string()]);
    h.insert("authorization".to_string(), vec!["Signature version=\"1\",keyId=\"k\",algorithm=\"rsa-sha256\"".to_string()]);
    SignedRequest { request_headers: h, body: None }
}

pub fn login_request(role: &str) -> LoginRequest {
    LoginRequest { auth_type: AuthType::ApiKey, signed: signed_headers_for(role), retry_token: None }
}
