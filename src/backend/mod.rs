//! The auth backend: the config and role stores plus the login authorizer that reads them.
//!
//! Stores own their lock and their storage handle and are injected into the authorizer.
//! Administrative requests go straight to a store and never reach the identity service.

use std::sync::Arc;

use crate::identity::IdentityService;
use crate::storage::Storage;

pub mod config_store;
pub mod role_store;
pub mod token_params;
pub mod login;

pub use config_store::{ConfigEntry, ConfigStore, CONFIG_KEY};
pub use role_store::{normalize_role_name, RoleEntry, RoleStore, RoleUpdate, MAX_GROUP_IDS_PER_ROLE, ROLE_PREFIX};
pub use token_params::{StringList, TokenFieldsInput, TokenParams, TokenParamsError, TokenType};
pub use login::{Alias, DenialReason, Grant, LoginAuthorizer, LoginOutcome, LoginRequest, ResolvedRole, SystemTtls};

pub struct Backend {
    pub config: Arc<ConfigStore>,
    pub roles: Arc<RoleStore>,
    pub login: LoginAuthorizer,
}

impl Backend {
    pub fn new(storage: Arc<dyn Storage>, identity: Arc<dyn IdentityService>, ttls: SystemTtls) -> Self {
        let config = Arc::new(ConfigStore::new(storage.clone()));
        let roles = Arc::new(RoleStore::new(storage));
        let login = LoginAuthorizer::new(config.clone(), roles.clone(), identity, ttls);
        Self { config, roles, login }
    }
}

#[cfg(test)]
mod backend_tests;
