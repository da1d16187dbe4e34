//! Identity verification service: the remote collaborator that turns signed-request
//! material into a principal and filters candidate groups down to the principal's own.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod provider;
mod request_context;
mod retry_token;
pub mod client;

pub use principal::{Principal, Claim};
pub use provider::{
    AuthType, AuthenticateClientDetails, AuthenticateClientResult, CallOptions, FilterGroupMembershipDetails,
    FilterGroupMembershipResult, IdentityError, IdentityService, SignedRequest,
};
pub use request_context::RequestContext;
pub use retry_token::gen_retry_token;
pub use client::HttpIdentityClient;
