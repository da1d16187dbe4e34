use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub issuer: Option<String>,
}

/// Caller identity resolved by the identity service. Opaque to the backend apart from
/// `subject_id`, which is echoed into the grant as an audit alias. It is sent back
/// unchanged on the membership call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub subject_id: String,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl Principal {
    pub fn identity(&self) -> &str { &self.subject_id }
}
