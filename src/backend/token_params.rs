//! Issued-credential parameters attached to a role and echoed into every grant.
//!
//! Input fields are partial: on update, a field that is absent keeps its stored value.
//! Durations accept integer seconds or humantime strings; list fields accept a JSON
//! array or a comma-separated string.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenParamsError {
    #[error("invalid duration for {field}: '{value}'")]
    InvalidDuration { field: &'static str, value: String },
    #[error("token_num_uses cannot be negative")]
    NegativeNumUses,
    #[error("token_ttl should not be greater than token_max_ttl")]
    TtlExceedsMaxTtl,
    #[error("invalid CIDR block '{0}'")]
    InvalidCidr(String),
    #[error("invalid token_type '{0}'; expected default, service or batch")]
    InvalidTokenType(String),
}

/// A list field that callers may send as `["a","b"]` or `"a,b"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    List(Vec<String>),
    Csv(String),
}

impl StringList {
    /// Trimmed items, empties dropped, caller order kept.
    pub fn into_vec(self) -> Vec<String> {
        let raw = match self {
            StringList::List(v) => v,
            StringList::Csv(s) => s.split(',').map(|p| p.to_string()).collect(),
        };
        raw.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    Secs(i64),
    Text(String),
}

impl DurationInput {
    pub fn parse(&self, field: &'static str) -> Result<Duration, TokenParamsError> {
        match self {
            DurationInput::Secs(n) if *n >= 0 => Ok(Duration::from_secs(*n as u64)),
            DurationInput::Secs(n) => Err(TokenParamsError::InvalidDuration { field, value: n.to_string() }),
            DurationInput::Text(s) => {
                let t = s.trim();
                if t.is_empty() { return Ok(Duration::ZERO); }
                if let Ok(n) = t.parse::<u64>() { return Ok(Duration::from_secs(n)); }
                humantime::parse_duration(t).map_err(|_| TokenParamsError::InvalidDuration { field, value: s.clone() })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    #[default]
    Default,
    Service,
    Batch,
}

impl std::str::FromStr for TokenType {
    type Err = TokenParamsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(TokenType::Default),
            "service" => Ok(TokenType::Service),
            "batch" => Ok(TokenType::Batch),
            other => Err(TokenParamsError::InvalidTokenType(other.to_string())),
        }
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> { s.serialize_u64(d.as_secs()) }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Stored token parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub token_policies: Vec<String>,
    #[serde(default, with = "duration_secs")]
    pub token_ttl: Duration,
    #[serde(default, with = "duration_secs")]
    pub token_max_ttl: Duration,
    #[serde(default, with = "duration_secs")]
    pub token_explicit_max_ttl: Duration,
    #[serde(default, with = "duration_secs")]
    pub token_period: Duration,
    #[serde(default)]
    pub token_num_uses: u64,
    #[serde(default)]
    pub token_bound_cidrs: Vec<String>,
    #[serde(default)]
    pub token_no_default_policy: bool,
    #[serde(default)]
    pub token_type: TokenType,
}

/// Partial token fields from an administrative write.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenFieldsInput {
    #[serde(default, alias = "policies")]
    pub token_policies: Option<StringList>,
    #[serde(default, alias = "ttl")]
    pub token_ttl: Option<DurationInput>,
    #[serde(default, alias = "max_ttl")]
    pub token_max_ttl: Option<DurationInput>,
    #[serde(default)]
    pub token_explicit_max_ttl: Option<DurationInput>,
    #[serde(default, alias = "period")]
    pub token_period: Option<DurationInput>,
    #[serde(default)]
    pub token_num_uses: Option<i64>,
    #[serde(default, alias = "bound_cidrs")]
    pub token_bound_cidrs: Option<StringList>,
    #[serde(default)]
    pub token_no_default_policy: Option<bool>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenParams {
    /// Apply `input` on top of the current values. On error `self` is left untouched.
    pub fn merge(&mut self, input: TokenFieldsInput) -> Result<(), TokenParamsError> {
        let mut next = self.clone();
        if let Some(p) = input.token_policies { next.token_policies = normalize_policies(p.into_vec()); }
        if let Some(d) = input.token_ttl { next.token_ttl = d.parse("token_ttl")?; }
        if let Some(d) = input.token_max_ttl { next.token_max_ttl = d.parse("token_max_ttl")?; }
        if let Some(d) = input.token_explicit_max_ttl { next.token_explicit_max_ttl = d.parse("token_explicit_max_ttl")?; }
        if let Some(d) = input.token_period { next.token_period = d.parse("token_period")?; }
        if let Some(n) = input.token_num_uses {
            if n < 0 { return Err(TokenParamsError::NegativeNumUses); }
            next.token_num_uses = n as u64;
        }
        if let Some(c) = input.token_bound_cidrs {
            let cidrs = c.into_vec();
            for cidr in &cidrs { validate_cidr(cidr)?; }
            next.token_bound_cidrs = cidrs;
        }
        if let Some(b) = input.token_no_default_policy { next.token_no_default_policy = b; }
        if let Some(t) = input.token_type { next.token_type = t.parse()?; }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TokenParamsError> {
        if !self.token_ttl.is_zero() && !self.token_max_ttl.is_zero() && self.token_ttl > self.token_max_ttl {
            return Err(TokenParamsError::TtlExceedsMaxTtl);
        }
        Ok(())
    }

    /// Token fields for a role read response, durations in seconds.
    pub fn populate_response(&self, data: &mut serde_json::Map<String, serde_json::Value>) {
        use serde_json::json;
        data.insert("token_policies".into(), json!(self.token_policies));
        data.insert("token_ttl".into(), json!(self.token_ttl.as_secs()));
        data.insert("token_max_ttl".into(), json!(self.token_max_ttl.as_secs()));
        data.insert("token_explicit_max_ttl".into(), json!(self.token_explicit_max_ttl.as_secs()));
        data.insert("token_period".into(), json!(self.token_period.as_secs()));
        data.insert("token_num_uses".into(), json!(self.token_num_uses));
        data.insert("token_bound_cidrs".into(), json!(self.token_bound_cidrs));
        data.insert("token_no_default_policy".into(), json!(self.token_no_default_policy));
        data.insert("token_type".into(), json!(self.token_type));
    }
}

/// Lowercase, dedupe, sort.
pub fn normalize_policies(policies: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = policies.into_iter().map(|p| p.to_lowercase()).collect();
    out.sort();
    out.dedup();
    out
}

fn validate_cidr(cidr: &str) -> Result<(), TokenParamsError> {
    let bad = || TokenParamsError::InvalidCidr(cidr.to_string());
    let (addr, prefix) = match cidr.split_once('/') {
        Some((a, p)) => (a, Some(p)),
        None => (cidr, None),
    };
    let ip: IpAddr = addr.parse().map_err(|_| bad())?;
    if let Some(p) = prefix {
        let bits: u8 = p.parse().map_err(|_| bad())?;
        let max = if ip.is_ipv4() { 32 } else { 128 };
        if bits > max { return Err(bad()); }
    }
    Ok(())
}
