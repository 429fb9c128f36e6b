use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role granting administrative access.
pub const ROLE_ADMIN: &str = "ADMIN";
/// Role of an ordinary authenticated user.
pub const ROLE_USER: &str = "USER";

/// Verified identity extracted from a signed token.
///
/// Immutable once built. Serialized with the registered JWT names
/// (`sub`, `iss`, `iat`, `exp`) plus a `roles` array.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    subject: String,
    #[serde(default)]
    roles: BTreeSet<String>,
    #[serde(rename = "iss")]
    issuer: String,
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    issued_at: DateTime<Utc>,
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    expires_at: DateTime<Utc>,
}

impl Claims {
    pub fn new<I, R>(
        subject: impl Into<String>,
        roles: I,
        issuer: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            issuer: issuer.into(),
            issued_at,
            expires_at,
        }
    }

    pub fn subject(&self) -> &str { &self.subject }
    pub fn roles(&self) -> &BTreeSet<String> { &self.roles }
    pub fn issuer(&self) -> &str { &self.issuer }
    pub fn issued_at(&self) -> DateTime<Utc> { self.issued_at }
    pub fn expires_at(&self) -> DateTime<Utc> { self.expires_at }

    /// Exact, case-sensitive role check.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
