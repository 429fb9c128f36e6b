//! Bearer-token authentication and role-based authorization.
//!
//! The flow for one request is a two-step state machine with no retries:
//!
//! ```text
//! Authorization header ──authenticate──▶ Claims ──authorize(rule)──▶ allowed
//!            │                              │
//!            └──────────── AuthError ◀──────┘   (terminal for the request)
//! ```
//!
//! Both steps are pure computations over in-memory keys: no network calls,
//! nothing that blocks.

mod claims;
mod keys;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use tracing::debug;
use uuid::Uuid;

pub use claims::{Claims, ROLE_ADMIN, ROLE_USER};
pub use keys::{KeyError, KeyLookup, KeyStore, Signer};

const BEARER: &str = "Bearer ";
const MAX_LEEWAY_SECS: u64 = 86_400;

/// Authentication or authorization failure.
///
/// The message describes what failed for the server log. It never embeds the
/// underlying verification error, and clients only ever see `Unauthorized`.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// ── Rules ─────────────────────────────────────────────────────────────────────

/// A named, deterministic authorization policy.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Rule {
    /// Holds at least one known role.
    Any,
    AdminOnly,
    UserOnly,
    /// Owns the resource, or is an admin.
    AdminOrSubject,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any            => "any",
            Self::AdminOnly      => "admin-only",
            Self::UserOnly       => "user-only",
            Self::AdminOrSubject => "admin-or-subject",
        }
    }

    /// Evaluates the rule. `owner` is the resource owner, if the route has one.
    pub fn allows(self, claims: &Claims, owner: Option<Uuid>) -> bool {
        match self {
            Self::Any => claims.has_role(ROLE_ADMIN) || claims.has_role(ROLE_USER),
            Self::AdminOnly => claims.has_role(ROLE_ADMIN),
            Self::UserOnly => claims.has_role(ROLE_USER),
            Self::AdminOrSubject => is_owner(claims, owner) || Self::AdminOnly.allows(claims, None),
        }
    }
}

impl FromStr for Rule {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any"              => Ok(Self::Any),
            "admin-only"       => Ok(Self::AdminOnly),
            "user-only"        => Ok(Self::UserOnly),
            "admin-or-subject" => Ok(Self::AdminOrSubject),
            _                  => Err(AuthError::new(format!("unknown rule `{s}`"))),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_owner(claims: &Claims, owner: Option<Uuid>) -> bool {
    owner.is_some_and(|id| claims.subject() == id.to_string())
}

// ── Auth ──────────────────────────────────────────────────────────────────────

/// Verifies bearer tokens and evaluates rules against the resulting claims.
///
/// Cheap to clone; share one instance across every route.
#[derive(Clone)]
pub struct Auth {
    keys: Arc<dyn KeyLookup>,
    issuer: Option<String>,
    leeway_secs: u64,
}

impl Auth {
    pub fn new(keys: impl KeyLookup) -> Self {
        Self { keys: Arc::new(keys), issuer: None, leeway_secs: 60 }
    }

    /// Rejects tokens whose `iss` differs from `issuer`.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Clock skew tolerated on `exp` and `iat`.
    pub fn leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// Turns an `Authorization` header value into verified claims.
    ///
    /// The signing key is looked up by the `kid` in the token header, so keys
    /// can rotate without restarting the verifier.
    pub fn authenticate(&self, header: &str) -> Result<Claims, AuthError> {
        let token = header
            .strip_prefix(BEARER)
            .filter(|t| !t.is_empty() && !t.contains(' '))
            .ok_or_else(|| AuthError::new("expected authorization header format: Bearer <token>"))?;

        let head = decode_header(token).map_err(|_| AuthError::new("malformed token header"))?;
        if head.alg != Algorithm::RS256 {
            return Err(AuthError::new(format!("unsupported signing algorithm {:?}", head.alg)));
        }
        let kid = head.kid.ok_or_else(|| AuthError::new("token header missing kid"))?;
        let key = self.keys.public_key(&kid).map_err(|e| {
            debug!(kid = %kid, error = %e, "key lookup failed");
            AuthError::new("unknown signing key")
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        if let Some(iss) = &self.issuer {
            validation.set_issuer(std::slice::from_ref(iss));
        }

        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|e| {
                debug!(kid = %kid, kind = ?e.kind(), "token rejected");
                AuthError::new(describe(e.kind()))
            })?
            .claims;

        let skew = Duration::seconds(i64::try_from(self.leeway_secs.min(MAX_LEEWAY_SECS)).unwrap_or(0));
        if claims.issued_at() > Utc::now() + skew {
            return Err(AuthError::new("token issued in the future"));
        }

        Ok(claims)
    }

    /// Evaluates `rule` for `claims`. `owner` is the resource owner, if any.
    pub fn authorize(&self, claims: &Claims, owner: Option<Uuid>, rule: Rule) -> Result<(), AuthError> {
        if rule.allows(claims, owner) {
            return Ok(());
        }
        Err(AuthError::new(format!(
            "not authorized: roles {:?} fail rule {rule}",
            claims.roles()
        )))
    }

    /// Owner-or-admin check used by resource handlers.
    ///
    /// The identity comparison runs first; the rule is only evaluated when
    /// the caller does not own the resource.
    pub fn authorize_owner(&self, claims: &Claims, owner: Uuid) -> Result<(), AuthError> {
        if is_owner(claims, Some(owner)) {
            return Ok(());
        }
        self.authorize(claims, Some(owner), Rule::AdminOnly)
    }
}

fn describe(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ExpiredSignature => "token expired",
        ErrorKind::InvalidSignature => "signature verification failed",
        ErrorKind::InvalidIssuer => "unexpected issuer",
        ErrorKind::ImmatureSignature => "token not yet valid",
        ErrorKind::MissingRequiredClaim(_) => "token missing required claim",
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            "malformed token"
        }
        _ => "token validation failed",
    }
}
