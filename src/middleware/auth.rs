use std::sync::Arc;

use super::Middleware;
use crate::auth::{Auth, Rule};
use crate::error::Error;
use crate::handler::{BoxedHandler, handler_fn};

/// Verifies the `Authorization` header and attaches the claims to the context.
pub struct Authenticate {
    auth: Auth,
}

impl Authenticate {
    pub fn new(auth: Auth) -> Self {
        Self { auth }
    }
}

impl Middleware for Authenticate {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let auth = self.auth.clone();
        handler_fn(move |cx, req| {
            let next = Arc::clone(&next);
            let auth = auth.clone();
            Box::pin(async move {
                let header = req.header("authorization").unwrap_or_default();
                let claims = auth
                    .authenticate(header)
                    .map_err(|e| Error::auth(format!("authenticate: failed: {e}")))?;

                next.call(cx.with_claims(claims), req).await
            })
        })
    }
}

/// Checks the claims left by [`Authenticate`] against a rule.
///
/// Must be listed after `Authenticate` in the route's middleware; without
/// claims every request is rejected.
pub struct Authorize {
    auth: Auth,
    rule: Rule,
}

impl Authorize {
    pub fn new(auth: Auth, rule: Rule) -> Self {
        Self { auth, rule }
    }
}

impl Middleware for Authorize {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let auth = self.auth.clone();
        let rule = self.rule;
        handler_fn(move |cx, req| {
            let next = Arc::clone(&next);
            let auth = auth.clone();
            Box::pin(async move {
                {
                    let Some(claims) = cx.claims() else {
                        return Err(Error::auth("authorize: you are not authorized for that action, no claims"));
                    };
                    auth.authorize(claims, None, rule)
                        .map_err(|e| Error::auth(format!("authorize: rule[{rule}]: {e}")))?;
                }

                next.call(cx, req).await
            })
        })
    }
}
