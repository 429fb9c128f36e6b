#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};
use serde_json::Value;
use ward::auth::{Auth, KeyStore, Signer};
use ward::metrics::Counters;
use ward::shutdown::{self, Listener};
use ward::{Claims, Request, Response, Router, middleware};

pub const ISSUER: &str = "ward tests";

pub fn keys() -> KeyStore {
    KeyStore::from_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/keys"))
        .expect("fixture keys must load")
}

pub fn auth() -> Auth {
    Auth::new(keys()).issuer(ISSUER).leeway(0)
}

pub fn signer(kid: &str) -> Signer {
    let pem: &[u8] = match kid {
        "primary" => include_bytes!("../fixtures/signing/primary.pem"),
        "rotated" => include_bytes!("../fixtures/signing/rotated.pem"),
        other => panic!("no signing fixture for {other}"),
    };
    Signer::from_rsa_pem(kid, pem).expect("fixture private key must parse")
}

/// Claims valid for the next hour.
pub fn claims(subject: &str, roles: &[&str]) -> Claims {
    let now = Utc::now();
    Claims::new(subject, roles.iter().copied(), ISSUER, now, now + Duration::hours(1))
}

pub fn token(claims: &Claims) -> String {
    signer("primary").sign(claims).expect("token must sign")
}

pub fn get(path: &str, authorization: Option<&str>) -> Request {
    let mut builder = http::Request::get(path);
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Bytes::new()).expect("request must build").into()
}

pub fn json(res: &Response) -> Value {
    serde_json::from_slice(res.body()).expect("body must be JSON")
}

/// A router with the standard stack, plus its counters and shutdown listener.
pub fn router() -> (Router, Arc<Counters>, Listener) {
    let (tx, rx) = shutdown::channel();
    let counters = Arc::new(Counters::new());
    (Router::new(tx, middleware::standard(counters.clone())), counters, rx)
}
