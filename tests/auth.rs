mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;
use ward::auth::{Auth, KeyStore, ROLE_ADMIN, ROLE_USER, Rule, Signer};
use ward::middleware::{Authenticate, Authorize, Layer};
use ward::{Claims, Context, Error, Request, Response};

use common::{ISSUER, auth, claims, get, json, router, signer, token};

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn admin_route() -> Vec<Layer> {
    vec![
        Arc::new(Authenticate::new(auth())),
        Arc::new(Authorize::new(auth(), Rule::AdminOnly)),
    ]
}

async fn whoami(cx: Context, _req: Request) -> Result<Response, Error> {
    let subject = cx.claims().map(Claims::subject);
    Response::json(StatusCode::OK, &json!({"subject": subject}))
}

#[test]
fn valid_token_yields_its_claims() {
    let issued = claims("3b2a47f6-8d5d-4f0c-9a1e-6f6f1f4d2c11", &[ROLE_ADMIN]);

    let got = auth().authenticate(&bearer(&token(&issued))).unwrap();

    assert_eq!(got.subject(), issued.subject());
    assert_eq!(got.issuer(), ISSUER);
    assert!(got.has_role(ROLE_ADMIN));
    assert!(!got.has_role(ROLE_USER));
}

#[test]
fn expired_token_is_rejected() {
    let now = Utc::now();
    let stale = Claims::new("u1", [ROLE_USER], ISSUER, now - Duration::hours(2), now - Duration::hours(1));

    let err = auth().authenticate(&bearer(&token(&stale))).unwrap_err();

    assert_eq!(err.message(), "token expired");
}

#[test]
fn token_issued_in_the_future_is_rejected() {
    let now = Utc::now();
    let early = Claims::new("u1", [ROLE_USER], ISSUER, now + Duration::hours(1), now + Duration::hours(2));

    assert!(auth().authenticate(&bearer(&token(&early))).is_err());
}

#[test]
fn foreign_issuer_is_rejected() {
    let now = Utc::now();
    let foreign = Claims::new("u1", [ROLE_ADMIN], "elsewhere", now, now + Duration::hours(1));

    let err = auth().authenticate(&bearer(&token(&foreign))).unwrap_err();

    assert_eq!(err.message(), "unexpected issuer");
}

#[test]
fn swapped_payload_fails_signature_check() {
    let user = token(&claims("u1", &[ROLE_USER]));
    let admin = token(&claims("u1", &[ROLE_ADMIN]));

    // Admin payload under the user token's signature.
    let user_parts: Vec<&str> = user.split('.').collect();
    let admin_parts: Vec<&str> = admin.split('.').collect();
    let forged = format!("{}.{}.{}", user_parts[0], admin_parts[1], user_parts[2]);

    let err = auth().authenticate(&bearer(&forged)).unwrap_err();

    assert_eq!(err.message(), "signature verification failed");
}

#[test]
fn key_mismatch_for_kid_is_rejected() {
    let rotated_pem = include_bytes!("fixtures/signing/rotated.pem");
    let impostor = Signer::from_rsa_pem("primary", rotated_pem).unwrap();
    let forged = impostor.sign(&claims("u1", &[ROLE_ADMIN])).unwrap();

    let err = auth().authenticate(&bearer(&forged)).unwrap_err();

    assert_eq!(err.message(), "signature verification failed");
}

#[test]
fn unknown_kid_is_rejected() {
    let mut keys = KeyStore::new();
    keys.insert_rsa_pem("primary", include_bytes!("fixtures/keys/primary.pem")).unwrap();
    let verifier = Auth::new(keys).issuer(ISSUER);

    let from_rotated = signer("rotated").sign(&claims("u1", &[ROLE_USER])).unwrap();

    let err = verifier.authenticate(&bearer(&from_rotated)).unwrap_err();

    assert_eq!(err.message(), "unknown signing key");
}

#[test]
fn both_keys_verify_during_rotation() {
    let verifier = auth();
    for kid in ["primary", "rotated"] {
        let token = signer(kid).sign(&claims("u1", &[ROLE_USER])).unwrap();
        assert!(verifier.authenticate(&bearer(&token)).is_ok(), "kid {kid}");
    }
}

#[test]
fn header_without_bearer_scheme_is_rejected() {
    let raw = token(&claims("u1", &[ROLE_USER]));
    let verifier = auth();

    assert!(verifier.authenticate(&raw).is_err());
    assert!(verifier.authenticate(&format!("Basic {raw}")).is_err());
    assert!(verifier.authenticate("Bearer ").is_err());
    assert!(verifier.authenticate("").is_err());
}

#[test]
fn rules_follow_roles() {
    let verifier = auth();
    let admin = claims("a", &[ROLE_ADMIN]);
    let user = claims("u", &[ROLE_USER]);
    let nobody = claims("n", &[]);

    assert!(verifier.authorize(&admin, None, Rule::AdminOnly).is_ok());
    assert!(verifier.authorize(&user, None, Rule::AdminOnly).is_err());
    assert!(verifier.authorize(&user, None, Rule::UserOnly).is_ok());
    assert!(verifier.authorize(&admin, None, Rule::Any).is_ok());
    assert!(verifier.authorize(&nobody, None, Rule::Any).is_err());
}

#[test]
fn role_names_are_case_sensitive() {
    let lower = claims("a", &["admin"]);
    assert!(auth().authorize(&lower, None, Rule::AdminOnly).is_err());
}

#[test]
fn owner_passes_without_admin_role() {
    let verifier = auth();
    let id = Uuid::new_v4();
    let owner = claims(&id.to_string(), &[ROLE_USER]);
    let stranger = claims(&Uuid::new_v4().to_string(), &[ROLE_USER]);
    let admin = claims(&Uuid::new_v4().to_string(), &[ROLE_ADMIN]);

    assert!(verifier.authorize_owner(&owner, id).is_ok());
    assert!(verifier.authorize_owner(&stranger, id).is_err());
    assert!(verifier.authorize_owner(&admin, id).is_ok());
}

#[tokio::test]
async fn expired_token_on_admin_route_is_a_plain_401() {
    let (app, _counters, _rx) = router();
    let app = app.on_with(Method::GET, "/test/auth", whoami, &admin_route()).unwrap();

    let now = Utc::now();
    let stale = Claims::new("u1", [ROLE_ADMIN], ISSUER, now - Duration::hours(2), now - Duration::hours(1));
    let header = bearer(&token(&stale));

    let res = app.dispatch(get("/test/auth", Some(&header))).await;

    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(std::str::from_utf8(res.body()).unwrap(), r#"{"error":"Unauthorized"}"#);
}

#[tokio::test]
async fn missing_header_on_admin_route_is_401() {
    let (app, _counters, _rx) = router();
    let app = app.on_with(Method::GET, "/test/auth", whoami, &admin_route()).unwrap();

    let res = app.dispatch(get("/test/auth", None)).await;

    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_role_on_admin_route_is_401() {
    let (app, _counters, _rx) = router();
    let app = app.on_with(Method::GET, "/test/auth", whoami, &admin_route()).unwrap();
    let header = bearer(&token(&claims("u1", &[ROLE_USER])));

    let res = app.dispatch(get("/test/auth", Some(&header))).await;

    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(&res), json!({"error": "Unauthorized"}));
}

#[tokio::test]
async fn admin_reaches_handler_with_claims() {
    let (app, counters, _rx) = router();
    let app = app.on_with(Method::GET, "/test/auth", whoami, &admin_route()).unwrap();
    let header = bearer(&token(&claims("root", &[ROLE_ADMIN])));

    let res = app.dispatch(get("/test/auth", Some(&header))).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json(&res), json!({"subject": "root"}));
    assert_eq!(counters.errors(), 0);
}

#[tokio::test]
async fn authorize_without_authenticate_is_401() {
    let (app, _counters, _rx) = router();
    let only_authorize: Vec<Layer> = vec![Arc::new(Authorize::new(auth(), Rule::Any))];
    let app = app.on_with(Method::GET, "/x", whoami, &only_authorize).unwrap();

    let res = app.dispatch(get("/x", None)).await;

    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
}
