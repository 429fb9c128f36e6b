//! Signing-key material.
//!
//! The verify path only ever sees public keys, resolved by key id through
//! [`KeyLookup`]. Minting tokens is a separate concern ([`Signer`]) used by
//! tooling and tests; the verifier never holds a private key.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use tracing::info;

use super::Claims;
use crate::error::ServeError;

/// Failure to resolve a verification key.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("no public key for kid `{0}`")]
    NotFound(String),
}

/// Supplies verification keys by their rotating identifier.
pub trait KeyLookup: Send + Sync + 'static {
    fn public_key(&self, kid: &str) -> Result<DecodingKey, KeyError>;
}

/// In-memory map of key id to RSA public key.
#[derive(Default)]
pub struct KeyStore {
    keys: HashMap<String, DecodingKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a PEM-encoded RSA public key under `kid`, replacing any previous one.
    pub fn insert_rsa_pem(&mut self, kid: impl Into<String>, pem: &[u8]) -> Result<(), ServeError> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|source| ServeError::Key { kid: kid.clone(), source })?;
        self.keys.insert(kid, key);
        Ok(())
    }

    /// Loads every `<kid>.pem` file in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ServeError> {
        let mut store = Self::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pem") {
                continue;
            }
            let Some(kid) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let pem = fs::read(&path)?;
            store.insert_rsa_pem(kid, &pem)?;
            info!(kid, "loaded public key");
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyLookup for KeyStore {
    fn public_key(&self, kid: &str) -> Result<DecodingKey, KeyError> {
        self.keys.get(kid).cloned().ok_or_else(|| KeyError::NotFound(kid.to_owned()))
    }
}

/// Mints RS256 tokens with one private key.
pub struct Signer {
    kid: String,
    key: EncodingKey,
}

impl Signer {
    pub fn from_rsa_pem(kid: impl Into<String>, pem: &[u8]) -> Result<Self, ServeError> {
        let kid = kid.into();
        let key = EncodingKey::from_rsa_pem(pem)
            .map_err(|source| ServeError::Key { kid: kid.clone(), source })?;
        Ok(Self { kid, key })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signs `claims`, stamping this signer's key id into the token header.
    pub fn sign(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.key)
    }
}
