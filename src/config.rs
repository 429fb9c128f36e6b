//! Service settings.
//!
//! Sources, later ones overriding earlier:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables prefixed `WARD_`, nested with `__`
//!    (e.g. `WARD_WEB__API_HOST=0.0.0.0:8080`)

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::ServeError;

const DEFAULTS: &str = r#"
[web]
api_host = "0.0.0.0:3000"
debug_host = "0.0.0.0:4000"
read_timeout_secs = 5
write_timeout_secs = 10
idle_timeout_secs = 120
shutdown_timeout_secs = 20
max_body_bytes = 1048576

[auth]
keys_folder = "keys/"
issuer = "ward"
leeway_secs = 60
"#;

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub web: WebSettings,
    pub auth: AuthSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebSettings {
    pub api_host: String,
    /// Listener for `/debug/*` and the health probes; keep it off the public network.
    pub debug_host: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub max_body_bytes: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthSettings {
    pub keys_folder: String,
    pub issuer: String,
    pub leeway_secs: u64,
}

impl WebSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Settings {
    /// Loads defaults, then `file` if given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ServeError> {
        let mut builder = Config::builder().add_source(File::from_str(DEFAULTS, FileFormat::Toml));
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings = builder
            .add_source(Environment::with_prefix("WARD").prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_file() {
        let s = Settings::load(None).unwrap();
        assert_eq!(s.auth.issuer, "ward");
        assert_eq!(s.web.shutdown_timeout(), Duration::from_secs(20));
        assert_eq!(s.web.read_timeout(), Duration::from_secs(5));
        assert_eq!(s.web.write_timeout(), Duration::from_secs(10));
        assert_eq!(s.web.idle_timeout(), Duration::from_secs(120));
        assert_eq!(s.web.debug_host, "0.0.0.0:4000");
    }
}
