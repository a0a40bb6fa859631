use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Secrets that ship in sample `.env` files and must never reach a deployment.
const PLACEHOLDER_SECRETS: &[&str] = &["", "dev-secret-change-me", "changeme", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub service_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup. Tests pass a map instead of the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("COHORT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("COHORT_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("COHORT_PORT is not a port number: {raw}"))?,
            None => 3000,
        };
        let db_path = PathBuf::from(lookup("COHORT_DB_PATH").unwrap_or_else(|| "cohort.db".into()));

        let jwt_secret = lookup("COHORT_JWT_SECRET").unwrap_or_default();
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("COHORT_JWT_SECRET must be set to a real secret");
        }
        let service_key = lookup("COHORT_SERVICE_KEY").unwrap_or_default();
        if PLACEHOLDER_SECRETS.contains(&service_key.as_str()) {
            bail!("COHORT_SERVICE_KEY must be set to a real key");
        }

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            service_key,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_fill_in_everything_but_secrets() {
        let config = Config::from_lookup(lookup(&[
            ("COHORT_JWT_SECRET", "a-long-random-value"),
            ("COHORT_SERVICE_KEY", "svc-123"),
        ]))
        .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("cohort.db"));
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("COHORT_JWT_SECRET", "dev-secret-change-me"),
            ("COHORT_SERVICE_KEY", "svc-123"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("COHORT_JWT_SECRET"));

        assert!(Config::from_lookup(lookup(&[("COHORT_JWT_SECRET", "real")])).is_err());
    }

    #[test]
    fn bad_port_is_an_error() {
        let result = Config::from_lookup(lookup(&[
            ("COHORT_JWT_SECRET", "real"),
            ("COHORT_SERVICE_KEY", "svc"),
            ("COHORT_PORT", "eighty"),
        ]));
        assert!(result.is_err());
    }
}
