use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Default period of the refresh fallback.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(30_000);

/// Client-side knobs of the chat and notification managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub refresh_interval: Duration,
    /// Start the periodic refresh fallback when a manager opens.
    pub periodic_refresh: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            periodic_refresh: true,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("COHORT_REFRESH_INTERVAL_MS") {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("COHORT_REFRESH_INTERVAL_MS is not a number: {raw}"))?;
            if ms == 0 {
                bail!("COHORT_REFRESH_INTERVAL_MS must be positive");
            }
            config.refresh_interval = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("COHORT_PERIODIC_REFRESH") {
            config.periodic_refresh = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => bail!("COHORT_PERIODIC_REFRESH is not a boolean: {other}"),
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_thirty_seconds_enabled() {
        let config = SyncConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.refresh_interval, Duration::from_millis(30_000));
        assert!(config.periodic_refresh);
    }

    #[test]
    fn reads_overrides() {
        let config = SyncConfig::from_lookup(|name| match name {
            "COHORT_REFRESH_INTERVAL_MS" => Some("5000".into()),
            "COHORT_PERIODIC_REFRESH" => Some("off".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert!(!config.periodic_refresh);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(SyncConfig::from_lookup(|n| (n == "COHORT_REFRESH_INTERVAL_MS").then(|| "0".into())).is_err());
        assert!(SyncConfig::from_lookup(|n| (n == "COHORT_PERIODIC_REFRESH").then(|| "maybe".into())).is_err());
    }
}
