use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable that overrides `pve.token_secret`.
pub const TOKEN_SECRET_ENV: &str = "PVECACHE_TOKEN_SECRET";

/// Top-level pvecache configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PvecacheConfig {
    /// Address the HTTP surface binds to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    pub pve: PveSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Proxmox VE API endpoint and token credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct PveSettings {
    /// API base, e.g. "https://pve.example.net:8006/api2/json".
    pub url: String,
    pub user: String,
    #[serde(default = "default_realm")]
    pub realm: String,
    pub token_id: String,
    #[serde(default)]
    pub token_secret: String,
    /// Accept self-signed certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Per-request deadline (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Rebuild scheduling and upstream call policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Period between full syncs (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Max instances fetched concurrently during one node rebuild.
    #[serde(default = "default_instance_concurrency")]
    pub instance_concurrency: usize,
    /// Total attempts per source call, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            instance_concurrency: default_instance_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
fn default_realm() -> String {
    "pam".to_string()
}
fn default_request_timeout() -> u64 {
    15
}
fn default_interval() -> u64 {
    60
}
fn default_instance_concurrency() -> usize {
    4
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay() -> u64 {
    200
}

impl PvecacheConfig {
    /// Load config from a TOML file, applying the token secret override
    /// from the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = Self::parse_unvalidated(&content)?
            .with_token_secret_override(std::env::var(TOKEN_SECRET_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        let config = Self::parse_unvalidated(s)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_unvalidated(s: &str) -> Result<Self> {
        toml::from_str(s).with_context(|| "Failed to parse pvecache config TOML")
    }

    /// Replace the token secret when an override is present and non-empty.
    pub fn with_token_secret_override(mut self, secret: Option<String>) -> Self {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.pve.token_secret = secret;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        let pve = &self.pve;
        if !(pve.url.starts_with("https://") || pve.url.starts_with("http://")) {
            anyhow::bail!("pve.url must start with http:// or https://, got '{}'", pve.url);
        }
        for (field, value) in [
            ("pve.user", &pve.user),
            ("pve.realm", &pve.realm),
            ("pve.token_id", &pve.token_id),
            ("pve.token_secret", &pve.token_secret),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", field);
            }
        }
        if self.sync.interval_secs == 0 {
            anyhow::bail!("sync.interval_secs must be greater than zero");
        }
        if self.sync.instance_concurrency == 0 {
            anyhow::bail!("sync.instance_concurrency must be at least 1");
        }
        if self.sync.retry_attempts == 0 {
            anyhow::bail!("sync.retry_attempts must be at least 1");
        }
        Ok(())
    }
}

impl PveSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[pve]
url = "https://pve.example.net:8006/api2/json"
user = "root"
token_id = "cache"
token_secret = "00000000-0000-0000-0000-000000000000"
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = PvecacheConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.pve.realm, "pam");
        assert!(!config.pve.accept_invalid_certs);
        assert_eq!(config.pve.request_timeout_secs, 15);
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.sync.instance_concurrency, 4);
        assert_eq!(config.sync.retry_attempts, 3);
        assert_eq!(config.sync.retry_base_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
listen = "127.0.0.1:9090"

[pve]
url = "https://10.0.0.2:8006/api2/json"
user = "cache"
realm = "pve"
token_id = "ro"
token_secret = "s3cret"
accept_invalid_certs = true
request_timeout_secs = 5

[sync]
interval_secs = 30
instance_concurrency = 8
retry_attempts = 1
retry_base_delay_ms = 50
"#;
        let config = PvecacheConfig::parse(toml).unwrap();
        assert_eq!(config.listen.port(), 9090);
        assert_eq!(config.pve.realm, "pve");
        assert!(config.pve.accept_invalid_certs);
        assert_eq!(config.pve.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync.interval(), Duration::from_secs(30));
        assert_eq!(config.sync.instance_concurrency, 8);
    }

    #[test]
    fn test_reject_bad_url() {
        let toml = MINIMAL.replace("https://pve.example.net", "pve.example.net");
        let err = format!("{}", PvecacheConfig::parse(&toml).unwrap_err());
        assert!(err.contains("pve.url"));
    }

    #[test]
    fn test_reject_empty_secret() {
        let toml = MINIMAL.replace("00000000-0000-0000-0000-000000000000", "");
        let err = format!("{}", PvecacheConfig::parse(&toml).unwrap_err());
        assert!(err.contains("pve.token_secret"));
    }

    #[test]
    fn test_reject_zero_concurrency() {
        let toml = format!("{MINIMAL}\n[sync]\ninstance_concurrency = 0\n");
        let err = format!("{}", PvecacheConfig::parse(&toml).unwrap_err());
        assert!(err.contains("instance_concurrency"));
    }

    #[test]
    fn test_secret_override() {
        let config = PvecacheConfig::parse(MINIMAL).unwrap();
        let config = config.with_token_secret_override(Some("from-env".to_string()));
        assert_eq!(config.pve.token_secret, "from-env");
        let config = config.with_token_secret_override(Some(String::new()));
        assert_eq!(config.pve.token_secret, "from-env");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = PvecacheConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pve.user, "root");
    }

    #[test]
    fn test_from_missing_file() {
        let err = PvecacheConfig::from_file(Path::new("/nonexistent/pvecache.toml")).unwrap_err();
        assert!(format!("{err}").contains("Failed to read config"));
    }
}
