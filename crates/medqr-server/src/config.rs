use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub tokens: TokenSettings,
    #[serde(default)]
    pub sessions: SessionSettings,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if !self.security.secret_key.is_empty() && self.security.secret_key.len() < 16 {
            return Err("security.secret_key must be at least 16 characters".into());
        }
        if self.tokens.ephemeral_ttl.is_zero() {
            return Err("tokens.ephemeral_ttl must be > 0".into());
        }
        if self.sessions.active_ttl.is_zero() {
            return Err("sessions.active_ttl must be > 0".into());
        }
        if self.cleanup.interval.is_zero() {
            return Err("cleanup.interval must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Base URL used when rendering scan links. Defaults to host:port.
    pub fn base_url(&self) -> String {
        self.server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL for scan links. If not set, computed from host:port.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// HMAC signing key. When empty, a random key is generated at startup
    /// and every previously issued token becomes invalid. Prefer the
    /// MEDQR_SECRET_KEY environment variable over the config file.
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    #[serde(default = "default_ephemeral_ttl", with = "humantime_serde")]
    pub ephemeral_ttl: Duration,
    #[serde(default = "default_permanent_ttl", with = "humantime_serde")]
    pub permanent_ttl: Duration,
}

fn default_ephemeral_ttl() -> Duration {
    Duration::from_secs(60)
}
fn default_permanent_ttl() -> Duration {
    Duration::from_secs(86_400 * 365)
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            ephemeral_ttl: default_ephemeral_ttl(),
            permanent_ttl: default_permanent_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_active_ttl", with = "humantime_serde")]
    pub active_ttl: Duration,
    #[serde(default = "default_retain_ttl", with = "humantime_serde")]
    pub retain_ttl: Duration,
}

fn default_active_ttl() -> Duration {
    Duration::from_secs(300)
}
fn default_retain_ttl() -> Duration {
    Duration::from_secs(60)
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            active_ttl: default_active_ttl(),
            retain_ttl: default_retain_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// How often the background sweep evicts expired tokens and sessions.
    #[serde(default = "default_cleanup_interval", with = "humantime_serde")]
    pub interval: Duration,
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use std::path::PathBuf;

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file is absent. MEDQR_SECRET_KEY overrides the file's signing
    /// key so the secret can stay out of checked-in config.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let candidate = PathBuf::from(path.unwrap_or("medqr.toml"));
        let mut cfg: AppConfig = if candidate.exists() {
            let text = std::fs::read_to_string(&candidate)
                .map_err(|e| format!("config read error ({}): {e}", candidate.display()))?;
            toml::from_str(&text)
                .map_err(|e| format!("config parse error ({}): {e}", candidate.display()))?
        } else {
            AppConfig::default()
        };

        if let Ok(secret) = std::env::var("MEDQR_SECRET_KEY")
            && !secret.is_empty()
        {
            cfg.security.secret_key = secret;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tokens.ephemeral_ttl, Duration::from_secs(60));
        assert_eq!(cfg.sessions.active_ttl, Duration::from_secs(300));
        assert_eq!(cfg.sessions.retain_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9090
            base_url = "https://qr.hospital.example"

            [tokens]
            ephemeral_ttl = "30s"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.base_url(), "https://qr.hospital.example");
        assert_eq!(cfg.tokens.ephemeral_ttl, Duration::from_secs(30));
        // Untouched sections keep their defaults
        assert_eq!(cfg.sessions.active_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medqr.toml");
        std::fs::write(
            &path,
            "[server]\nport = 7070\n\n[sessions]\nactive_ttl = \"2m\"\n",
        )
        .unwrap();

        let cfg = loader::load_config(path.to_str()).unwrap();
        assert_eq!(cfg.server.port, 7070);
        assert_eq!(cfg.sessions.active_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = loader::load_config(Some("/nonexistent/medqr.toml")).unwrap();
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut cfg = AppConfig::default();
        cfg.security.secret_key = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());
    }
}
