use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DiskmonError, Result};

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Lower-case a level name and fold the common aliases onto `log` level names
fn normalize_level(level: &str) -> String {
    let level = level.trim().to_lowercase();
    match level.as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "notset" => "trace".to_string(),
        _ => level,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    /// Pretty-print tool payloads and log at debug level
    pub debug: bool,
    pub log: LogConfig,
    pub server: ServerConfig,
    pub executor: ExecutorConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,
    /// Log to stderr instead of a file
    pub stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("diskmon")
                .join("logs"),
            stderr: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub keepalive_secs: u64,
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6666,
            keepalive_secs: 15,
            name: "DiskHealthChecker".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub smartctl_path: String,
    pub lsblk_path: String,
    /// Prefix commands with `sudo -n`
    pub use_sudo: bool,
    pub timeout_ms: u64,
    pub workers: usize,
    /// Run commands over ssh on another host
    pub remote: Option<RemoteConfig>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            smartctl_path: "smartctl".to_string(),
            lsblk_path: "lsblk".to_string(),
            use_sudo: false,
            timeout_ms: 3000,
            workers: 4,
            remote: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            host: String::new(),
            port: 22,
            connect_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    pub connect_timeout_ms: u64,
    /// No limit when unset
    pub request_timeout_ms: Option<u64>,
    pub reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6666/sse".to_string(),
            connect_timeout_ms: 5000,
            request_timeout_ms: None,
            reconnect_attempts: 1,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            debug: false,
            log: LogConfig::default(),
            server: ServerConfig::default(),
            executor: ExecutorConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| DiskmonError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| DiskmonError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        log::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides, reading variables through `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MCP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MCP_PORT") {
            self.server.port = parse_env("MCP_PORT", &port)?;
        }
        if let Some(debug) = lookup("MCP_DEBUG") {
            self.debug = parse_bool(&debug);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = Some(normalize_level(&level));
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.log.dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("COMMAND_TIMEOUT") {
            let secs: f64 = parse_env("COMMAND_TIMEOUT", &secs)?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(DiskmonError::Config(format!("COMMAND_TIMEOUT must be positive, got {}", secs)));
            }
            self.executor.timeout_ms = (secs * 1000.0).round() as u64;
        }
        if let Some(workers) = lookup("MAX_WORKERS") {
            self.executor.workers = parse_env("MAX_WORKERS", &workers)?;
        }
        if let Some(path) = lookup("SMARTCTL_PATH") {
            self.executor.smartctl_path = path;
        }
        if let Some(path) = lookup("LSBLK_PATH") {
            self.executor.lsblk_path = path;
        }
        if let Some(sudo) = lookup("USE_SUDO") {
            self.executor.use_sudo = parse_bool(&sudo);
        }

        if let Some(host) = lookup("SSH_HOST").filter(|h| !h.is_empty()) {
            let remote = self.executor.remote.get_or_insert_with(RemoteConfig::default);
            remote.host = host;
        }
        if let Some(remote) = self.executor.remote.as_mut() {
            if let Some(user) = lookup("SSH_USERNAME") {
                remote.user = user;
            }
            if let Some(port) = lookup("SSH_PORT") {
                remote.port = parse_env("SSH_PORT", &port)?;
            }
            if let Some(secs) = lookup("SSH_TIMEOUT") {
                remote.connect_timeout_secs = parse_env("SSH_TIMEOUT", &secs)?;
            }
        }
        Ok(())
    }

    /// Reject values that would make the server or client unusable
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(DiskmonError::Config("server.port must not be 0".to_string()));
        }
        if self.executor.timeout_ms == 0 {
            return Err(DiskmonError::Config("executor.timeout_ms must be positive".to_string()));
        }
        if self.executor.workers == 0 {
            return Err(DiskmonError::Config("executor.workers must be positive".to_string()));
        }
        if let Some(level) = &self.log_level
            && !LOG_LEVELS.contains(&normalize_level(level).as_str())
        {
            return Err(DiskmonError::Config(format!("unknown log level '{}'", level)));
        }
        if let Some(remote) = &self.executor.remote
            && (remote.host.is_empty() || remote.user.is_empty())
        {
            return Err(DiskmonError::Config("executor.remote needs both user and host".to_string()));
        }
        Ok(())
    }

    /// Effective log level: debug mode wins over the configured level
    pub fn effective_log_level(&self) -> String {
        if self.debug {
            return "debug".to_string();
        }
        self.log_level.as_deref().map(normalize_level).unwrap_or_else(|| "info".to_string())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DiskmonError::Config(format!("{}: invalid value '{}'", key, value)))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:6666");
        assert_eq!(config.executor.timeout_ms, 3000);
        assert_eq!(config.executor.workers, 4);
        assert_eq!(config.client.reconnect_attempts, 1);
        assert!(config.client.request_timeout_ms.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("diskmon.yml");
        fs::write(
            &path,
            "server:\n  port: 7000\nexecutor:\n  use_sudo: true\n  remote:\n    host: storage01\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.executor.use_sudo);
        let remote = config.executor.remote.unwrap();
        assert_eq!(remote.host, "storage01");
        assert_eq!(remote.port, 22);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.yml");
        assert!(matches!(Config::load(Some(&path)), Err(DiskmonError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                ("MCP_HOST", "127.0.0.1"),
                ("MCP_PORT", "8080"),
                ("MCP_DEBUG", "true"),
                ("COMMAND_TIMEOUT", "2.5"),
                ("MAX_WORKERS", "8"),
                ("USE_SUDO", "1"),
            ]))
            .unwrap();

        assert_eq!(config.server.bind_addr(), "127.0.0.1:8080");
        assert!(config.debug);
        assert_eq!(config.executor.timeout_ms, 2500);
        assert_eq!(config.executor.workers, 8);
        assert!(config.executor.use_sudo);
        assert_eq!(config.effective_log_level(), "debug");
    }

    #[test]
    fn test_log_level_aliases() {
        for (given, expected) in [("warning", "warn"), ("WARNING", "warn"), ("critical", "error"), ("Debug", "debug")] {
            let mut config = Config::default();
            config.apply_env_with(env(&[("LOG_LEVEL", given)])).unwrap();
            assert!(config.validate().is_ok(), "{} should be accepted", given);
            assert_eq!(config.effective_log_level(), expected);
        }
    }

    #[test]
    fn test_log_level_alias_from_file() {
        let config: Config = serde_yaml::from_str("log_level: WARNING\n").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_log_level(), "warn");
    }

    #[test]
    fn test_ssh_env_enables_remote() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                ("SSH_HOST", "10.1.2.3"),
                ("SSH_USERNAME", "admin"),
                ("SSH_PORT", "2200"),
                ("SSH_TIMEOUT", "10"),
            ]))
            .unwrap();

        let remote = config.executor.remote.as_ref().unwrap();
        assert_eq!(remote.host, "10.1.2.3");
        assert_eq!(remote.user, "admin");
        assert_eq!(remote.port, 2200);
        assert_eq!(remote.connect_timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ssh_user_without_host_is_ignored() {
        let mut config = Config::default();
        config.apply_env_with(env(&[("SSH_USERNAME", "admin")])).unwrap();
        assert!(config.executor.remote.is_none());
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = Config::default();
        let err = config.apply_env_with(env(&[("MCP_PORT", "sixty")])).unwrap_err();
        assert!(err.to_string().contains("MCP_PORT"));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.executor.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.log_level = Some("loud".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.executor.remote = Some(RemoteConfig::default());
        assert!(config.validate().is_err());
    }
}
