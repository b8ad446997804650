use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::upstream::netatmo::DEFAULT_BASE_URL;

/// Deployment mode. Development relaxes CORS to any origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(anyhow!(
                "Unknown environment '{value}'. Expected 'development' or 'production'."
            )),
        }
    }
}

/// Top-level configuration, stored as TOML and overridable from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub device_id: String,
    pub module_id: String,

    /// Seeds `refreshToken` when the store holds none; also the fallback
    /// tried once at bootstrap if the stored token is rejected.
    pub initial_refresh_token: Option<String>,

    pub api_base_url: String,

    /// Origins answered on CORS pre-flight in production.
    pub allowed_origins: Vec<String>,
    pub environment: Environment,

    pub host: String,
    pub port: u16,
    pub fetch_interval_secs: u64,

    /// Where the durable state lives. Defaults to the platform data dir.
    pub store_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            device_id: String::new(),
            module_id: String::new(),
            initial_refresh_token: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            allowed_origins: Vec::new(),
            environment: Environment::default(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            fetch_interval_secs: 30,
            store_dir: None,
        }
    }
}

impl Config {
    /// Load the TOML file (if any) and apply environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => Self::config_file_path()?,
        };

        let mut cfg = Self::load_file(&path)?;
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Read a config file, or return defaults if it doesn't exist yet.
    pub fn load_file(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("NETATMO_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = non_empty("NETATMO_CLIENT_SECRET") {
            self.client_secret = v;
        }
        if let Some(v) = non_empty("NETATMO_DEVICE_ID") {
            self.device_id = v;
        }
        if let Some(v) = non_empty("NETATMO_MODULE_ID") {
            self.module_id = v;
        }
        if let Some(v) = non_empty("NETATMO_REFRESH_TOKEN") {
            self.initial_refresh_token = Some(v);
        }
        if let Some(v) = non_empty("NETATMO_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = non_empty("ALLOWED_ORIGINS") {
            self.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = non_empty("APP_ENV") {
            self.environment = v.parse()?;
        }
        if let Some(v) = non_empty("HOST") {
            self.host = v;
        }
        if let Some(v) = non_empty("PORT") {
            self.port = v.parse().with_context(|| format!("Invalid PORT '{v}'"))?;
        }
        if let Some(v) = non_empty("FETCH_INTERVAL_SECS") {
            self.fetch_interval_secs =
                v.parse().with_context(|| format!("Invalid FETCH_INTERVAL_SECS '{v}'"))?;
        }
        if let Some(v) = non_empty("STORE_DIR") {
            self.store_dir = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Check that everything needed to talk to the station API is present.
    pub fn validate(&self) -> Result<()> {
        let required = [
            (&self.client_id, "NETATMO_CLIENT_ID"),
            (&self.client_secret, "NETATMO_CLIENT_SECRET"),
            (&self.device_id, "NETATMO_DEVICE_ID"),
            (&self.module_id, "NETATMO_MODULE_ID"),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(value, _)| value.trim().is_empty())
            .map(|(_, env)| *env)
            .collect();

        if !missing.is_empty() {
            return Err(anyhow!(
                "Missing configuration: {}.\n\
                 Hint: run `station configure` or set the environment variables.",
                missing.join(", ")
            ));
        }

        if self.fetch_interval_secs == 0 {
            return Err(anyhow!("fetch_interval_secs must be greater than zero"));
        }

        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p,
            None => Self::config_file_path()?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "station-relay", "station")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory holding the durable store.
    pub fn resolved_store_dir(&self) -> Result<PathBuf> {
        match &self.store_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("store")),
        }
    }

    /// One-line description safe to log: secrets are reduced to presence flags.
    pub fn summary(&self) -> String {
        format!(
            "env={:?} listen={} api={} device={} module={} interval={}s origins={} refresh_token={}",
            self.environment,
            self.listen_addr(),
            self.api_base_url,
            self.device_id,
            self.module_id,
            self.fetch_interval_secs,
            self.allowed_origins.len(),
            if self.initial_refresh_token.is_some() { "configured" } else { "absent" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    fn complete() -> Config {
        Config {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            device_id: "dev".into(),
            module_id: "mod".into(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_match_upstream_cadence() {
        let cfg = Config::default();

        assert_eq!(cfg.fetch_interval(), Duration::from_secs(30));
        assert_eq!(cfg.api_base_url, "https://api.netatmo.com");
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = complete();
        cfg.apply_overrides(env(&[
            ("NETATMO_CLIENT_ID", "other"),
            ("NETATMO_REFRESH_TOKEN", "R0"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example ,"),
            ("APP_ENV", "development"),
            ("PORT", "8080"),
        ]))
        .unwrap();

        assert_eq!(cfg.client_id, "other");
        assert_eq!(cfg.initial_refresh_token.as_deref(), Some("R0"));
        assert_eq!(cfg.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.device_id, "dev");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = complete();
        cfg.apply_overrides(env(&[("NETATMO_CLIENT_ID", "  ")])).unwrap();

        assert_eq!(cfg.client_id, "cid");
    }

    #[test]
    fn invalid_port_is_reported() {
        let mut cfg = Config::default();
        let err = cfg.apply_overrides(env(&[("PORT", "eighty")])).unwrap_err();

        assert!(err.to_string().contains("Invalid PORT"));
    }

    #[test]
    fn validate_lists_missing_fields() {
        let err = Config::default().validate().unwrap_err();
        let msg = err.to_string();

        assert!(msg.contains("NETATMO_CLIENT_ID"));
        assert!(msg.contains("NETATMO_MODULE_ID"));
        assert!(msg.contains("Hint: run `station configure`"));
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn save_then_load_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut cfg = complete();
        cfg.initial_refresh_token = Some("R0".into());
        cfg.allowed_origins = vec!["https://example.org".into()];
        cfg.save(Some(path.clone())).unwrap();

        let loaded = Config::load_file(&path).unwrap();
        assert_eq!(loaded.client_id, "cid");
        assert_eq!(loaded.initial_refresh_token.as_deref(), Some("R0"));
        assert_eq!(loaded.allowed_origins, vec!["https://example.org"]);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Config::load_file(&tmp.path().join("absent.toml")).unwrap();

        assert_eq!(cfg.port, 3000);
    }

    #[test]
    fn summary_does_not_leak_secrets() {
        let mut cfg = complete();
        cfg.initial_refresh_token = Some("R0-secret".into());
        let summary = cfg.summary();

        assert!(!summary.contains("secret"));
        assert!(summary.contains("refresh_token=configured"));
    }
}
