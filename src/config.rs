use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::modules::locale::Locale;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub locale: Locale,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            locale: Locale::Fr,
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub enabled: bool,
    pub key: String,
    pub cluster: String,
    /// Overrides `ws-{cluster}.pusher.com`, e.g. for a self-hosted Reverb server.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub use_tls: bool,
    pub channel: String,
    pub private: bool,
    pub event: String,
    pub namespace: String,
    pub auth_endpoint: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: String::new(),
            cluster: "eu".to_string(),
            host: None,
            port: None,
            use_tls: true,
            channel: "admin-notifications".to_string(),
            private: false,
            event: ".admin.notification".to_string(),
            namespace: "App.Events".to_string(),
            auth_endpoint: "http://localhost:8000/broadcasting/auth".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    /// 0 means poll until ready or cancelled.
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            max_attempts: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// 0 keeps every notification for the session.
    pub max_items: usize,
    pub desktop_alerts: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            desktop_alerts: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub api: ApiConfig,
    pub broadcast: BroadcastConfig,
    pub polling: PollingConfig,
    pub notifications: NotificationConfig,
    pub logging: LogConfig,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub path: PathBuf,
    pub api: ApiConfig,
    pub broadcast: BroadcastConfig,
    pub polling: PollingConfig,
    pub notifications: NotificationConfig,
    pub logging: LogConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(config_path()?)
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            let default = ConfigFile::default();
            let toml = toml::to_string_pretty(&default)?;
            if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
            fs::write(&path, toml)?;
        }
        let content = fs::read_to_string(&path).with_context(|| format!("Reading {:?}", &path))?;
        let mut config = Self::parse(path, &content)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn parse(path: PathBuf, content: &str) -> Result<Self> {
        let cfg: ConfigFile = toml::from_str(content).with_context(|| "Parsing config TOML")?;
        Ok(Self {
            path,
            api: cfg.api,
            broadcast: cfg.broadcast,
            polling: cfg.polling,
            notifications: cfg.notifications,
            logging: cfg.logging,
        })
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ATELIER_API_URL") { self.api.base_url = url; }
        if let Some(key) = lookup("ATELIER_BROADCAST_KEY") { self.broadcast.key = key; }
        if let Some(host) = lookup("ATELIER_BROADCAST_HOST") { self.broadcast.host = Some(host); }
        if let Some(raw) = lookup("ATELIER_LOCALE") {
            match raw.parse::<Locale>() {
                Ok(locale) => self.api.locale = locale,
                Err(err) => warn!(error = %err, "ignoring ATELIER_LOCALE"),
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let cfg = ConfigFile {
            api: self.api.clone(),
            broadcast: self.broadcast.clone(),
            polling: self.polling.clone(),
            notifications: self.notifications.clone(),
            logging: self.logging.clone(),
        };
        let toml = toml::to_string_pretty(&cfg)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml)?;
        Ok(())
    }

    pub fn set_locale(&mut self, locale: Locale) -> Result<()> {
        self.api.locale = locale;
        self.save()
    }

    pub fn directory(&self) -> PathBuf {
        self.path.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    pub fn log_file(&self) -> PathBuf {
        self.logging
            .file
            .clone()
            .unwrap_or_else(|| self.directory().join("atelier.log"))
    }
}

/// The bearer token of the signed-in administrator, kept next to the config file.
#[derive(Clone, Debug)]
pub struct Session {
    path: PathBuf,
    token: Option<String>,
}

impl Session {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("token");
        let token = if path.exists() {
            let raw = fs::read_to_string(&path).with_context(|| format!("Reading {:?}", &path))?;
            Some(raw.trim().to_string()).filter(|t| !t.is_empty())
        } else {
            None
        };
        Ok(Self { path, token })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn store(&mut self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token).with_context(|| format!("Writing {:?}", &self.path))?;
        self.token = Some(token.to_string());
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.token = None;
        if self.path.exists() {
            fs::remove_file(&self.path).with_context(|| format!("Removing {:?}", &self.path))?;
        }
        Ok(())
    }
}

fn config_path() -> Result<PathBuf> {
    let base = config_dir().context("Could not determine config directory")?;
    Ok(base.join("atelier").join("config.toml"))
}
