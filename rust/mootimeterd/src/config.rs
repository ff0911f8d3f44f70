use crate::pages::{MAX_REFRESH_INTERVAL_MS, MIN_REFRESH_INTERVAL_MS};
use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "MOOTIMETERD_CONFIG";
pub const WORKSPACE_ENV: &str = "MOOTIMETERD_WORKSPACE";
pub const REFRESH_INTERVAL_ENV: &str = "MOOTIMETERD_REFRESH_INTERVAL_MS";
pub const LOG_ENV: &str = "MOOTIMETERD_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Opened at start-up when set; otherwise the client sends `workspace.select`.
    pub workspace: Option<PathBuf>,
    /// Polling interval given to new instances.
    pub refresh_interval_ms: i64,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            refresh_interval_ms: 1000,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file named by `MOOTIMETERD_CONFIG`, then env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid config {}", path.to_string_lossy()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_overrides<F>(&mut self, get: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ws) = get(WORKSPACE_ENV).filter(|v| !v.trim().is_empty()) {
            self.workspace = Some(PathBuf::from(ws));
        }
        if let Some(ms) = get(REFRESH_INTERVAL_ENV) {
            self.refresh_interval_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer", REFRESH_INTERVAL_ENV))?;
        }
        if let Some(filter) = get(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
        self.validate()
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(MIN_REFRESH_INTERVAL_MS..=MAX_REFRESH_INTERVAL_MS).contains(&self.refresh_interval_ms)
        {
            bail!(
                "refresh_interval_ms must be in {}..={}",
                MIN_REFRESH_INTERVAL_MS,
                MAX_REFRESH_INTERVAL_MS
            );
        }
        Ok(())
    }
}
