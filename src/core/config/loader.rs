use anyhow::{Context, Result};
use dirs_next as dirs;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::model::AppConfig;

const APP_IDENTIFIER: &str = "proxy-toggler";

/// `<base>/config/config.json`
pub fn config_file(base: &Path) -> PathBuf {
    base.join("config").join("config.json")
}

/// Per-user config directory for this app
///
/// Windows: `%APPDATA%\proxy-toggler`, Linux: `~/.config/proxy-toggler`.
/// Falls back to the working directory when the platform has none.
pub fn default_base_dir() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join(APP_IDENTIFIER),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Load from [`default_base_dir`], writing defaults on first run
pub fn load_or_init() -> Result<AppConfig> {
    load_or_init_at(&default_base_dir())
}

/// Load `<base>/config/config.json`; a missing file is created with defaults
pub fn load_or_init_at(base_dir: &Path) -> Result<AppConfig> {
    let path = config_file(base_dir);
    match fs::read(&path) {
        Ok(data) => serde_json::from_slice(&data)
            .with_context(|| format!("parse config json: {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let cfg = AppConfig::default();
            save_at(&cfg, base_dir)?;
            Ok(cfg)
        }
        Err(e) => Err(e).with_context(|| format!("read config: {}", path.display())),
    }
}

pub fn save_at(cfg: &AppConfig, base_dir: &Path) -> Result<()> {
    let path = config_file(base_dir);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("create config dir: {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&path, json).with_context(|| format!("write config: {}", path.display()))?;
    tracing::info!(target = "config", path = %path.display(), "config saved");
    Ok(())
}
