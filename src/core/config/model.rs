use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TogglerCfg {
    /// Local SOCKS port the proxy settings point at
    #[serde(default = "default_port")] pub port: u16,
    #[serde(default = "default_true")] pub system_proxy: bool,
    #[serde(default)] pub env_proxy: bool,
    /// Also poke WinINet after touching the system proxy
    #[serde(default = "default_true")] pub refresh_internet_settings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastCfg {
    #[serde(default = "default_attempts")] pub attempts: u32,
    #[serde(default = "default_timeout_ms")] pub timeout_ms: u32,
    #[serde(default = "default_backoff_ms")] pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingCfg {
    #[serde(default = "default_log_level")] pub log_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)] pub toggler: TogglerCfg,
    #[serde(default)] pub broadcast: BroadcastCfg,
    #[serde(default)] pub logging: LoggingCfg,
}

fn default_true() -> bool { true }
fn default_port() -> u16 { 1080 }
fn default_attempts() -> u32 { 3 }
fn default_timeout_ms() -> u32 { 5000 }
fn default_backoff_ms() -> u64 { 200 }
fn default_log_level() -> String { "info".to_string() }

impl Default for TogglerCfg {
    fn default() -> Self {
        Self {
            port: default_port(),
            system_proxy: default_true(),
            env_proxy: false,
            refresh_internet_settings: default_true(),
        }
    }
}

impl Default for BroadcastCfg {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            timeout_ms: default_timeout_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}
