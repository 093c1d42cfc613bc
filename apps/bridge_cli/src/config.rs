use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use audio_backend::NodeConfig;
use serde::Deserialize;
use shared::domain::UserId;
use voice_bridge::BridgeConfig;

const DEFAULT_CONFIG_PATH: &str = "bridge.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bot_user_id: u64,
    pub node_host: String,
    pub node_port: u16,
    pub node_password: String,
    pub node_region: String,
    pub node_label: String,
    pub join_timeout_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_user_id: 1,
            node_host: "127.0.0.1".into(),
            node_port: 2333,
            node_password: "youshallnotpass".into(),
            node_region: "us".into(),
            node_label: "default-node".into(),
            join_timeout_ms: 10_000,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            user_id: UserId(self.bot_user_id),
            node: NodeConfig {
                host: self.node_host.clone(),
                port: self.node_port,
                password: self.node_password.clone(),
                region: self.node_region.clone(),
                label: self.node_label.clone(),
            },
            join_timeout: Duration::from_millis(self.join_timeout_ms),
        }
    }
}

/// Keys accepted in the TOML file. Anything missing keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    bot_user_id: Option<u64>,
    node_host: Option<String>,
    node_port: Option<u16>,
    node_password: Option<String>,
    node_region: Option<String>,
    node_label: Option<String>,
    join_timeout_ms: Option<u64>,
    log_filter: Option<String>,
}

/// Defaults, then the TOML file, then `APP__*` environment variables.
///
/// An explicitly given file must exist; the default `bridge.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(error) if required => {
            return Err(error)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file.bot_user_id {
        settings.bot_user_id = v;
    }
    if let Some(v) = file.node_host {
        settings.node_host = v;
    }
    if let Some(v) = file.node_port {
        settings.node_port = v;
    }
    if let Some(v) = file.node_password {
        settings.node_password = v;
    }
    if let Some(v) = file.node_region {
        settings.node_region = v;
    }
    if let Some(v) = file.node_label {
        settings.node_label = v;
    }
    if let Some(v) = file.join_timeout_ms {
        settings.join_timeout_ms = v;
    }
    if let Some(v) = file.log_filter {
        settings.log_filter = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("APP__BOT_USER_ID").and_then(|v| v.parse().ok()) {
        settings.bot_user_id = v;
    }
    if let Some(v) = var("APP__NODE_HOST") {
        settings.node_host = v;
    }
    if let Some(v) = var("APP__NODE_PORT").and_then(|v| v.parse().ok()) {
        settings.node_port = v;
    }
    if let Some(v) = var("APP__NODE_PASSWORD") {
        settings.node_password = v;
    }
    if let Some(v) = var("APP__NODE_REGION") {
        settings.node_region = v;
    }
    if let Some(v) = var("APP__NODE_LABEL") {
        settings.node_label = v;
    }
    if let Some(v) = var("APP__JOIN_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.join_timeout_ms = v;
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
