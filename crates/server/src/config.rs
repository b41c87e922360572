use config::ConfigError;
use engine::{ReactionStrategy, WidgetSettings};
use serde::Deserialize;
use std::collections::HashMap;

const ENV_PREFIX: &str = "THREADLINE_";

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub widget: WidgetConfig,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    /// A sqlx SQLite URL, or `memory` for a process-local store.
    pub url: String,
}

#[derive(Deserialize, Clone)]
pub struct WidgetConfig {
    pub atomic_reactions: bool,
    pub preview_chars: usize,
}

impl From<&WidgetConfig> for WidgetSettings {
    fn from(config: &WidgetConfig) -> Self {
        WidgetSettings {
            reaction_strategy: if config.atomic_reactions {
                ReactionStrategy::Atomic
            } else {
                ReactionStrategy::ReadModifyWrite
            },
            preview_chars: config.preview_chars,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        let env_json = serde_json::to_string(&collect_env_vars())
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        let s = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origins", "*")?
            .set_default("database.url", "sqlite://data/threadline.db")?
            .set_default("widget.atomic_reactions", false)?
            .set_default("widget.preview_chars", domain::protocol::PREVIEW_CHARS as u64)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(config::File::from_str(&env_json, config::FileFormat::Json))
            .build()?;

        s.try_deserialize()
    }
}

/// `THREADLINE_SERVER__PORT=8080` becomes `server.port = "8080"`.
fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .map(|(k, v)| {
            let key = k
                .trim_start_matches(ENV_PREFIX)
                .replace("__", ".")
                .to_lowercase();
            (key, v)
        })
        .collect()
}
