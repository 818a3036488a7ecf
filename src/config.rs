use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Base URL of the chat backend
    #[arg(long, env = "API_BASE_URL")]
    pub api_url: Option<String>,

    /// File the access token is kept in between runs
    #[arg(long, env = "CREDENTIAL_FILE")]
    pub credential_file: Option<String>,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ApiConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Messages fetched when a conversation is opened.
    pub history_page_size: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CredentialConfig {
    /// Persist the credential here; memory only when unset.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("api.base_url", "http://127.0.0.1:8000")?
            .set_default("api.timeout_secs", 30)?
            .set_default("chat.history_page_size", 100)?
            .set_default("log.format", "text")?;

        // 2. Config file: explicit path must exist, ./config.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment, e.g. CHAT_API__BASE_URL
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their clap env fallbacks) win
        if let Some(url) = cli.api_url {
            builder = builder.set_override("api.base_url", url)?;
        }
        if let Some(path) = cli.credential_file {
            builder = builder.set_override("credential.path", path)?;
        }
        if let Some(format) = cli.log_format {
            builder = builder.set_override("log.format", format.to_lowercase())?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}
