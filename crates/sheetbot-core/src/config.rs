//! Application configuration: defaults, optional TOML file, then `SHEETBOT__*` env vars.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | SHEETBOT_CONFIG | config/sheetbot.toml | Path of the TOML file (optional). |
//! | SHEETBOT__TEMPLATES__MAIN_SHEET_ID | (required) | Spreadsheet that receives new project sheets. |
//! | SHEETBOT__TEMPLATES__TEMPLATE_TOP_ID | (required) | Spreadsheet whose first sheet is the header block. |
//! | SHEETBOT__TEMPLATES__TEMPLATE_SECTION_ID | (required) | Spreadsheet whose first sheet is one section block. |
//! | SHEETBOT__SHEETS__ACCESS_TOKEN | "" | Bearer token for the Sheets API. |
//! | SHEETBOT__LLM__API_KEY | (required) | Key for the OpenAI-compatible endpoint. |
//! | SHEETBOT__TELEGRAM__BOT_TOKEN | unset | Enables the Telegram webhook when present. |

use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::builder::BuilderOptions;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

const DEFAULT_CONFIG_PATH: &str = "config/sheetbot.toml";

/// The three backend documents a build reads from and writes into. Read-only for
/// the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TemplateRefs {
    #[serde(default)]
    pub main_sheet_id: String,
    #[serde(default)]
    pub template_top_id: String,
    #[serde(default)]
    pub template_section_id: String,
}

impl TemplateRefs {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.main_sheet_id.trim().is_empty() {
            return Err(ConfigError::Missing("templates.main_sheet_id"));
        }
        if self.template_top_id.trim().is_empty() {
            return Err(ConfigError::Missing("templates.template_top_id"));
        }
        if self.template_section_id.trim().is_empty() {
            return Err(ConfigError::Missing("templates.template_section_id"));
        }
        Ok(())
    }
}

fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_base: default_sheets_api_base(),
            access_token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_llm_api_base(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` header value.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Public base URL; `/webhook` is appended and registered at startup.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_max_history() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub templates: TemplateRefs,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub builder: BuilderOptions,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub chat: ChatConfig,
    /// Directory for daily-rotated log files; stdout only when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl AppConfig {
    /// Load from `$SHEETBOT_CONFIG` (or `config/sheetbot.toml`) and the environment.
    /// Fails fast when a template id, the LLM key or a builder marker is missing.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SHEETBOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&config_path);
        let builder = Config::builder();
        let builder = if path.exists() {
            builder.add_source(File::from(path))
        } else {
            tracing::debug!(path = %config_path, "no config file, using environment only");
            builder
        };
        let built = builder
            .add_source(
                Environment::with_prefix("SHEETBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::finish(built)
    }

    /// Load from an in-memory TOML document only.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let built = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(built)
    }

    fn finish(built: Config) -> Result<Self, ConfigError> {
        let cfg: AppConfig = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.templates.validate()?;
        if self.builder.placeholder.trim().is_empty() {
            return Err(ConfigError::Missing("builder.placeholder"));
        }
        if self.builder.trailing_section.trim().is_empty() {
            return Err(ConfigError::Missing("builder.trailing_section"));
        }
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("llm.api_key"));
        }
        if let Some(tg) = &self.telegram {
            if tg.bot_token.trim().is_empty() {
                return Err(ConfigError::Missing("telegram.bot_token"));
            }
        }
        Ok(())
    }
}
