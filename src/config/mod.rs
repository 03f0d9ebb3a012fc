mod api;
mod defaults;
mod tools;
mod validation;

use crate::cli::Args;
use crate::error::{ChatError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub use api::{ApiConfig, ApiSettings, ApiType};
pub use defaults::{
    default_max_output_bytes, default_max_rounds, default_tool_timeout, default_true, is_true, DEFAULT_API_VERSION,
    DEFAULT_MODEL, DEFAULT_OPENAI_BASE,
};
pub use tools::ToolsConfig;
pub use validation::{expand_env_var_in_string, expand_env_vars};

use defaults::{default_expiry_minutes, default_history_turns, default_host, default_port};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
    /// Number of most recent user turns kept when a conversation is resent.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verbose: None,
            history_turns: default_history_turns(),
            expiry_minutes: default_expiry_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// On-disk configuration, every section optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiSettings,
    pub system_prompt: Option<String>,
    pub verbose: bool,
    pub history_turns: usize,
    pub expiry_minutes: i64,
    pub tools: ToolsConfig,
    /// False when tools are switched off by config or `--no-tools`.
    pub tools_enabled: bool,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env_and_args(args: &Args) -> Result<Self> {
        let file_config = FileConfig::load()?;
        Self::from_sources(args, file_config, |key| env::var(key).ok())
    }

    /// Merge CLI args > environment > config file > defaults.
    pub fn from_sources<F>(args: &Args, file: FileConfig, env_var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_type: ApiType = args
            .api_type
            .clone()
            .or_else(|| env_var("TOOLCHAT_API_TYPE"))
            .unwrap_or_else(|| file.api.api_type.clone())
            .parse()
            .map_err(ChatError::Config)?;

        let api_key = match api_type {
            ApiType::Azure => env_var("AZURE_OPENAI_KEY").or_else(|| env_var("AZURE_OPENAI_API_KEY")),
            ApiType::OpenAi => env_var("OPENAI_API_KEY"),
        }
        .or(file.api.api_key.clone())
        .filter(|key| !key.trim().is_empty());

        let api_base = args
            .api_base
            .clone()
            .or_else(|| match api_type {
                ApiType::Azure => env_var("AZURE_OPENAI_ENDPOINT"),
                ApiType::OpenAi => env_var("OPENAI_BASE_URL"),
            })
            .or(file.api.api_base.clone())
            .map(|base| expand_env_var_in_string(&base))
            .filter(|base| !base.trim().is_empty());

        let api_version = args
            .api_version
            .clone()
            .or_else(|| env_var("AZURE_API_VERSION"))
            .or(file.api.api_version.clone())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let model = args
            .model
            .clone()
            .or_else(|| env_var("AZURE_OPENAI_MODEL"))
            .or(file.api.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let system_prompt = env_var("TOOLCHAT_SYSTEM_PROMPT").or(file.model.system_prompt.clone());

        let verbose = args.verbose
            || env_var("TOOLCHAT_VERBOSE")
                .map(|v| is_truthy(&v))
                .or(file.session.verbose)
                .unwrap_or(false);

        let mut tools = file.tools.clone();
        if let Some(dir) = args.tools_dir.clone().or_else(|| env_var("TOOLCHAT_TOOLS_DIR")) {
            tools.directory = dir;
        }
        tools.directory = expand_env_var_in_string(&tools.directory);
        tools.workspace_dir = expand_env_var_in_string(&tools.workspace_dir);

        let tools_enabled = !args.no_tools && tools.enabled;

        let mut server = file.server.clone();
        if let Some(host) = args.host.clone() {
            server.host = host;
        }
        if let Some(port) = args.port {
            server.port = port;
        }

        Ok(Config {
            api: ApiSettings {
                api_type,
                api_base,
                api_key,
                api_version,
                model,
                stream: file.api.stream,
                request_timeout: file.api.request_timeout,
                stream_timeout: file.api.stream_timeout,
            },
            system_prompt,
            verbose,
            history_turns: file.session.history_turns.max(1),
            expiry_minutes: file.session.expiry_minutes,
            tools,
            tools_enabled,
            server,
        })
    }

    pub fn get_current_date() -> String {
        chrono::Local::now().format("%A, %B %d, %Y").to_string()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# toolchat configuration
api:
  # azure or openai
  api_type: azure
  # Azure resource endpoint, e.g. https://my-resource.openai.azure.com/
  # api_base: https://your-endpoint.openai.azure.com/
  # Prefer the AZURE_OPENAI_KEY / OPENAI_API_KEY environment variables
  # api_key: ""
  api_version: "2024-02-01"
  # Azure deployment name or OpenAI model id
  model: gpt-4
  stream: true

# model:
#   system_prompt: "You are a helpful assistant."

session:
  history_turns: 10
  expiry_minutes: 30

tools:
  enabled: true
  directory: tools
  workspace_dir: "."
  max_rounds: 3
  max_file_size_mb: 10
  disabled_builtins: []

server:
  host: 0.0.0.0
  port: 8000
"#;

impl FileConfig {
    pub fn load() -> anyhow::Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(FileConfig::default())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if is_yaml(path) {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config file: {}", path.display()))
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".toolchat.yaml"),
            PathBuf::from(".toolchat.yml"),
            PathBuf::from(".toolchat.json"),
        ];

        if let Some(config_dir) = Self::user_config_dir() {
            paths.push(config_dir.join("toolchat.yaml"));
            paths.push(config_dir.join("toolchat.yml"));
            paths.push(config_dir.join("toolchat.json"));
        }

        paths
    }

    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("toolchat"))
    }

    /// Write the commented default config. Refuses to overwrite.
    pub fn write_default(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, DEFAULT_CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}
