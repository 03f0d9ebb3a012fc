use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::defaults::{
    default_api_type, default_request_timeout, default_stream, default_stream_timeout,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    Azure,
    OpenAi,
}

impl FromStr for ApiType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" => Ok(ApiType::Azure),
            "openai" | "open_ai" => Ok(ApiType::OpenAi),
            other => Err(format!(
                "unknown api_type '{}' (expected 'azure' or 'openai')",
                other
            )),
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiType::Azure => write!(f, "azure"),
            ApiType::OpenAi => write!(f, "openai"),
        }
    }
}

/// `api:` section of the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_type")]
    pub api_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_type: default_api_type(),
            api_base: None,
            api_key: None,
            api_version: None,
            model: None,
            stream: default_stream(),
            request_timeout: default_request_timeout(),
            stream_timeout: default_stream_timeout(),
        }
    }
}

/// Connection settings after CLI, environment and file have been merged.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub api_type: ApiType,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub model: String,
    pub stream: bool,
    pub request_timeout: u64,
    pub stream_timeout: u64,
}
