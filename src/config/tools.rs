use serde::{Deserialize, Serialize};

use super::defaults::{
    default_max_file_size_mb, default_max_rounds, default_tools_directory,
    default_tools_enabled, default_workspace_dir,
};

/// `tools:` section of the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tools_enabled")]
    pub enabled: bool,
    /// Directory scanned for `tool-<name>.{yaml,yml,json}` manifests.
    #[serde(default = "default_tools_directory")]
    pub directory: String,
    /// Base for `create_file` output and path arguments of command tools.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    /// Tool-calling rounds allowed per user turn before the model must answer.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default)]
    pub disabled_builtins: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_tools_enabled(),
            directory: default_tools_directory(),
            workspace_dir: default_workspace_dir(),
            max_rounds: default_max_rounds(),
            max_file_size_mb: default_max_file_size_mb(),
            disabled_builtins: Vec::new(),
        }
    }
}
