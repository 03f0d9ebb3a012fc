use crate::config::{expand_env_var_in_string, ToolsConfig};
use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::builtins::BuiltinTool;
use super::executor;
use super::manifest::{
    self, is_valid_tool_name, manifest_file_name, normalize_schema, DiscoveredPlugin,
    PluginManifest,
};

#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Where `tool-<name>` manifests live.
    pub tools_dir: PathBuf,
    /// Base for files written by tools and path arguments.
    pub workspace_dir: PathBuf,
    pub max_file_size_bytes: u64,
    pub disabled_builtins: Vec<String>,
}

impl ToolSettings {
    pub fn from_config(config: &ToolsConfig) -> Self {
        let to_path = |value: &str| {
            let expanded = expand_env_var_in_string(value);
            if expanded.is_empty() {
                PathBuf::from(".")
            } else {
                PathBuf::from(expanded)
            }
        };

        Self {
            tools_dir: to_path(&config.directory),
            workspace_dir: to_path(&config.workspace_dir),
            max_file_size_bytes: config.max_file_size_mb.saturating_mul(1024 * 1024),
            disabled_builtins: config.disabled_builtins.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ToolHandler {
    Builtin(BuiltinTool),
    Plugin {
        manifest: PluginManifest,
        path: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

impl RegisteredTool {
    pub fn is_builtin(&self) -> bool {
        matches!(self.handler, ToolHandler::Builtin(_))
    }

    /// Where the tool comes from, for listings.
    pub fn source(&self) -> String {
        match &self.handler {
            ToolHandler::Builtin(_) => "built-in".to_string(),
            ToolHandler::Plugin { path, .. } => path.display().to_string(),
        }
    }

    /// Function definition in the shape the chat API expects.
    pub fn to_llm_format(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

/// All tools available to the model, keyed by name.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    settings: ToolSettings,
}

impl ToolRegistry {
    /// Register the enabled built-ins, then every valid plugin in the tools
    /// directory. Broken plugins are skipped with a warning.
    pub fn load(settings: ToolSettings) -> Self {
        let mut registry = Self {
            tools: BTreeMap::new(),
            settings,
        };
        registry.populate();
        registry
    }

    pub fn reload(&mut self) {
        self.tools.clear();
        self.populate();
    }

    fn populate(&mut self) {
        for builtin in BuiltinTool::ALL {
            if self
                .settings
                .disabled_builtins
                .iter()
                .any(|name| name == builtin.name())
            {
                debug!("[tools] built-in {} disabled", builtin.name());
                continue;
            }
            self.tools.insert(
                builtin.name().to_string(),
                RegisteredTool {
                    name: builtin.name().to_string(),
                    description: builtin.description().to_string(),
                    input_schema: builtin.input_schema(),
                    handler: ToolHandler::Builtin(builtin),
                },
            );
        }

        if !self.settings.tools_dir.exists() {
            if let Err(e) = fs::create_dir_all(&self.settings.tools_dir) {
                warn!(
                    "Could not create tools directory {}: {}",
                    self.settings.tools_dir.display(),
                    e
                );
            }
        }

        for discovered in manifest::discover(&self.settings.tools_dir) {
            let plugin = match discovered {
                Ok(plugin) => plugin,
                Err((path, e)) => {
                    warn!("Skipping tool manifest {}: {}", path.display(), e);
                    continue;
                }
            };

            if !plugin.manifest.enabled {
                debug!("[tools] plugin {} disabled", plugin.name);
                continue;
            }

            // Built-ins take precedence; the first manifest wins among plugins
            if let Some(existing) = self.tools.get(&plugin.name) {
                warn!(
                    "Skipping tool manifest {}: name '{}' already provided by {}",
                    plugin.path.display(),
                    plugin.name,
                    existing.source()
                );
                continue;
            }

            match build_plugin_tool(plugin) {
                Ok(tool) => {
                    debug!("[tools] loaded plugin {} from {}", tool.name, tool.source());
                    self.tools.insert(tool.name.clone(), tool);
                }
                Err((path, e)) => warn!("Skipping tool manifest {}: {}", path.display(), e),
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Sorted by name.
    pub fn list(&self) -> Vec<&RegisteredTool> {
        self.tools.values().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn format_tools_for_llm(&self) -> Vec<Value> {
        self.tools.values().map(RegisteredTool::to_llm_format).collect()
    }

    pub fn validate_arguments(&self, tool_name: &str, arguments: &Value) -> Result<(), String> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| format!("Tool '{}' not found", tool_name))?;

        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&tool.input_schema)
            .map_err(|e| format!("Invalid tool schema: {}", e))?;

        if let Err(errors) = schema.validate(arguments) {
            let error_messages: Vec<String> = errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect();
            return Err(error_messages.join("; "));
        }

        Ok(())
    }

    /// Run a tool's handler. Arguments are expected to be validated already.
    pub async fn call(&self, tool_name: &str, arguments: &Value) -> Result<Value, String> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| format!("Tool '{}' not found", tool_name))?;

        match &tool.handler {
            ToolHandler::Builtin(builtin) => builtin.call(arguments, &self.settings),
            ToolHandler::Plugin { manifest, .. } => {
                executor::execute_plugin(&tool.name, manifest, arguments, &self.settings).await
            }
        }
    }

    /// Write `tool-<name>.json` into the tools directory and reload.
    pub fn register(&mut self, name: &str, manifest: &PluginManifest) -> Result<PathBuf, String> {
        if !is_valid_tool_name(name) {
            return Err(format!(
                "Invalid tool name '{}': use 1-64 letters, digits, '_' or '-'",
                name
            ));
        }
        if BuiltinTool::from_name(name).is_some() {
            return Err(format!("'{}' is a built-in tool", name));
        }

        let mut manifest = manifest.clone();
        manifest.name = None;
        // Reject anything that would be skipped on load
        check_plugin(name, &manifest)?;

        fs::create_dir_all(&self.settings.tools_dir)
            .map_err(|e| format!("Failed to create tools directory: {}", e))?;

        // A manifest under another extension would shadow or duplicate this one
        self.remove_manifest_files(name)?;

        let path = self.settings.tools_dir.join(manifest_file_name(name));
        let contents = serde_json::to_string_pretty(&manifest)
            .map_err(|e| format!("Failed to serialize manifest: {}", e))?;
        fs::write(&path, contents)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

        self.reload();
        Ok(path)
    }

    /// Copy a manifest file (and the script it points at, if it sits next to
    /// the manifest) into the tools directory. Returns the tool name.
    pub fn install(&mut self, source: &Path) -> Result<String, String> {
        let parsed = PluginManifest::from_path(source)?;
        let name = match parsed.name.clone() {
            Some(name) => name,
            None => manifest::tool_name_from_path(source).ok_or_else(|| {
                format!(
                    "Cannot derive a tool name from {}: set 'name' or use tool-<name>.json",
                    source.display()
                )
            })?,
        };

        if let Some(script_path) = parsed.script_path.as_deref() {
            let script_source = source
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(script_path);
            let script_target = self.settings.tools_dir.join(script_path);
            if script_source.is_file() && !script_target.exists() {
                if let Some(parent) = script_target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
                }
                fs::copy(&script_source, &script_target)
                    .map_err(|e| format!("Failed to copy {}: {}", script_source.display(), e))?;
            }
        }

        self.register(&name, &parsed)?;
        Ok(name)
    }

    /// Delete a plugin's manifest and reload.
    pub fn remove(&mut self, name: &str) -> Result<PathBuf, String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| format!("Tool '{}' not found", name))?;

        let path = match &tool.handler {
            ToolHandler::Builtin(_) => {
                return Err(format!("'{}' is a built-in tool and cannot be removed", name))
            }
            ToolHandler::Plugin { path, .. } => path.clone(),
        };

        fs::remove_file(&path)
            .map_err(|e| format!("Failed to remove {}: {}", path.display(), e))?;
        self.reload();
        Ok(path)
    }

    fn remove_manifest_files(&self, name: &str) -> Result<(), String> {
        for extension in manifest::MANIFEST_EXTENSIONS {
            let path = self
                .settings
                .tools_dir
                .join(format!("{}{}.{}", manifest::MANIFEST_PREFIX, name, extension));
            if path.is_file() {
                fs::remove_file(&path)
                    .map_err(|e| format!("Failed to remove {}: {}", path.display(), e))?;
            }
        }
        Ok(())
    }
}

/// Checks that `manifest` would load as tool `name`.
pub(crate) fn check_plugin(name: &str, manifest: &PluginManifest) -> Result<(), String> {
    build_plugin_tool(DiscoveredPlugin {
        name: name.to_string(),
        path: PathBuf::from(manifest_file_name(name)),
        manifest: manifest.clone(),
    })
    .map(|_| ())
    .map_err(|(_, e)| e)
}

fn build_plugin_tool(plugin: DiscoveredPlugin) -> Result<RegisteredTool, (PathBuf, String)> {
    let DiscoveredPlugin {
        name,
        path,
        manifest,
    } = plugin;

    if !is_valid_tool_name(&name) {
        return Err((path, format!("invalid tool name '{}'", name)));
    }
    if let Err(e) = manifest.validate() {
        return Err((path, e));
    }

    let (input_schema, schema_description) = normalize_schema(manifest.parameters.as_ref());
    if let Err(e) = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&input_schema)
    {
        return Err((path, format!("invalid parameters schema: {}", e)));
    }

    let description = manifest
        .description
        .clone()
        .filter(|d| !d.trim().is_empty())
        .or(schema_description)
        .unwrap_or_else(|| format!("Execute {} tool", name));

    Ok(RegisteredTool {
        name,
        description,
        input_schema,
        handler: ToolHandler::Plugin { manifest, path },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(dir: &Path) -> ToolSettings {
        ToolSettings {
            tools_dir: dir.join("tools"),
            workspace_dir: dir.to_path_buf(),
            max_file_size_bytes: 1024,
            disabled_builtins: Vec::new(),
        }
    }

    fn command_manifest(command: &str) -> PluginManifest {
        serde_json::from_value(json!({ "command": command })).unwrap()
    }

    #[test]
    fn test_builtins_registered_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::load(settings(temp_dir.path()));
        let names: Vec<&str> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["add", "create_file", "create_tool", "get_current_time"]);
        assert!(temp_dir.path().join("tools").is_dir());
    }

    #[test]
    fn test_disabled_builtin_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let mut s = settings(temp_dir.path());
        s.disabled_builtins = vec!["create_file".to_string()];
        let registry = ToolRegistry::load(s);
        assert!(registry.get("create_file").is_none());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_plugin_loading_and_description_fallbacks() {
        let temp_dir = TempDir::new().unwrap();
        let tools_dir = temp_dir.path().join("tools");
        fs::create_dir_all(&tools_dir).unwrap();
        fs::write(
            tools_dir.join("tool-addition.json"),
            r#"{"command": "echo", "function_schema": {"name": "addition", "description": "Adds", "type": "object", "properties": {}}}"#,
        )
        .unwrap();
        fs::write(tools_dir.join("tool-bare.yaml"), "command: \"true\"\n").unwrap();
        fs::write(tools_dir.join("tool-add.yaml"), "command: \"true\"\n").unwrap();
        fs::write(tools_dir.join("tool-off.yaml"), "enabled: false\ncommand: \"true\"\n").unwrap();
        fs::write(tools_dir.join("tool-bad schema.json"), r#"{"command": "x"}"#).unwrap();
        fs::write(
            tools_dir.join("tool-badtype.json"),
            r#"{"command": "x", "parameters": {"type": 12}}"#,
        )
        .unwrap();

        let registry = ToolRegistry::load(settings(temp_dir.path()));

        let addition = registry.get("addition").unwrap();
        assert_eq!(addition.description, "Adds");
        assert!(addition.input_schema.get("name").is_none());

        assert_eq!(registry.get("bare").unwrap().description, "Execute bare tool");
        assert!(registry.get("add").unwrap().is_builtin());
        assert!(registry.get("off").is_none());
        assert!(registry.get("bad schema").is_none());
        assert!(registry.get("badtype").is_none());
    }

    #[test]
    fn test_settings_size_limit_saturates() {
        let config = ToolsConfig {
            max_file_size_mb: u64::MAX,
            ..ToolsConfig::default()
        };
        assert_eq!(ToolSettings::from_config(&config).max_file_size_bytes, u64::MAX);

        let config = ToolsConfig::default();
        assert_eq!(
            ToolSettings::from_config(&config).max_file_size_bytes,
            10 * 1024 * 1024
        );
    }

    #[test]
    fn test_format_for_llm() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::load(settings(temp_dir.path()));
        let formatted = registry.format_tools_for_llm();
        assert_eq!(formatted.len(), 4);
        assert_eq!(formatted[0]["type"], "function");
        assert_eq!(formatted[0]["function"]["name"], "add");
        assert!(formatted[0]["function"]["parameters"]["properties"]["a"].is_object());
    }

    #[test]
    fn test_validate_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::load(settings(temp_dir.path()));

        assert!(registry.validate_arguments("add", &json!({"a": 1, "b": 2})).is_ok());
        let err = registry
            .validate_arguments("add", &json!({"a": "one"}))
            .unwrap_err();
        assert!(err.contains("\"b\" is a required property") || err.contains("b"));
        assert!(registry
            .validate_arguments("missing", &json!({}))
            .unwrap_err()
            .contains("not found"));
    }

    #[tokio::test]
    async fn test_call_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ToolRegistry::load(settings(temp_dir.path()));
        let result = registry.call("add", &json!({"a": 20, "b": 22})).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn test_register_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::load(settings(temp_dir.path()));

        let path = registry.register("greet", &command_manifest("echo")).unwrap();
        assert!(path.ends_with("tool-greet.json"));
        assert!(registry.get("greet").is_some());

        assert!(registry.register("add", &command_manifest("echo")).is_err());
        assert!(registry.register("no spaces", &command_manifest("echo")).is_err());
        assert!(registry
            .register("empty", &PluginManifest::default())
            .is_err());
        assert!(!temp_dir.path().join("tools/tool-empty.json").exists());

        assert!(registry.remove("add").is_err());
        registry.remove("greet").unwrap();
        assert!(registry.get("greet").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_install_copies_manifest_and_script() {
        let temp_dir = TempDir::new().unwrap();
        let source_dir = temp_dir.path().join("incoming");
        fs::create_dir_all(&source_dir).unwrap();
        fs::write(source_dir.join("echo.sh"), "cat\n").unwrap();
        let manifest_path = source_dir.join("tool-echo_back.yaml");
        fs::write(&manifest_path, "script_path: echo.sh\ndescription: Echo\n").unwrap();

        let mut registry = ToolRegistry::load(settings(temp_dir.path()));
        let name = registry.install(&manifest_path).unwrap();

        assert_eq!(name, "echo_back");
        assert!(temp_dir.path().join("tools/tool-echo_back.json").is_file());
        assert!(temp_dir.path().join("tools/echo.sh").is_file());
        assert_eq!(registry.get("echo_back").unwrap().description, "Echo");
    }
}
