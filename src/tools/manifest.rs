use crate::config::{default_max_output_bytes, default_tool_timeout, default_true, is_true};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name prefix that marks a tool manifest in the tools directory.
pub const MANIFEST_PREFIX: &str = "tool-";
pub const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

static TOOL_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid tool name pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Run `interpreter <script>` with the JSON arguments on stdin.
    Script,
    /// Run an arbitrary command with templated args.
    Command,
}

/// A `tool-<name>.{yaml,yml,json}` file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginManifest {
    /// Overrides the name derived from the file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema of the arguments.
    #[serde(
        default,
        alias = "input_schema",
        alias = "function_schema",
        skip_serializing_if = "Option::is_none"
    )]
    pub parameters: Option<Value>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<PluginKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,

    /// Inline script source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Script file, relative to the tools directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Relative to the tools directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Commands only; scripts always get their arguments on stdin.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub stdin_json: bool,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            name: None,
            enabled: true,
            description: None,
            parameters: None,
            kind: None,
            interpreter: None,
            script: None,
            script_path: None,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            stdin_json: true,
            timeout_secs: default_tool_timeout(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl PluginManifest {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e)),
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e)),
        }
    }

    /// Explicit `type`, otherwise whichever of script/command is configured.
    pub fn kind(&self) -> Result<PluginKind, String> {
        if let Some(kind) = self.kind {
            return Ok(kind);
        }
        if self.script.is_some() || self.script_path.is_some() {
            Ok(PluginKind::Script)
        } else if self.command.is_some() {
            Ok(PluginKind::Command)
        } else {
            Err("manifest needs 'script', 'script_path' or 'command'".to_string())
        }
    }

    /// Structural checks that do not touch the filesystem.
    pub fn validate(&self) -> Result<(), String> {
        match self.kind()? {
            PluginKind::Script => {
                if self.script.is_none() && self.script_path.is_none() {
                    return Err("type 'script' requires 'script' or 'script_path'".to_string());
                }
                if self.resolved_interpreter().is_none() {
                    return Err(
                        "type 'script' requires 'interpreter' (could not infer one from script_path)"
                            .to_string(),
                    );
                }
            }
            PluginKind::Command => {
                if self.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    return Err("type 'command' requires 'command'".to_string());
                }
            }
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn resolved_interpreter(&self) -> Option<String> {
        self.interpreter.clone().or_else(|| {
            self.script_path
                .as_deref()
                .and_then(|p| interpreter_for(Path::new(p)))
                .map(|i| i.to_string())
        })
    }
}

/// Discovered manifest file before it becomes a registered tool.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub name: String,
    pub path: PathBuf,
    pub manifest: PluginManifest,
}

pub fn is_valid_tool_name(name: &str) -> bool {
    TOOL_NAME_PATTERN.is_match(name)
}

pub fn manifest_file_name(name: &str) -> String {
    format!("{}{}.json", MANIFEST_PREFIX, name)
}

/// `tools/tool-web_search.yaml` -> `web_search`. None for files that do not
/// follow the naming convention.
pub fn tool_name_from_path(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?;
    if !MANIFEST_EXTENSIONS.contains(&extension) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let name = stem.strip_prefix(MANIFEST_PREFIX)?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Scan `dir` for manifests, sorted by file name so duplicate names resolve
/// the same way on every run. Broken manifests come back as errors.
pub fn discover(dir: &Path) -> Vec<Result<DiscoveredPlugin, (PathBuf, String)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && tool_name_from_path(path).is_some())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let file_name = tool_name_from_path(&path).unwrap_or_default();
            let manifest = PluginManifest::from_path(&path).map_err(|e| (path.clone(), e))?;
            let name = manifest.name.clone().unwrap_or(file_name);
            Ok(DiscoveredPlugin {
                name,
                path,
                manifest,
            })
        })
        .collect()
}

/// Normalise a declared schema into a JSON-schema object.
///
/// Older plugins mixed `name`/`description` into the schema itself; those keys
/// are removed and the description is returned so it can serve as the tool
/// description. A missing schema means "no arguments".
pub fn normalize_schema(schema: Option<&Value>) -> (Value, Option<String>) {
    let mut schema = match schema {
        Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()),
        _ => return (json!({"type": "object", "properties": {}}), None),
    };

    let mut description = None;
    if let Some(map) = schema.as_object_mut() {
        map.remove("name");
        if let Some(Value::String(d)) = map.remove("description") {
            description = Some(d);
        }
        map.entry("type").or_insert_with(|| json!("object"));
        map.entry("properties").or_insert_with(|| json!({}));
    }

    (schema, description)
}

/// Interpreter for a script file, by extension.
pub fn interpreter_for(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "py" => Some("python3"),
        "js" | "mjs" => Some("node"),
        "sh" => Some("bash"),
        "rb" => Some("ruby"),
        "pl" => Some("perl"),
        _ => None,
    }
}

/// Extension for an inline script written to disk before running it.
pub fn script_extension(interpreter: &str) -> &'static str {
    if interpreter.contains("python") {
        "py"
    } else if interpreter.contains("node") || interpreter.contains("bun") {
        "js"
    } else if interpreter.contains("ruby") {
        "rb"
    } else if interpreter.contains("perl") {
        "pl"
    } else if interpreter.contains("sh") {
        "sh"
    } else {
        "txt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tool_name_from_path() {
        assert_eq!(
            tool_name_from_path(Path::new("tools/tool-web_search.yaml")).as_deref(),
            Some("web_search")
        );
        assert_eq!(
            tool_name_from_path(Path::new("tool-add.json")).as_deref(),
            Some("add")
        );
        assert_eq!(tool_name_from_path(Path::new("tools/tool-add.py")), None);
        assert_eq!(tool_name_from_path(Path::new("tools/time.json")), None);
        assert_eq!(tool_name_from_path(Path::new("tools/tool-.json")), None);
    }

    #[test]
    fn test_tool_name_validation() {
        assert!(is_valid_tool_name("web_search"));
        assert!(is_valid_tool_name("cdm-ldm"));
        assert!(!is_valid_tool_name("has space"));
        assert!(!is_valid_tool_name(""));
        assert!(!is_valid_tool_name(&"x".repeat(65)));
    }

    #[test]
    fn test_normalize_strips_embedded_name_and_description() {
        let schema = json!({
            "name": "addition",
            "description": "Adds two numbers.",
            "type": "object",
            "properties": {"a": {"type": "number"}},
            "required": ["a"]
        });
        let (normalized, description) = normalize_schema(Some(&schema));
        assert_eq!(description.as_deref(), Some("Adds two numbers."));
        assert!(normalized.get("name").is_none());
        assert!(normalized.get("description").is_none());
        assert_eq!(normalized["required"], json!(["a"]));
    }

    #[test]
    fn test_normalize_missing_schema() {
        let (normalized, description) = normalize_schema(None);
        assert_eq!(normalized, json!({"type": "object", "properties": {}}));
        assert!(description.is_none());

        let (normalized, _) = normalize_schema(Some(&json!({})));
        assert_eq!(normalized["type"], "object");
    }

    #[test]
    fn test_kind_inference_and_validation() {
        let script = PluginManifest {
            script_path: Some("tool-add.py".to_string()),
            ..PluginManifest::default()
        };
        assert_eq!(script.kind().unwrap(), PluginKind::Script);
        assert_eq!(script.resolved_interpreter().as_deref(), Some("python3"));
        assert!(script.validate().is_ok());

        let unknown_ext = PluginManifest {
            script_path: Some("tool.xyz".to_string()),
            ..PluginManifest::default()
        };
        assert!(unknown_ext.validate().unwrap_err().contains("interpreter"));

        let empty = PluginManifest::default();
        assert!(empty.kind().is_err());
    }

    #[test]
    fn test_schema_aliases_parse() {
        let yaml = r#"
description: Adds numbers
function_schema:
  type: object
  properties:
    a: {type: number}
command: echo
"#;
        let manifest: PluginManifest = serde_yaml::from_str(yaml).unwrap();
        assert!(manifest.parameters.is_some());
        assert!(manifest.enabled);
        assert!(manifest.stdin_json);
        assert_eq!(manifest.timeout_secs, 30);
        assert_eq!(manifest.kind().unwrap(), PluginKind::Command);
    }

    #[test]
    fn test_discover_sorted_and_reports_broken() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("tool-b.json"), r#"{"command": "true"}"#).unwrap();
        fs::write(dir.join("tool-a.yaml"), "name: renamed\ncommand: \"true\"\n").unwrap();
        fs::write(dir.join("tool-broken.json"), "{not json").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let found = discover(dir);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].as_ref().unwrap().name, "renamed");
        assert_eq!(found[1].as_ref().unwrap().name, "b");
        assert!(found[2].is_err());
    }
}
