use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use serde_json::{json, Value};
use std::fs;

use super::manifest::{
    is_valid_tool_name, manifest_file_name, PluginManifest, MANIFEST_EXTENSIONS, MANIFEST_PREFIX,
};
use super::paths::{resolve_new_file_path, stringify_path};
use super::registry::{check_plugin, ToolSettings};

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_TYPES: &[&str] = &["py", "txt", "csv", "md", "json"];
const STARTER_INTERPRETER: &str = "python3";
const PYTHON_STARTER: &str = "import json
import sys

args = json.load(sys.stdin)
print(json.dumps({\"tool\": \"{name}\", \"received\": args}))
";

/// Tools implemented in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    Add,
    CurrentTime,
    CreateFile,
    CreateTool,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 4] = [
        BuiltinTool::Add,
        BuiltinTool::CurrentTime,
        BuiltinTool::CreateFile,
        BuiltinTool::CreateTool,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::Add => "add",
            BuiltinTool::CurrentTime => "get_current_time",
            BuiltinTool::CreateFile => "create_file",
            BuiltinTool::CreateTool => "create_tool",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinTool::Add => "Add two numbers a and b",
            BuiltinTool::CurrentTime => {
                "Get the current time, locally, in UTC or at a fixed offset like +02:00"
            }
            BuiltinTool::CreateFile => {
                "Create a text file in the workspace from a file name (without extension), its content and a file type"
            }
            BuiltinTool::CreateTool => {
                "Create a new plugin tool from a name, a description and its input properties. It becomes available once tools are reloaded"
            }
        }
    }

    pub fn input_schema(&self) -> Value {
        match self {
            BuiltinTool::Add => json!({
                "type": "object",
                "properties": {
                    "a": {"type": "number", "description": "First number"},
                    "b": {"type": "number", "description": "Second number"}
                },
                "required": ["a", "b"]
            }),
            BuiltinTool::CurrentTime => json!({
                "type": "object",
                "properties": {
                    "timezone": {
                        "type": "string",
                        "description": "'local', 'UTC' or a fixed offset such as '+02:00'",
                        "default": "local"
                    },
                    "format": {
                        "type": "string",
                        "description": "strftime format string",
                        "default": DEFAULT_TIME_FORMAT
                    }
                }
            }),
            BuiltinTool::CreateFile => json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "File name WITHOUT extension",
                        "examples": ["my_program"]
                    },
                    "content": {"type": "string", "description": "Raw file content"},
                    "filetype": {
                        "type": "string",
                        "description": "File extension",
                        "default": "py",
                        "enum": FILE_TYPES
                    }
                },
                "required": ["filename", "content"]
            }),
            BuiltinTool::CreateTool => json!({
                "type": "object",
                "properties": {
                    "tool_name": {
                        "type": "string",
                        "description": "Name of the new tool (letters, digits, '_' or '-')",
                        "examples": ["diagram_tool"]
                    },
                    "description": {
                        "type": "string",
                        "description": "Brief description of what the new tool does"
                    },
                    "properties": {
                        "type": "array",
                        "description": "Input properties of the new tool",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "type": {"type": "string", "description": "JSON schema type, e.g. string or number"},
                                "description": {"type": "string"},
                                "examples": {"type": "array", "items": {"type": "string"}}
                            },
                            "required": ["name", "type", "description"]
                        }
                    },
                    "interpreter": {
                        "type": "string",
                        "description": "Interpreter for the script",
                        "default": STARTER_INTERPRETER
                    },
                    "script": {
                        "type": "string",
                        "description": "Script source; it receives the arguments as JSON on stdin. Defaults to a Python starter that echoes them"
                    }
                },
                "required": ["tool_name", "description", "properties"]
            }),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn call(&self, args: &Value, settings: &ToolSettings) -> Result<Value, String> {
        match self {
            BuiltinTool::Add => add(args),
            BuiltinTool::CurrentTime => current_time(args),
            BuiltinTool::CreateFile => create_file(args, settings),
            BuiltinTool::CreateTool => create_tool(args, settings),
        }
    }
}

fn add(args: &Value) -> Result<Value, String> {
    let a = args.get("a").ok_or("Missing required argument: a")?;
    let b = args.get("b").ok_or("Missing required argument: b")?;

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Ok(json!(sum));
        }
    }

    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(json!(x + y)),
        _ => Err("Arguments a and b must be numbers".to_string()),
    }
}

fn current_time(args: &Value) -> Result<Value, String> {
    let timezone = args
        .get("timezone")
        .and_then(|v| v.as_str())
        .unwrap_or("local");
    let format = args
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_TIME_FORMAT);

    // chrono panics while displaying an invalid format, so reject it first
    let items: Vec<Item> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(format!("Invalid time format: {}", format));
    }

    let (now, label): (DateTime<FixedOffset>, String) = match timezone {
        "local" => (Local::now().fixed_offset(), "local time".to_string()),
        "UTC" | "utc" | "Z" => (Utc::now().fixed_offset(), "UTC".to_string()),
        offset => {
            let offset = parse_offset(offset)?;
            (
                offset.from_utc_datetime(&Utc::now().naive_utc()),
                timezone.to_string(),
            )
        }
    };

    Ok(json!({
        "time": now.format_with_items(items.into_iter()).to_string(),
        "timezone": label,
        "timestamp": now.timestamp(),
    }))
}

/// `+HH:MM`, `-HH:MM` or `+HHMM`.
fn parse_offset(value: &str) -> Result<FixedOffset, String> {
    let invalid = || {
        format!(
            "Unsupported timezone '{}': use 'local', 'UTC' or an offset like +02:00",
            value
        )
    };

    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

fn create_file(args: &Value, settings: &ToolSettings) -> Result<Value, String> {
    let filename = args
        .get("filename")
        .and_then(|v| v.as_str())
        .ok_or("Missing required argument: filename")?;
    let content = args
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or("Missing required argument: content")?;
    let filetype = args
        .get("filetype")
        .and_then(|v| v.as_str())
        .unwrap_or("py");

    if filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\'])
        || filename.contains("..")
    {
        return Err(format!("Invalid file name: '{}'", filename));
    }
    if !FILE_TYPES.contains(&filetype) {
        return Err(format!(
            "Unsupported file type '{}' (expected one of: {})",
            filetype,
            FILE_TYPES.join(", ")
        ));
    }
    if content.len() as u64 > settings.max_file_size_bytes {
        return Err(format!(
            "Content too large: {} bytes (max: {} bytes)",
            content.len(),
            settings.max_file_size_bytes
        ));
    }

    fs::create_dir_all(&settings.workspace_dir)
        .map_err(|e| format!("Failed to create workspace directory: {}", e))?;
    let path = resolve_new_file_path(
        &format!("{}.{}", filename, filetype),
        &settings.workspace_dir,
    )?;
    fs::write(&path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    Ok(json!({
        "path": stringify_path(&path)?,
        "bytes": content.len(),
    }))
}

fn create_tool(args: &Value, settings: &ToolSettings) -> Result<Value, String> {
    let name = args
        .get("tool_name")
        .and_then(|v| v.as_str())
        .ok_or("Missing required argument: tool_name")?;
    let description = args
        .get("description")
        .and_then(|v| v.as_str())
        .ok_or("Missing required argument: description")?;
    let properties = args
        .get("properties")
        .and_then(|v| v.as_array())
        .ok_or("Missing required argument: properties")?;

    if !is_valid_tool_name(name) {
        return Err(format!(
            "Invalid tool name '{}': use 1-64 letters, digits, '_' or '-'",
            name
        ));
    }
    if BuiltinTool::from_name(name).is_some() {
        return Err(format!("'{}' is a built-in tool", name));
    }
    let existing = MANIFEST_EXTENSIONS
        .iter()
        .map(|ext| settings.tools_dir.join(format!("{}{}.{}", MANIFEST_PREFIX, name, ext)))
        .find(|path| path.exists());
    if let Some(path) = existing {
        return Err(format!("Tool '{}' already exists at {}", name, path.display()));
    }

    let mut schema_properties = serde_json::Map::new();
    let mut required = Vec::new();
    for property in properties {
        let prop_name = property
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or("Every property needs a 'name'")?;
        let mut entry = json!({
            "type": property.get("type").and_then(|v| v.as_str()).unwrap_or("string"),
            "description": property.get("description").and_then(|v| v.as_str()).unwrap_or(""),
        });
        if let Some(examples) = property.get("examples").filter(|e| e.is_array()) {
            entry["examples"] = examples.clone();
        }
        schema_properties.insert(prop_name.to_string(), entry);
        required.push(json!(prop_name));
    }

    let interpreter = args
        .get("interpreter")
        .and_then(|v| v.as_str())
        .unwrap_or(STARTER_INTERPRETER);
    let script = match args.get("script").and_then(|v| v.as_str()) {
        Some(script) => script.to_string(),
        None if interpreter == STARTER_INTERPRETER => PYTHON_STARTER.replace("{name}", name),
        None => {
            return Err(format!(
                "A script is required for interpreter '{}'",
                interpreter
            ))
        }
    };

    let manifest = PluginManifest {
        description: Some(description.to_string()),
        parameters: Some(json!({
            "type": "object",
            "properties": schema_properties,
            "required": required,
        })),
        interpreter: Some(interpreter.to_string()),
        script: Some(script),
        ..PluginManifest::default()
    };
    check_plugin(name, &manifest)?;

    fs::create_dir_all(&settings.tools_dir)
        .map_err(|e| format!("Failed to create tools directory: {}", e))?;
    let path = settings.tools_dir.join(manifest_file_name(name));
    let contents = serde_json::to_string_pretty(&manifest)
        .map_err(|e| format!("Failed to serialize manifest: {}", e))?;
    fs::write(&path, contents).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    Ok(json!({
        "tool": name,
        "path": path.to_string_lossy(),
        "status": "created; reload tools to make it available",
    }))
}
