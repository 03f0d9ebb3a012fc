use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use toolchat::tools::{PluginManifest, ToolRegistry, ToolSettings};

fn settings(temp_dir: &TempDir) -> ToolSettings {
    let workspace_dir = temp_dir.path().join("workspace");
    fs::create_dir_all(&workspace_dir).unwrap();
    ToolSettings {
        tools_dir: temp_dir.path().join("tools"),
        workspace_dir,
        max_file_size_bytes: 1024,
        disabled_builtins: Vec::new(),
    }
}

fn write_manifest(dir: &Path, file_name: &str, contents: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(file_name), contents).unwrap();
}

#[tokio::test]
async fn test_builtin_tools_through_registry() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ToolRegistry::load(settings(&temp_dir));

    assert!(registry.get("add").is_some());
    assert!(registry.get("get_current_time").is_some());
    assert!(registry.get("create_file").is_some());

    let sum = registry.call("add", &json!({"a": 2, "b": 40})).await.unwrap();
    assert_eq!(sum, json!(42));

    let created = registry
        .call(
            "create_file",
            &json!({"filename": "notes", "content": "hello", "filetype": "md"}),
        )
        .await
        .unwrap();
    assert_eq!(created["bytes"], 5);
    let written = fs::read_to_string(temp_dir.path().join("workspace/notes.md")).unwrap();
    assert_eq!(written, "hello");
}

#[tokio::test]
async fn test_create_file_rejects_traversal() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ToolRegistry::load(settings(&temp_dir));

    let err = registry
        .call(
            "create_file",
            &json!({"filename": "../escape", "content": "x", "filetype": "txt"}),
        )
        .await
        .unwrap_err();
    assert!(err.contains("Invalid file name"));
    assert!(!temp_dir.path().join("escape.txt").exists());
}

#[test]
fn test_plugins_discovered_from_directory() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    write_manifest(
        &settings.tools_dir,
        "tool-echo.yaml",
        r#"
description: Echo the arguments back
command: cat
parameters:
  type: object
  properties:
    message:
      type: string
  required: [message]
"#,
    );
    write_manifest(
        &settings.tools_dir,
        "tool-off.json",
        r#"{"enabled": false, "command": "true"}"#,
    );
    write_manifest(&settings.tools_dir, "tool-broken.yaml", "command: [unclosed");
    write_manifest(&settings.tools_dir, "notes.yaml", "command: cat");

    let registry = ToolRegistry::load(settings);
    let echo = registry.get("echo").unwrap();
    assert_eq!(echo.description, "Echo the arguments back");
    assert!(!echo.is_builtin());
    assert!(registry.get("off").is_none());
    assert!(registry.get("broken").is_none());
    assert!(registry.get("notes").is_none());

    assert!(registry
        .validate_arguments("echo", &json!({"message": "hi"}))
        .is_ok());
    assert!(registry.validate_arguments("echo", &json!({})).is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_plugin_receives_json_on_stdin() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    write_manifest(
        &settings.tools_dir,
        "tool-echo_json.yaml",
        "description: Echo\ncommand: cat\n",
    );

    let registry = ToolRegistry::load(settings);
    let result = registry
        .call("echo_json", &json!({"message": "hi", "count": 2}))
        .await
        .unwrap();
    assert_eq!(result, json!({"message": "hi", "count": 2}));
}

#[cfg(unix)]
#[tokio::test]
async fn test_script_plugin_plain_text_output() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    write_manifest(
        &settings.tools_dir,
        "tool-greeter_sh.yaml",
        "interpreter: sh\nscript: |\n  read input\n  echo \"hello from script\"\n",
    );

    let registry = ToolRegistry::load(settings);
    let result = registry.call("greeter_sh", &json!({})).await.unwrap();
    assert_eq!(result, json!("hello from script"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_plugin_reports_stderr() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    write_manifest(
        &settings.tools_dir,
        "tool-fails_sh.yaml",
        "interpreter: sh\nscript: |\n  echo boom >&2\n  exit 3\n",
    );

    let registry = ToolRegistry::load(settings);
    let err = registry.call("fails_sh", &json!({})).await.unwrap_err();
    assert!(err.contains("exited with code 3"));
    assert!(err.contains("boom"));
}

#[test]
fn test_register_and_remove_plugin() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = ToolRegistry::load(settings(&temp_dir));
    let builtin_count = registry.len();

    let manifest = PluginManifest {
        description: Some("Count lines".to_string()),
        command: Some("wc".to_string()),
        args: vec!["-l".to_string(), "{{path}}".to_string()],
        ..PluginManifest::default()
    };

    let path = registry.register("count_lines", &manifest).unwrap();
    assert!(path.ends_with("tool-count_lines.json"));
    assert_eq!(registry.len(), builtin_count + 1);

    // Survives a fresh load from disk
    let reloaded = ToolRegistry::load(registry.settings().clone());
    assert_eq!(
        reloaded.get("count_lines").unwrap().description,
        "Count lines"
    );

    assert!(registry.register("add", &manifest).is_err());
    assert!(registry.register("bad name", &manifest).is_err());

    registry.remove("count_lines").unwrap();
    assert!(registry.get("count_lines").is_none());
    assert!(!path.exists());
    assert!(registry.remove("add").is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_ignoring_stdin_with_large_arguments() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    write_manifest(
        &settings.tools_dir,
        "tool-ignores_input.json",
        r#"{"command": "true"}"#,
    );

    let registry = ToolRegistry::load(settings);
    let big = "x".repeat(200 * 1024);
    let result = registry
        .call("ignores_input", &json!({"payload": big}))
        .await
        .unwrap();
    assert_eq!(result, serde_json::Value::Null);
}

#[cfg(unix)]
#[tokio::test]
async fn test_stdin_write_is_bounded_by_timeout() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    write_manifest(
        &settings.tools_dir,
        "tool-sleepy.json",
        r#"{"command": "sleep", "args": ["5"], "timeout_secs": 1}"#,
    );

    let registry = ToolRegistry::load(settings);
    let big = "x".repeat(1024 * 1024);
    let err = registry
        .call("sleepy", &json!({"payload": big}))
        .await
        .unwrap_err();
    assert!(err.contains("timed out after 1 seconds"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_tool_created_by_model_runs_after_reload() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = ToolRegistry::load(settings(&temp_dir));

    registry
        .call(
            "create_tool",
            &json!({
                "tool_name": "shout",
                "description": "Echo the message back",
                "properties": [{"name": "message", "type": "string", "description": "Text"}],
                "interpreter": "sh",
                "script": "cat\n"
            }),
        )
        .await
        .unwrap();
    assert!(registry.get("shout").is_none());

    registry.reload();
    let tool = registry.get("shout").unwrap();
    assert_eq!(tool.description, "Echo the message back");
    assert!(registry.validate_arguments("shout", &json!({})).is_err());

    let result = registry
        .call("shout", &json!({"message": "hi"}))
        .await
        .unwrap();
    assert_eq!(result, json!({"message": "hi"}));
}
