use crate::config::{expand_env_var_in_string, expand_env_vars};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::manifest::{script_extension, PluginKind, PluginManifest};
use super::paths::{canonicalize_within_base_dir, is_option_like, safe_resolve_path};
use super::registry::ToolSettings;

static TEMPLATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid template pattern"));

/// Everything needed to spawn one plugin invocation.
struct Invocation {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    pipe_stdin: bool,
}

/// Run a plugin process and return its result.
///
/// Arguments are written to stdin as one JSON document. Stdout that parses as
/// JSON is returned as that value, anything else as a trimmed string.
pub async fn execute_plugin(
    name: &str,
    manifest: &PluginManifest,
    arguments: &Value,
    settings: &ToolSettings,
) -> Result<Value, String> {
    let invocation = match manifest.kind()? {
        PluginKind::Script => prepare_script(name, manifest, settings)?,
        PluginKind::Command => prepare_command(name, manifest, arguments, settings)?,
    };

    let stdout = run(name, manifest, &invocation, arguments).await?;
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())))
}

fn prepare_script(
    name: &str,
    manifest: &PluginManifest,
    settings: &ToolSettings,
) -> Result<Invocation, String> {
    let interpreter = manifest
        .resolved_interpreter()
        .ok_or_else(|| format!("Tool '{}' (type: script) requires 'interpreter'", name))?;

    let script_path = if let Some(ref inline) = manifest.script {
        let dir = std::env::temp_dir().join("toolchat-scripts");
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create temp directory: {}", e))?;
        let path = dir.join(format!("{}.{}", name, script_extension(&interpreter)));
        fs::write(&path, inline).map_err(|e| format!("Failed to write script file: {}", e))?;
        debug!("[tools] wrote inline script for {} to {}", name, path.display());
        path
    } else if let Some(ref relative) = manifest.script_path {
        safe_resolve_path(relative, &settings.tools_dir)?
    } else {
        return Err(format!(
            "Tool '{}' (type: script) requires 'script' or 'script_path'",
            name
        ));
    };

    let mut args: Vec<String> = manifest.args.iter().map(|a| expand_env_var_in_string(a)).collect();
    args.insert(0, script_path.to_string_lossy().into_owned());

    Ok(Invocation {
        program: interpreter,
        args,
        working_dir: working_dir(manifest, settings)?,
        pipe_stdin: true,
    })
}

fn prepare_command(
    name: &str,
    manifest: &PluginManifest,
    arguments: &Value,
    settings: &ToolSettings,
) -> Result<Invocation, String> {
    let command = manifest
        .command
        .as_deref()
        .ok_or_else(|| format!("Tool '{}' (type: command) requires 'command'", name))?;

    let expanded: Vec<String> = manifest.args.iter().map(|a| expand_env_var_in_string(a)).collect();

    Ok(Invocation {
        program: expand_env_var_in_string(command),
        args: template_args(&expanded, arguments, &settings.workspace_dir)?,
        working_dir: working_dir(manifest, settings)?,
        pipe_stdin: manifest.stdin_json,
    })
}

fn working_dir(manifest: &PluginManifest, settings: &ToolSettings) -> Result<PathBuf, String> {
    match manifest.working_dir {
        Some(ref wd) => safe_resolve_path(wd, &settings.tools_dir),
        None => Ok(settings.workspace_dir.clone()),
    }
}

async fn run(
    name: &str,
    manifest: &PluginManifest,
    invocation: &Invocation,
    arguments: &Value,
) -> Result<String, String> {
    let start_time = Instant::now();
    let env_vars = expand_env_vars(&manifest.env);

    debug!(
        "[tools] run {}: {} {} (cwd={}, timeout={}s)",
        name,
        invocation.program,
        invocation.args.join(" "),
        invocation.working_dir.display(),
        manifest.timeout_secs
    );

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .current_dir(&invocation.working_dir)
        .envs(&env_vars)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if invocation.pipe_stdin {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("Failed to start '{}': {}", invocation.program, e))?;

    let stdin_payload = if invocation.pipe_stdin {
        let args_json = serde_json::to_vec(arguments)
            .map_err(|e| format!("Failed to serialize arguments: {}", e))?;
        child.stdin.take().map(|stdin| (stdin, args_json))
    } else {
        None
    };

    // A plugin may exit without reading its input; that is not a failure of
    // the call, its exit status decides.
    let feed_stdin = async move {
        let Some((mut stdin, payload)) = stdin_payload else {
            return Ok(());
        };
        // stdin is dropped at the end of this block so the plugin sees EOF
        match stdin.write_all(&payload).await {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            result => result,
        }
    };

    let (written, output) = timeout(
        Duration::from_secs(manifest.timeout_secs),
        async { tokio::join!(feed_stdin, child.wait_with_output()) },
    )
    .await
    .map_err(|_| format!("Tool '{}' timed out after {} seconds", name, manifest.timeout_secs))?;

    written.map_err(|e| format!("Failed to write to stdin: {}", e))?;
    let output = output.map_err(|e| format!("Failed to wait for process: {}", e))?;

    debug!(
        "[tools] done {}: exit_code={}, duration={:.2}s, output_size={} bytes",
        name,
        output.status.code().unwrap_or(-1),
        start_time.elapsed().as_secs_f64(),
        output.stdout.len()
    );

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "Tool '{}' exited with code {}: {}",
            name,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        ));
    }

    if output.stdout.len() as u64 > manifest.max_output_bytes {
        return Err(format!(
            "Tool '{}' output too large: {} bytes (max: {} bytes)",
            name,
            output.stdout.len(),
            manifest.max_output_bytes
        ));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| format!("Tool '{}' output is not valid UTF-8: {}", name, e))
}

/// Substitute `{{key}}` placeholders with argument values.
///
/// A placeholder whose argument is missing is an error. Path-like keys
/// (`path`, `*_path`) must not look like options and are resolved inside
/// `workspace_dir`.
pub fn template_args(
    args: &[String],
    arguments: &Value,
    workspace_dir: &Path,
) -> Result<Vec<String>, String> {
    args.iter()
        .map(|arg| {
            let mut failure = None;
            let replaced = TEMPLATE_PATTERN.replace_all(arg, |caps: &regex::Captures| {
                let key = &caps[1];
                let value = match arguments.get(key).and_then(value_to_arg) {
                    Some(value) => value,
                    None => {
                        failure = Some(format!("Missing argument '{}' for template", key));
                        return String::new();
                    }
                };
                if !is_path_key(key) {
                    return value;
                }
                if is_option_like(&value) {
                    failure = Some(format!(
                        "Argument '{}' must not start with '-': {}",
                        key, value
                    ));
                    return String::new();
                }
                match canonicalize_within_base_dir(&value, workspace_dir) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        failure = Some(e);
                        String::new()
                    }
                }
            });
            match failure {
                Some(e) => Err(e),
                None => Ok(replaced.into_owned()),
            }
        })
        .collect()
}

fn is_path_key(key: &str) -> bool {
    key == "path" || key.ends_with("_path")
}

fn value_to_arg(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
