use serde_json::json;
use tempfile::TempDir;
use toolchat::tools::executor::template_args;
use toolchat::tools::paths::{
    canonicalize_within_base_dir, is_option_like, resolve_new_file_path, safe_resolve_path,
};
use toolchat::tools::PluginManifest;

#[test]
fn test_is_option_like() {
    assert!(is_option_like("-a"));
    assert!(is_option_like("--help"));
    assert!(is_option_like("-"));
    assert!(!is_option_like("path"));
    assert!(!is_option_like("file.txt"));
    assert!(!is_option_like(""));
}

#[test]
fn test_safe_resolve_path_within_base() {
    let temp_dir = TempDir::new().unwrap();
    let base_dir = temp_dir.path();
    let test_file = base_dir.join("test.txt");
    std::fs::write(&test_file, "test").unwrap();

    let resolved = safe_resolve_path("test.txt", base_dir).unwrap();
    assert_eq!(resolved, test_file.canonicalize().unwrap());
}

#[test]
fn test_safe_resolve_path_rejects_traversal() {
    let temp_dir = TempDir::new().unwrap();
    let base_dir = temp_dir.path().join("base");
    std::fs::create_dir_all(&base_dir).unwrap();
    std::fs::write(temp_dir.path().join("secret.txt"), "secret").unwrap();

    let err = safe_resolve_path("../secret.txt", &base_dir).unwrap_err();
    assert!(err.contains("escapes base directory"));
}

#[test]
fn test_safe_resolve_path_rejects_absolute() {
    let temp_dir = TempDir::new().unwrap();
    assert!(safe_resolve_path("/etc/passwd", temp_dir.path()).is_err());
}

#[test]
fn test_safe_resolve_path_rejects_empty_and_long() {
    let temp_dir = TempDir::new().unwrap();
    assert!(safe_resolve_path("", temp_dir.path())
        .unwrap_err()
        .contains("non-empty"));
    assert!(safe_resolve_path(&"a".repeat(5000), temp_dir.path()).is_err());
}

#[test]
fn test_resolve_new_file_path() {
    let temp_dir = TempDir::new().unwrap();
    let base_dir = temp_dir.path();
    std::fs::create_dir_all(base_dir.join("out")).unwrap();

    let resolved = resolve_new_file_path("out/report.md", base_dir).unwrap();
    assert_eq!(
        resolved,
        base_dir.canonicalize().unwrap().join("out").join("report.md")
    );
    assert!(resolve_new_file_path("../report.md", base_dir).is_err());
    assert!(resolve_new_file_path("missing/report.md", base_dir).is_err());
}

#[test]
fn test_canonicalize_within_base_dir() {
    let temp_dir = TempDir::new().unwrap();
    let base_dir = temp_dir.path();
    std::fs::write(base_dir.join("test.txt"), "test").unwrap();

    let canonical = canonicalize_within_base_dir("test.txt", base_dir).unwrap();
    assert!(std::path::Path::new(&canonical).is_absolute());
    assert!(canonical.ends_with("test.txt"));
}

#[test]
fn test_template_args_resolves_path_keys() {
    let temp_dir = TempDir::new().unwrap();
    let base_dir = temp_dir.path();
    std::fs::write(base_dir.join("data.csv"), "a,b").unwrap();

    let args = vec!["--input".to_string(), "{{input_path}}".to_string()];
    let result = template_args(&args, &json!({"input_path": "data.csv"}), base_dir).unwrap();
    assert_eq!(result[0], "--input");
    assert_eq!(
        result[1],
        base_dir.join("data.csv").canonicalize().unwrap().to_string_lossy()
    );
}

#[test]
fn test_template_args_rejects_option_like_paths() {
    let temp_dir = TempDir::new().unwrap();
    let args = vec!["{{path}}".to_string()];
    let err = template_args(&args, &json!({"path": "--version"}), temp_dir.path()).unwrap_err();
    assert!(err.contains("must not start with '-'"));
}

#[test]
fn test_template_args_missing_argument() {
    let temp_dir = TempDir::new().unwrap();
    let args = vec!["{{query}}".to_string()];
    let err = template_args(&args, &json!({}), temp_dir.path()).unwrap_err();
    assert!(err.contains("query"));
}

#[test]
fn test_manifest_defaults() {
    let manifest: PluginManifest = serde_yaml::from_str(
        r#"
command: "wc"
args: ["-l", "{{path}}"]
"#,
    )
    .unwrap();

    assert!(manifest.enabled);
    assert!(manifest.stdin_json);
    assert_eq!(manifest.timeout_secs, 30);
    assert!(manifest.validate().is_ok());
}
