use std::path::{Component, Path, PathBuf};

/// Resolve a user-provided path inside `base_dir`, rejecting anything that
/// escapes it (`..`, absolute paths, symlinks pointing outside).
pub fn safe_resolve_path(user_path: &str, base_dir: &Path) -> Result<PathBuf, String> {
    if user_path.is_empty() || user_path.len() > 4096 {
        return Err("Invalid path: path must be non-empty and under 4096 characters".to_string());
    }

    let resolved = base_dir
        .join(user_path)
        .canonicalize()
        .map_err(|e| format!("Failed to resolve path: {}", e))?;

    let base_canonical = base_dir
        .canonicalize()
        .map_err(|e| format!("Failed to canonicalize base directory: {}", e))?;

    if !resolved.starts_with(&base_canonical) {
        return Err(format!(
            "Path traversal detected: '{}' escapes base directory",
            user_path
        ));
    }

    Ok(resolved)
}

/// Like [`safe_resolve_path`] for a file that may not exist yet: the parent
/// must exist inside `base_dir` and the last component must be a plain name.
pub fn resolve_new_file_path(user_path: &str, base_dir: &Path) -> Result<PathBuf, String> {
    let path = Path::new(user_path);
    let file_name = match path.components().last() {
        Some(Component::Normal(name)) => name.to_owned(),
        _ => return Err(format!("Invalid file path: '{}'", user_path)),
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => safe_resolve_path(&p.to_string_lossy(), base_dir)?,
        _ => base_dir
            .canonicalize()
            .map_err(|e| format!("Failed to canonicalize base directory: {}", e))?,
    };

    Ok(parent.join(file_name))
}

pub fn canonicalize_within_base_dir(user_path: &str, base_dir: &Path) -> Result<String, String> {
    let resolved = safe_resolve_path(user_path, base_dir)?;
    stringify_path(&resolved)
}

pub fn is_option_like(s: &str) -> bool {
    s.starts_with('-')
}

pub fn stringify_path(p: &Path) -> Result<String, String> {
    p.to_str()
        .ok_or_else(|| format!("Path contains invalid UTF-8: {}", p.display()))
        .map(|s| s.to_string())
}
