use super::storage::SessionStore;
use crate::error::{ChatError, Result};
use crate::models::Session;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SESSION_EXPIRY_MINUTES: i64 = 30;

/// Sessions stored as `session-<id>.json` files.
pub struct FilesystemSessionStore {
    dir: PathBuf,
    expiry_minutes: i64,
}

impl FilesystemSessionStore {
    /// Store under `~/.cache/toolchat`.
    pub fn new(expiry_minutes: i64) -> Result<Self> {
        let dir = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .ok_or_else(|| ChatError::Session("could not determine a cache directory".to_string()))?
            .join("toolchat");
        Ok(Self::with_dir(dir, expiry_minutes))
    }

    pub fn with_dir(dir: impl Into<PathBuf>, expiry_minutes: i64) -> Self {
        Self {
            dir: dir.into(),
            expiry_minutes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("session-{}.json", session_id))
    }

    fn is_session_file(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("session-"))
    }

    /// All readable sessions, most recent first.
    fn read_sessions(&self) -> Vec<(PathBuf, Session)> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut sessions: Vec<(PathBuf, Session)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| Self::is_session_file(path))
            .filter_map(|path| {
                let content = fs::read_to_string(&path).ok()?;
                match serde_json::from_str::<Session>(&content) {
                    Ok(session) => Some((path, session)),
                    Err(e) => {
                        warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();

        sessions.sort_by(|a, b| b.1.last_updated.cmp(&a.1.last_updated));
        sessions
    }
}

impl SessionStore for FilesystemSessionStore {
    fn find_recent_session(&self) -> Option<Session> {
        let now = Local::now();
        let mut recent = None;

        for (path, session) in self.read_sessions() {
            let age_minutes = now.signed_duration_since(session.last_updated).num_minutes();
            if age_minutes.abs() < self.expiry_minutes {
                // Newest first, so the first live session is the one to resume
                if recent.is_none() {
                    recent = Some(session);
                }
                continue;
            }

            debug!("session {} expired ({} minutes old)", session.session_id, age_minutes);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove expired session {}: {}", path.display(), e);
            }
        }

        recent
    }

    fn find_latest_session(&self) -> Option<Session> {
        self.read_sessions().into_iter().next().map(|(_, session)| session)
    }

    fn load(&self, session_id: &str) -> Option<Session> {
        let content = fs::read_to_string(self.session_path(session_id)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn save_session(&self, session: &Session) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(session)?;
        fs::write(self.session_path(&session.session_id), content)?;
        Ok(())
    }

    fn clear_all_sessions(&self) -> Result<usize> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Ok(0);
        };

        let mut removed = 0;
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if Self::is_session_file(&path) {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
