use crate::error::Result;
use crate::models::Session;

/// Trait for session storage backends
pub trait SessionStore: Send + Sync {
    /// Most recent session that has not expired.
    fn find_recent_session(&self) -> Option<Session>;

    /// Most recent session regardless of age.
    fn find_latest_session(&self) -> Option<Session>;

    fn load(&self, session_id: &str) -> Option<Session>;

    fn save_session(&self, session: &Session) -> Result<()>;

    /// Returns how many sessions were removed.
    fn clear_all_sessions(&self) -> Result<usize>;
}
