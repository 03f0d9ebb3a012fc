use super::storage::SessionStore;
use crate::error::{ChatError, Result};
use crate::models::Session;
use chrono::Local;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};
use tracing::debug;

/// Sessions kept in process memory, keyed by id. Used by the HTTP server.
///
/// Sessions idle for `expiry_minutes` are invisible to lookups and dropped on
/// the next save.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    expiry_minutes: i64,
}

impl MemorySessionStore {
    pub fn new(expiry_minutes: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            expiry_minutes,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_live(&self, session: &Session) -> bool {
        Local::now()
            .signed_duration_since(session.last_updated)
            .num_minutes()
            .abs()
            < self.expiry_minutes
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .write()
            .map_err(|_| ChatError::Session("session map lock poisoned".to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn find_recent_session(&self) -> Option<Session> {
        self.find_latest_session().filter(|session| self.is_live(session))
    }

    fn find_latest_session(&self) -> Option<Session> {
        let sessions = self.sessions.read().ok()?;
        sessions
            .values()
            .max_by_key(|session| session.last_updated)
            .cloned()
    }

    fn load(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .read()
            .ok()?
            .get(session_id)
            .filter(|session| self.is_live(session))
            .cloned()
    }

    fn save_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.write()?;
        let before = sessions.len();
        sessions.retain(|_, existing| self.is_live(existing));
        if sessions.len() != before {
            debug!("dropped {} expired sessions", before - sessions.len());
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn clear_all_sessions(&self) -> Result<usize> {
        let mut sessions = self.write()?;
        let count = sessions.len();
        sessions.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use crate::session::create_new_session;

    fn aged_session(id: &str, age_minutes: i64) -> Session {
        let mut session = create_new_session();
        session.session_id = id.to_string();
        session.last_updated = Local::now() - chrono::Duration::minutes(age_minutes);
        session
    }

    #[test]
    fn test_save_load_clear() {
        let store = MemorySessionStore::new(30);
        let mut session = create_new_session();
        session.messages.push(Message::user("hi"));
        store.save_session(&session).unwrap();

        let loaded = store.load(&session.session_id).unwrap();
        assert_eq!(loaded.messages, session.messages);
        assert!(store.load("other").is_none());
        assert_eq!(store.find_recent_session().unwrap().session_id, session.session_id);

        assert_eq!(store.clear_all_sessions().unwrap(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_sessions_are_evicted() {
        let store = MemorySessionStore::new(30);
        store.save_session(&aged_session("old-1", 90)).unwrap();
        store.save_session(&aged_session("old-2", 60)).unwrap();
        assert!(store.load("old-2").is_none());
        assert!(store.find_recent_session().is_none());

        store.save_session(&aged_session("fresh", 0)).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.load("fresh").is_some());
    }
}
