//! Session table: opaque session ids bound to an authenticated user.
//!
//! A linear `Vec` behind a `parking_lot::Mutex` — acceptable because
//! `max_users` bounds how many concurrent sessions can plausibly exist
//! (spec.md §4.6). `parking_lot` is the lock the teacher reaches for
//! throughout `session.rs`/`channel.rs`.

use parking_lot::Mutex;
use rand::Rng;

use crate::container::record::UserRecord;

/// A snapshot of the authenticated user bound to a session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub username: String,
    pub role_is_admin: bool,
    pub created_at: u64,
}

/// Two concatenated decimal renderings of random 63-bit integers — the id
/// space is large enough that collisions are not a design concern
/// (spec.md §4.5).
fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let part1: u64 = rng.gen_range(0..(1u64 << 63));
    let part2: u64 = rng.gen_range(0..(1u64 << 63));
    format!("{part1}{part2}")
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<Vec<SessionInfo>>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore {
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Creates and stores a new session for `user`, returning its id.
    pub fn create(&self, user: &UserRecord, created_at: u64) -> SessionInfo {
        let info = SessionInfo {
            session_id: generate_session_id(),
            username: user.username_str(),
            role_is_admin: user.role == crate::container::record::ROLE_ADMIN,
            created_at,
        };
        self.sessions.lock().push(info.clone());
        info
    }

    /// Removes the session with the given id. Returns `true` if found.
    pub fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|s| s.session_id != session_id);
        sessions.len() != before
    }

    pub fn find(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::record::{string_into_fixed, ROLE_ADMIN, SECRET_MAX, USERNAME_MAX};

    fn admin_user() -> UserRecord {
        UserRecord {
            username: string_into_fixed::<USERNAME_MAX>("admin"),
            password_hash: string_into_fixed::<SECRET_MAX>("admin"),
            role: ROLE_ADMIN,
            is_active: 1,
            _pad: [0; 6],
            created_at: 0,
        }
    }

    #[test]
    fn login_then_logout() {
        let store = SessionStore::new();
        let info = store.create(&admin_user(), 0);
        assert!(store.find(&info.session_id).is_some());
        assert!(store.remove(&info.session_id));
        assert!(store.find(&info.session_id).is_none());
    }

    #[test]
    fn unknown_session_is_not_found() {
        let store = SessionStore::new();
        assert!(store.find("nope").is_none());
        assert!(!store.remove("nope"));
    }
}
