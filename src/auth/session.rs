//! In-memory login sessions
//! ------------------------
//! Cookie-keyed sessions with a sliding idle TTL and one CSRF token per
//! session. State lives in the server process; a restart logs everyone out,
//! which is acceptable for a self-hosted deployment.

use crate::error::{AppError, AppResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// A freshly issued session: the cookie value and its CSRF token.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub csrf: String,
}

#[derive(Debug, Clone)]
struct Entry {
    user_id: i64,
    csrf: String,
    expires_at: Instant,
}

pub struct SessionManager {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        SessionManager { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Creates a session for `user_id` with fresh random identifiers.
    pub fn issue(&self, user_id: i64) -> AppResult<Session> {
        let id = random_hex::<16>()?;
        let csrf = random_hex::<32>()?;
        let entry = Entry {
            user_id,
            csrf: csrf.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        let mut map = self.entries.write();
        // Opportunistic housekeeping so dead sessions do not pile up.
        let now = Instant::now();
        map.retain(|_, e| e.expires_at > now);
        map.insert(id.clone(), entry);
        Ok(Session { id, csrf })
    }

    /// Resolves a session id to its user, refreshing the idle timer. Expired
    /// sessions are dropped and resolve to None.
    pub fn resolve(&self, session_id: &str) -> Option<i64> {
        let mut map = self.entries.write();
        let now = Instant::now();
        match map.get_mut(session_id) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                Some(entry.user_id)
            }
            Some(_) => {
                map.remove(session_id);
                None
            }
            None => None,
        }
    }

    /// The CSRF token bound to a live session.
    pub fn csrf_for(&self, session_id: &str) -> Option<String> {
        let map = self.entries.read();
        map.get(session_id)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.csrf.clone())
    }

    /// True when `provided` matches the session's CSRF token.
    pub fn csrf_matches(&self, session_id: &str, provided: &str) -> bool {
        match self.csrf_for(session_id) {
            Some(expected) => expected == provided,
            None => false,
        }
    }

    pub fn revoke(&self, session_id: &str) {
        self.entries.write().remove(session_id);
    }

    #[cfg(test)]
    fn force_expire(&self, session_id: &str) {
        if let Some(e) = self.entries.write().get_mut(session_id) {
            e.expires_at = Instant::now() - Duration::from_secs(1);
        }
    }
}

/// `N` random bytes as lowercase hex.
fn random_hex<const N: usize>() -> AppResult<String> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|e| AppError::internal("rng", e.to_string()))?;
    let mut out = String::with_capacity(N * 2);
    for b in &bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    Ok(out)
}
