//! Cookie-backed sessions.
//!
//! # Responsibilities
//! - Recognize returning clients by their session cookie
//! - Mint new session ids and the matching Set-Cookie header
//! - Expire idle sessions on a periodic sweep
//!
//! # Design Decisions
//! - Session ids are random UUIDv4; nothing is stored beyond expiry
//! - A plain Mutex over the map is enough at this request rate; the
//!   critical section is a single HashMap operation

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

pub struct SessionManager {
    cookie_name: String,
    max_age: Duration,
    sessions: Mutex<HashMap<String, Instant>>,
}

impl SessionManager {
    pub fn new(cookie_name: &str, max_age: Duration) -> Self {
        Self {
            cookie_name: cookie_name.to_string(),
            max_age,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Refresh the session named by the Cookie header, or mint a new one.
    /// Returns a Set-Cookie value when the client needs a (new) cookie.
    pub fn touch(&self, cookie_header: Option<&str>) -> Option<String> {
        let now = Instant::now();
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(id) = cookie_header.and_then(|h| parse_cookie(h, &self.cookie_name)) {
            if let Some(expiry) = sessions.get_mut(id) {
                if *expiry > now {
                    *expiry = now + self.max_age;
                    return None;
                }
                sessions.remove(id);
            }
        }

        let id = Uuid::new_v4().to_string();
        sessions.insert(id.clone(), now + self.max_age);
        Some(format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly",
            self.cookie_name,
            id,
            self.max_age.as_secs()
        ))
    }

    /// Drop every session past its expiry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = sessions.len();
        sessions.retain(|_, expiry| *expiry > now);
        before - sessions.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

/// Pull one cookie's value out of a Cookie request header.
fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_gets_a_cookie() {
        let mgr = SessionManager::new("sid", Duration::from_secs(60));
        let cookie = mgr.touch(None).unwrap();
        assert!(cookie.starts_with("sid="));
        assert!(cookie.contains("Max-Age=60"));
        assert!(cookie.contains("HttpOnly"));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn returning_client_is_recognized() {
        let mgr = SessionManager::new("sid", Duration::from_secs(60));
        let cookie = mgr.touch(None).unwrap();
        let id = cookie.split(';').next().unwrap();

        assert!(mgr.touch(Some(id)).is_none());
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn unknown_cookie_gets_a_fresh_session() {
        let mgr = SessionManager::new("sid", Duration::from_secs(60));
        let cookie = mgr.touch(Some("sid=not-a-real-id")).unwrap();
        assert!(cookie.starts_with("sid="));
        assert!(!cookie.contains("not-a-real-id"));
    }

    #[test]
    fn expired_sessions_are_swept() {
        let mgr = SessionManager::new("sid", Duration::from_secs(0));
        mgr.touch(None).unwrap();
        mgr.touch(None).unwrap();
        assert_eq!(mgr.cleanup_expired(), 2);
        assert_eq!(mgr.len(), 0);
    }

    #[test]
    fn cookie_parsing_handles_multiple_pairs() {
        assert_eq!(parse_cookie("a=1; sid=xyz; b=2", "sid"), Some("xyz"));
        assert_eq!(parse_cookie("a=1", "sid"), None);
    }
}
