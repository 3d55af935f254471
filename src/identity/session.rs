use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::tprintln;

use super::request_context::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub authenticated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Only a valid session authenticates a caller.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.user_id.is_empty() && self.expires_at > now && self.authenticated_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no session")]
    NoSession,
    #[error("malformed session: {0}")]
    Malformed(String),
    #[error("session store: {0}")]
    Store(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn extract_from_context(&self, ctx: &RequestContext) -> Result<Session, SessionError>;
    async fn create(&self, ctx: &RequestContext, user_id: &str) -> Result<Session, SessionError>;
    async fn delete(&self, ctx: &RequestContext, session_id: Uuid) -> Result<(), SessionError>;
}

/// Process-local session store keyed by session id, with a per-user index.
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<Uuid, Session>>,
    user_index: RwLock<HashMap<String, HashSet<Uuid>>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self { Self::new(Duration::from_secs(24 * 60 * 60)) }
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: RwLock::new(HashMap::new()), user_index: RwLock::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }

    pub fn sessions_for_user(&self, user_id: &str) -> usize {
        self.user_index.read().get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Drop every session whose validity window has passed. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<(Uuid, String)> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.expires_at <= now)
            .map(|s| (s.id, s.user_id.clone()))
            .collect();
        if expired.is_empty() { return 0; }
        let mut map = self.sessions.write();
        let mut idx = self.user_index.write();
        for (id, uid) in expired.iter() {
            map.remove(id);
            if let Some(set) = idx.get_mut(uid) { set.remove(id); }
        }
        expired.len()
    }

    /// Insert a prepared session as-is. Useful for seeding expired or future sessions.
    pub fn insert(&self, session: Session) {
        self.user_index.write().entry(session.user_id.clone()).or_default().insert(session.id);
        self.sessions.write().insert(session.id, session);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn extract_from_context(&self, ctx: &RequestContext) -> Result<Session, SessionError> {
        let Some(raw) = ctx.session_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(SessionError::NoSession);
        };
        let id = Uuid::parse_str(raw).map_err(|e| SessionError::Malformed(e.to_string()))?;
        self.sessions.read().get(&id).cloned().ok_or(SessionError::NoSession)
    }

    async fn create(&self, _ctx: &RequestContext, user_id: &str) -> Result<Session, SessionError> {
        if user_id.is_empty() {
            return Err(SessionError::Store("empty user id".to_string()));
        }
        let ttl = chrono::Duration::from_std(self.ttl).map_err(|e| SessionError::Store(e.to_string()))?;
        let now = Utc::now();
        let sess = Session {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            authenticated_at: now,
            expires_at: now + ttl,
            created_at: now,
        };
        self.insert(sess.clone());
        tprintln!("session.create user={} sid={} ttl_secs={}", user_id, sess.id, self.ttl.as_secs());
        Ok(sess)
    }

    async fn delete(&self, _ctx: &RequestContext, session_id: Uuid) -> Result<(), SessionError> {
        let Some(sess) = self.sessions.write().remove(&session_id) else {
            return Err(SessionError::NoSession);
        };
        if let Some(set) = self.user_index.write().get_mut(&sess.user_id) { set.remove(&session_id); }
        tprintln!("session.delete user={} sid={}", sess.user_id, session_id);
        Ok(())
    }
}
