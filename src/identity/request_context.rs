use std::collections::BTreeMap;

/// Response metadata key carrying a redirect target; becomes `Location` at the HTTP edge.
pub const LOCATION_KEY: &str = "gateway-location";
/// Response metadata key carrying a freshly created session id; becomes the session cookie.
pub const SESSION_ID_KEY: &str = "gateway-session-id";
/// Response metadata key instructing the edge to expire the session cookie.
pub const SESSION_DELETE_KEY: &str = "gateway-session-delete";
/// Response metadata key carrying the signed user context token.
pub const USER_TOKEN_KEY: &str = "gateway-user-token";

/// Inbound, per-call context. Built by the transport layer; read-only for the core.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw session id taken from the session cookie, if the client sent one.
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self { session_id: Some(session_id.into()), request_id: None }
    }
}

/// Outbound side channel written by handlers next to the response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    entries: BTreeMap<&'static str, String>,
}

impl ResponseMetadata {
    pub fn new() -> Self { Self::default() }

    pub fn set(&mut self, key: &'static str, value: impl Into<String>) {
        self.entries.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn contains(&self, key: &str) -> bool { self.entries.contains_key(key) }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn set_redirect(&mut self, url: &str) { self.set(LOCATION_KEY, url); }

    pub fn set_session_id(&mut self, session_id: &str) { self.set(SESSION_ID_KEY, session_id); }

    pub fn delete_session(&mut self) { self.set(SESSION_DELETE_KEY, "true"); }

    pub fn set_user_token(&mut self, token: &str) { self.set(USER_TOKEN_KEY, token); }

    /// Copy every entry of `other` into `self`, overwriting duplicates.
    pub fn merge(&mut self, other: ResponseMetadata) {
        self.entries.extend(other.entries);
    }
}
