//! Scriptable collaborators for handler tests. Each double returns whatever it was
//! scripted with and records how it was called.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::handler::Handler;
use crate::identity::flow::{
    Flow, RegistrationFinishRequest, RegistrationFinishResponse, RegistrationStartRequest, RegistrationStartResponse,
};
use crate::identity::{
    AuthzCheck, AuthzError, FlowEngine, FlowError, MembershipError, MembershipProvider, Minted, Object, Organization,
    RequestContext, Session, SessionError, SessionStore, SudoCheck, User, UserDirectory, UserError,
};

pub fn valid_session(user_id: &str) -> Session {
    let now = Utc::now();
    Session {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        authenticated_at: now - Duration::minutes(1),
        expires_at: now + Duration::hours(1),
        created_at: now - Duration::minutes(1),
    }
}

pub fn expired_session(user_id: &str) -> Session {
    let now = Utc::now();
    Session {
        expires_at: now - Duration::minutes(1),
        authenticated_at: now - Duration::hours(2),
        created_at: now - Duration::hours(2),
        ..valid_session(user_id)
    }
}

pub fn flow(start_url: &str, finish_url: &str) -> Flow {
    let now = Utc::now();
    Flow {
        id: Uuid::new_v4(),
        method: "google".into(),
        start_url: start_url.into(),
        finish_url: finish_url.into(),
        nonce: String::new(),
        metadata: HashMap::new(),
        created_at: now,
        expires_at: now + Duration::minutes(10),
    }
}

#[derive(Debug, Clone)]
pub enum MintScript {
    Token(Vec<u8>),
    Disabled,
    Fail,
}

pub struct FakeFlows {
    start: Mutex<Result<RegistrationStartResponse, FlowError>>,
    finish: Mutex<Result<RegistrationFinishResponse, FlowError>>,
    mint: Mutex<MintScript>,
    strategies: Mutex<Vec<String>>,
    start_calls: AtomicUsize,
    finish_calls: AtomicUsize,
    mint_calls: AtomicUsize,
    last_start: Mutex<Option<RegistrationStartRequest>>,
    minted_orgs: Mutex<Vec<String>>,
}

impl FakeFlows {
    fn new() -> Self {
        Self {
            start: Mutex::new(Ok(RegistrationStartResponse { flow: flow("", ""), state: String::new() })),
            finish: Mutex::new(Err(FlowError::FlowInvalid)),
            mint: Mutex::new(MintScript::Disabled),
            strategies: Mutex::new(Vec::new()),
            start_calls: AtomicUsize::new(0),
            finish_calls: AtomicUsize::new(0),
            mint_calls: AtomicUsize::new(0),
            last_start: Mutex::new(None),
            minted_orgs: Mutex::new(Vec::new()),
        }
    }

    pub fn script_start(&self, result: Result<RegistrationStartResponse, FlowError>) { *self.start.lock() = result; }
    pub fn script_start_url(&self, url: &str) {
        self.script_start(Ok(RegistrationStartResponse { flow: flow(url, ""), state: "st".into() }));
    }
    pub fn script_finish(&self, result: Result<RegistrationFinishResponse, FlowError>) { *self.finish.lock() = result; }
    pub fn script_mint(&self, script: MintScript) { *self.mint.lock() = script; }
    pub fn set_strategies(&self, names: &[&str]) {
        *self.strategies.lock() = names.iter().map(|s| s.to_string()).collect();
    }

    pub fn start_calls(&self) -> usize { self.start_calls.load(Ordering::SeqCst) }
    pub fn finish_calls(&self) -> usize { self.finish_calls.load(Ordering::SeqCst) }
    pub fn mint_calls(&self) -> usize { self.mint_calls.load(Ordering::SeqCst) }
    pub fn last_start(&self) -> Option<RegistrationStartRequest> { self.last_start.lock().clone() }
    pub fn minted_orgs(&self) -> Vec<String> { self.minted_orgs.lock().clone() }
}

#[async_trait]
impl FlowEngine for FakeFlows {
    async fn start(&self, _ctx: &RequestContext, request: RegistrationStartRequest) -> Result<RegistrationStartResponse, FlowError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_start.lock() = Some(request);
        self.start.lock().clone()
    }

    async fn finish(&self, _ctx: &RequestContext, _request: RegistrationFinishRequest) -> Result<RegistrationFinishResponse, FlowError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        self.finish.lock().clone()
    }

    fn token(&self, _user: &User, orgs: &[Organization]) -> Result<Minted, FlowError> {
        self.mint_calls.fetch_add(1, Ordering::SeqCst);
        *self.minted_orgs.lock() = orgs.iter().map(|o| o.name.clone()).collect();
        match self.mint.lock().clone() {
            MintScript::Token(bytes) => Ok(Minted::Token(bytes)),
            MintScript::Disabled => Ok(Minted::SigningDisabled),
            MintScript::Fail => Err(FlowError::Internal("signer exploded".into())),
        }
    }

    fn supported_strategies(&self) -> Vec<String> { self.strategies.lock().clone() }

    /// Only `https://app/...` urls are whitelisted.
    fn sanitize_return_to_url(&self, url: &str) -> String {
        if url.starts_with("https://app/") || url.starts_with('/') { url.to_string() } else { String::new() }
    }

    fn sanitize_callback_url(&self, url: &str) -> String {
        if url.is_empty() { "https://warden/callback".to_string() } else { url.to_string() }
    }
}

pub struct FakeSessions {
    extract: Mutex<Result<Session, SessionError>>,
    create_fail: Mutex<Option<SessionError>>,
    delete_fail: Mutex<Option<SessionError>>,
    next_id: Mutex<Uuid>,
    extract_calls: AtomicUsize,
    created: Mutex<Vec<Session>>,
    deleted: Mutex<Vec<Uuid>>,
}

impl FakeSessions {
    fn new() -> Self {
        Self {
            extract: Mutex::new(Err(SessionError::NoSession)),
            create_fail: Mutex::new(None),
            delete_fail: Mutex::new(None),
            next_id: Mutex::new(Uuid::new_v4()),
            extract_calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn script_extract(&self, result: Result<Session, SessionError>) { *self.extract.lock() = result; }
    pub fn fail_create(&self, e: SessionError) { *self.create_fail.lock() = Some(e); }
    pub fn fail_delete(&self, e: SessionError) { *self.delete_fail.lock() = Some(e); }
    pub fn set_next_id(&self, id: Uuid) { *self.next_id.lock() = id; }

    pub fn extract_calls(&self) -> usize { self.extract_calls.load(Ordering::SeqCst) }
    pub fn created(&self) -> Vec<Session> { self.created.lock().clone() }
    pub fn deleted(&self) -> Vec<Uuid> { self.deleted.lock().clone() }
}

#[async_trait]
impl SessionStore for FakeSessions {
    async fn extract_from_context(&self, _ctx: &RequestContext) -> Result<Session, SessionError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.extract.lock().clone()
    }

    async fn create(&self, _ctx: &RequestContext, user_id: &str) -> Result<Session, SessionError> {
        if let Some(e) = self.create_fail.lock().clone() {
            return Err(e);
        }
        let session = Session { id: *self.next_id.lock(), ..valid_session(user_id) };
        self.created.lock().push(session.clone());
        Ok(session)
    }

    async fn delete(&self, _ctx: &RequestContext, session_id: Uuid) -> Result<(), SessionError> {
        if let Some(e) = self.delete_fail.lock().clone() {
            return Err(e);
        }
        self.deleted.lock().push(session_id);
        Ok(())
    }
}

pub struct FakeAuthz {
    result: Mutex<Result<bool, AuthzError>>,
    calls: Mutex<Vec<(Object, String)>>,
}

impl FakeAuthz {
    pub fn script(&self, result: Result<bool, AuthzError>) { *self.result.lock() = result; }
    pub fn calls(&self) -> Vec<(Object, String)> { self.calls.lock().clone() }
}

#[async_trait]
impl AuthzCheck for FakeAuthz {
    async fn check_authz(&self, _ctx: &RequestContext, object: &Object, permission: &str) -> Result<bool, AuthzError> {
        self.calls.lock().push((object.clone(), permission.to_string()));
        self.result.lock().clone()
    }
}

pub struct FakeSudo {
    result: Mutex<Result<bool, AuthzError>>,
    calls: AtomicUsize,
}

impl FakeSudo {
    pub fn script(&self, result: Result<bool, AuthzError>) { *self.result.lock() = result; }
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl SudoCheck for FakeSudo {
    async fn is_sudo(&self, _ctx: &RequestContext, _user_id: &str) -> Result<bool, AuthzError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().clone()
    }
}

#[derive(Default)]
pub struct FakeMemberships {
    orgs: Mutex<Vec<Organization>>,
    fail: Mutex<Option<String>>,
}

impl FakeMemberships {
    pub fn set_orgs(&self, names: &[&str]) {
        *self.orgs.lock() = names
            .iter()
            .map(|n| Organization { id: format!("id-{}", n), name: n.to_string(), ..Default::default() })
            .collect();
    }
    pub fn fail_with(&self, msg: &str) { *self.fail.lock() = Some(msg.to_string()); }
}

#[async_trait]
impl MembershipProvider for FakeMemberships {
    async fn list_by_user(&self, _ctx: &RequestContext, _user_id: &str) -> Result<Vec<Organization>, MembershipError> {
        if let Some(msg) = self.fail.lock().clone() {
            return Err(MembershipError::Provider(msg));
        }
        Ok(self.orgs.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeUsers {
    users: Mutex<HashMap<String, User>>,
    fail: Mutex<Option<UserError>>,
}

impl FakeUsers {
    pub fn add(&self, user: User) { self.users.lock().insert(user.id.clone(), user); }
    pub fn fail_with(&self, e: UserError) { *self.fail.lock() = Some(e); }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn get_by_id(&self, id: &str) -> Result<User, UserError> {
        if let Some(e) = self.fail.lock().clone() {
            return Err(e);
        }
        self.users.lock().get(id).cloned().ok_or(UserError::NotExist)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        self.users.lock().values().find(|u| u.email == email).cloned().ok_or(UserError::NotExist)
    }

    async fn create(&self, user: User) -> Result<User, UserError> {
        self.add(user.clone());
        Ok(user)
    }
}

/// One of each double, shared with the [`Handler`] built from them.
pub struct Doubles {
    pub flows: Arc<FakeFlows>,
    pub sessions: Arc<FakeSessions>,
    pub authz: Arc<FakeAuthz>,
    pub sudo: Arc<FakeSudo>,
    pub memberships: Arc<FakeMemberships>,
    pub users: Arc<FakeUsers>,
}

impl Doubles {
    pub fn new() -> Self {
        Self {
            flows: Arc::new(FakeFlows::new()),
            sessions: Arc::new(FakeSessions::new()),
            authz: Arc::new(FakeAuthz { result: Mutex::new(Ok(false)), calls: Mutex::new(Vec::new()) }),
            sudo: Arc::new(FakeSudo { result: Mutex::new(Ok(false)), calls: AtomicUsize::new(0) }),
            memberships: Arc::new(FakeMemberships::default()),
            users: Arc::new(FakeUsers::default()),
        }
    }

    pub fn handler(&self) -> Handler {
        Handler::new(
            self.flows.clone(),
            self.sessions.clone(),
            self.authz.clone(),
            self.sudo.clone(),
            self.memberships.clone(),
            self.users.clone(),
        )
    }
}
