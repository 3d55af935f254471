//!
//! warden HTTP server
//! ------------------
//! Axum-based HTTP surface over the identity core.
//!
//! Responsibilities:
//! - Build a [`RequestContext`] from the session cookie and request id.
//! - Dispatch to the orchestrator and gate on [`handler::Handler`].
//! - Translate response metadata (gateway keys) into cookies, `Location` and token headers.
//! - Wire the in-memory reference collaborators and run the expired-flow sweeper.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{Config, SessionConfig};
use crate::error::{AppError, AppResult};
use crate::identity::registration::{RegistrationConfig, RegistrationService};
use crate::identity::request_context::{LOCATION_KEY, SESSION_DELETE_KEY, SESSION_ID_KEY, USER_TOKEN_KEY};
use crate::identity::{
    ContextTokenSigner, ContextTokenVerifier, DevStrategy, MemoryMemberships, MemoryRelations, MemorySessionStore,
    MemoryUsers, RequestContext, ResponseMetadata,
};

pub mod authn;
pub mod authz;
pub mod context_token;
pub mod handler;
#[cfg(test)]
pub(crate) mod test_doubles;

use authn::{AuthCallbackRequest, AuthenticateRequest};
use authz::CheckResourcePermissionRequest;
use handler::Handler;

/// Header carrying the signed context token to the caller.
pub const USER_TOKEN_HEADER: &str = "x-user-token";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Handler,
    pub config: Arc<Config>,
    /// Public half of the context token key; `None` when signing is disabled.
    pub token_verifier: Option<ContextTokenVerifier>,
}

/// Everything [`wire`] builds. The concrete stores are exposed so callers can seed them.
pub struct Wiring {
    pub state: AppState,
    pub registration: Arc<RegistrationService>,
    pub sessions: Arc<MemorySessionStore>,
    pub users: Arc<MemoryUsers>,
    pub memberships: Arc<MemoryMemberships>,
    pub relations: Arc<MemoryRelations>,
}

/// Build the collaborator set from configuration using the in-memory reference stores.
pub fn wire(config: Config) -> anyhow::Result<Wiring> {
    let sessions = Arc::new(MemorySessionStore::new(config.session.ttl));
    let users = Arc::new(MemoryUsers::new());
    let memberships = Arc::new(MemoryMemberships::new());

    let signer = match config.token.key.as_deref() {
        Some(raw) => Some(
            ContextTokenSigner::from_key_material(raw, config.token.issuer.clone(), config.token.validity)
                .context("WARDEN_TOKEN_KEY is not usable")?,
        ),
        None => None,
    };
    let token_verifier = signer.as_ref().map(ContextTokenSigner::verifier);
    let mut registration = RegistrationService::new(
        users.clone(),
        RegistrationConfig {
            authorized_redirect_urls: config.authorized_redirect_urls.clone(),
            callback_urls: config.callback_urls.clone(),
            flow_ttl: config.flow_ttl,
        },
    )
    .with_signer(signer);
    if config.dev_login {
        registration = registration.with_strategy(Arc::new(DevStrategy::new(config.dev_authorize_url.clone())));
    }
    let registration = Arc::new(registration);

    let relations = Arc::new(MemoryRelations::new(sessions.clone(), users.clone()));
    for email in &config.superusers {
        relations.add_superuser(email);
    }

    let handler = Handler::new(
        registration.clone(),
        sessions.clone(),
        relations.clone(),
        relations.clone(),
        memberships.clone(),
        users.clone(),
    );
    Ok(Wiring {
        state: AppState { handler, config: Arc::new(config), token_verifier },
        registration,
        sessions,
        users,
        memberships,
        relations,
    })
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { "warden ok" }))
        .route("/v1/auth", get(list_auth_strategies))
        .route("/v1/auth/keys", get(list_token_keys))
        .route("/v1/auth/register/{strategy}", get(authenticate))
        .route("/v1/auth/callback", get(auth_callback_query).post(auth_callback_json))
        .route("/v1/auth/logout", get(auth_logout).post(auth_logout))
        .route("/v1/permissions/check", post(check_resource_permission));
    if state.config.dev_login {
        app = app.route("/dev/authorize", get(dev_authorize));
    }
    app.with_state(state)
}

/// Start the warden HTTP server with the given configuration.
pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    let port = config.http_port;
    let sweep = config.flow_sweep_interval;
    let wiring = wire(config)?;

    // Background sweeper for expired flows and sessions
    if !sweep.is_zero() {
        let registration = wiring.registration.clone();
        let sessions = wiring.sessions.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(sweep).await;
                let flows = registration.purge_expired_flows();
                let sess = sessions.purge_expired();
                if flows + sess > 0 {
                    tracing::debug!(flows, sessions = sess, "expired_sweep");
                }
            }
        });
    } else {
        info!("expired_sweep" = false, "background sweeper disabled");
    }

    let app = router(wiring.state);
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({"status": "error", "code": self.code_str(), "message": self.message()});
        (status, Json(body)).into_response()
    }
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

fn request_context(headers: &HeaderMap, session: &SessionConfig) -> RequestContext {
    RequestContext {
        session_id: parse_cookie(headers, &session.cookie_name),
        request_id: headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string),
    }
}

fn cookie_attrs(cfg: &SessionConfig) -> String {
    let mut attrs = String::from("; Path=/");
    if !cfg.domain.is_empty() {
        attrs.push_str("; Domain=");
        attrs.push_str(&cfg.domain);
    }
    attrs.push_str("; HttpOnly");
    if let Some(same_site) = cfg.same_site.attr() {
        attrs.push_str("; SameSite=");
        attrs.push_str(same_site);
    }
    if cfg.secure {
        attrs.push_str("; Secure");
    }
    attrs
}

fn session_cookie(cfg: &SessionConfig, sid: &str) -> String {
    format!("{}={}; Max-Age={}{}", cfg.cookie_name, sid, cfg.ttl.as_secs(), cookie_attrs(cfg))
}

fn expired_session_cookie(cfg: &SessionConfig) -> String {
    format!("{}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT{}", cfg.cookie_name, cookie_attrs(cfg))
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.append(name, v);
        }
        Err(e) => warn!(header = %name, error = %e, "dropping unencodable response header"),
    }
}

/// Turn gateway keys into HTTP headers. Gateway keys themselves never reach the client.
fn translate_metadata(md: &ResponseMetadata, cfg: &SessionConfig) -> (Option<StatusCode>, HeaderMap) {
    let mut headers = HeaderMap::new();
    let mut status = None;
    for (key, value) in md.iter() {
        match key {
            SESSION_ID_KEY => insert_header(&mut headers, header::SET_COOKIE, &session_cookie(cfg, value)),
            SESSION_DELETE_KEY => insert_header(&mut headers, header::SET_COOKIE, &expired_session_cookie(cfg)),
            LOCATION_KEY => {
                insert_header(&mut headers, header::LOCATION, value);
                status = Some(StatusCode::SEE_OTHER);
            }
            USER_TOKEN_KEY => insert_header(&mut headers, header::HeaderName::from_static(USER_TOKEN_HEADER), value),
            other => warn!(key = other, "unknown gateway key"),
        }
    }
    (status, headers)
}

fn respond<T: Serialize>(state: &AppState, md: &ResponseMetadata, result: AppResult<T>) -> Response {
    let (redirect, headers) = translate_metadata(md, &state.config.session);
    let mut resp = match result {
        Ok(body) => {
            let mut r = Json(body).into_response();
            if let Some(s) = redirect {
                *r.status_mut() = s;
            }
            r
        }
        Err(e) => e.into_response(),
    };
    resp.headers_mut().extend(headers);
    resp
}

/// Answer a request whose query or body could not be decoded. The decoder's message stays in the log.
fn malformed(code: &'static str, err: impl std::fmt::Display) -> Response {
    warn!(code, error = %err, "malformed request");
    AppError::bad_request(code).into_response()
}

async fn list_auth_strategies(State(state): State<AppState>) -> Response {
    Json(state.handler.list_auth_strategies()).into_response()
}

/// Public keys downstream services use to verify context tokens, in JWK set form.
async fn list_token_keys(State(state): State<AppState>) -> Response {
    let keys: Vec<_> = state.token_verifier.iter().map(ContextTokenVerifier::jwk).collect();
    Json(json!({ "keys": keys })).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct RegisterQuery {
    #[serde(default)]
    return_to: String,
    #[serde(default)]
    redirect_onstart: bool,
    #[serde(default)]
    callback_url: String,
}

async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(strategy): Path<String>,
    query: Result<Query<RegisterQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return malformed("invalid_query", e),
    };
    let ctx = request_context(&headers, &state.config.session);
    let mut md = ResponseMetadata::new();
    let req = AuthenticateRequest {
        return_to: q.return_to,
        strategy_name: strategy,
        redirect_onstart: q.redirect_onstart,
        callback_url: q.callback_url,
    };
    let result = state.handler.authenticate(&ctx, &mut md, req).await;
    respond(&state, &md, result)
}

async fn auth_callback(state: AppState, headers: HeaderMap, req: AuthCallbackRequest) -> Response {
    let ctx = request_context(&headers, &state.config.session);
    let mut md = ResponseMetadata::new();
    let result = state.handler.auth_callback(&ctx, &mut md, req).await;
    respond(&state, &md, result)
}

async fn auth_callback_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AuthCallbackRequest>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(req)) => auth_callback(state, headers, req).await,
        Err(e) => malformed("invalid_query", e),
    }
}

async fn auth_callback_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AuthCallbackRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(req)) => auth_callback(state, headers, req).await,
        Err(e) => malformed("invalid_body", e),
    }
}

async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = request_context(&headers, &state.config.session);
    let mut md = ResponseMetadata::new();
    let result = state.handler.auth_logout(&ctx, &mut md).await;
    respond(&state, &md, result)
}

async fn check_resource_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CheckResourcePermissionRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return malformed("invalid_body", e),
    };
    let ctx = request_context(&headers, &state.config.session);
    let result = state.handler.check_resource_permission(&ctx, req).await;
    respond(&state, &ResponseMetadata::new(), result)
}

#[derive(Debug, Default, Deserialize)]
struct DevAuthorizeQuery {
    #[serde(default)]
    state: String,
    #[serde(default)]
    redirect_uri: String,
    #[serde(default)]
    email: Option<String>,
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// Stand-in identity provider for the `dev` strategy: asks for an email and sends it back as the code.
async fn dev_authorize(State(state): State<AppState>, query: Result<Query<DevAuthorizeQuery>, QueryRejection>) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return malformed("invalid_query", e),
    };
    if !state.config.callback_urls.iter().any(|u| u == &q.redirect_uri) {
        return AppError::bad_request("redirect_uri_not_allowed").into_response();
    }
    match q.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => {
            let sep = if q.redirect_uri.contains('?') { '&' } else { '?' };
            let target = format!(
                "{}{}strategy_name={}&code={}&state={}",
                q.redirect_uri,
                sep,
                DevStrategy::NAME,
                urlencoding::encode(email),
                urlencoding::encode(&q.state)
            );
            Redirect::to(&target).into_response()
        }
        None => Html(format!(
            "<!doctype html><title>warden dev login</title>\
             <form method=\"get\">\
             <input type=\"hidden\" name=\"state\" value=\"{}\">\
             <input type=\"hidden\" name=\"redirect_uri\" value=\"{}\">\
             <input type=\"email\" name=\"email\" placeholder=\"you@example.com\" autofocus>\
             <button type=\"submit\">Sign in</button></form>",
            escape_html(&q.state),
            escape_html(&q.redirect_uri)
        ))
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SameSite;
    use std::time::Duration;

    fn session_cfg() -> SessionConfig {
        SessionConfig {
            ttl: Duration::from_secs(60),
            cookie_name: "sid".into(),
            domain: "example.com".into(),
            same_site: SameSite::Lax,
            secure: true,
        }
    }

    #[test]
    fn cookie_parsing_finds_named_value() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("theme=dark; sid=abc-123; other=1"));
        assert_eq!(parse_cookie(&h, "sid").as_deref(), Some("abc-123"));
        assert_eq!(parse_cookie(&h, "missing"), None);
        h.insert(header::COOKIE, HeaderValue::from_static("sid="));
        assert_eq!(parse_cookie(&h, "sid"), None);
    }

    #[test]
    fn cookies_carry_configured_attributes() {
        let cfg = session_cfg();
        assert_eq!(
            session_cookie(&cfg, "s1"),
            "sid=s1; Max-Age=60; Path=/; Domain=example.com; HttpOnly; SameSite=Lax; Secure"
        );
        let plain = SessionConfig { domain: String::new(), same_site: SameSite::Unset, secure: false, ..session_cfg() };
        assert_eq!(expired_session_cookie(&plain), "sid=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; HttpOnly");
    }

    #[test]
    fn metadata_becomes_headers() {
        let mut md = ResponseMetadata::new();
        md.set_redirect("https://app/home");
        md.set_session_id("s1");
        md.set_user_token("tok");
        let (status, headers) = translate_metadata(&md, &session_cfg());
        assert_eq!(status, Some(StatusCode::SEE_OTHER));
        assert_eq!(headers.get(header::LOCATION).unwrap(), "https://app/home");
        assert!(headers.get(header::SET_COOKIE).unwrap().to_str().unwrap().starts_with("sid=s1;"));
        assert_eq!(headers.get(USER_TOKEN_HEADER).unwrap(), "tok");
        assert!(headers.keys().all(|k| !k.as_str().starts_with("gateway-")));
    }

    #[test]
    fn html_escaping() {
        assert_eq!(escape_html("\"><script>&"), "&quot;&gt;&lt;script&gt;&amp;");
    }
}
