//! Environment-driven configuration for the warden server.
//! Every setting has a default so a bare `warden` starts in a usable (dev) state.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite { Lax, Strict, None, Unset }

impl SameSite {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "lax" => SameSite::Lax,
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            _ => SameSite::Unset,
        }
    }

    pub fn attr(&self) -> Option<&'static str> {
        match self {
            SameSite::Lax => Some("Lax"),
            SameSite::Strict => Some("Strict"),
            SameSite::None => Some("None"),
            SameSite::Unset => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub cookie_name: String,
    pub domain: String,
    pub same_site: SameSite,
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Base64 Ed25519 keypair (seed then public key); `None` disables context token issuance.
    pub key: Option<String>,
    pub issuer: String,
    pub validity: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub session: SessionConfig,
    pub authorized_redirect_urls: Vec<String>,
    pub callback_urls: Vec<String>,
    pub flow_ttl: Duration,
    /// Zero disables the expired-flow sweeper.
    pub flow_sweep_interval: Duration,
    pub token: TokenConfig,
    pub dev_login: bool,
    pub dev_authorize_url: String,
    pub superusers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 7400,
            session: SessionConfig {
                ttl: Duration::from_secs(24 * 60 * 60),
                cookie_name: "sid".to_string(),
                domain: String::new(),
                same_site: SameSite::Lax,
                secure: true,
            },
            authorized_redirect_urls: Vec::new(),
            callback_urls: Vec::new(),
            flow_ttl: Duration::from_secs(10 * 60),
            flow_sweep_interval: Duration::from_secs(60),
            token: TokenConfig { key: None, issuer: "warden".to_string(), validity: Duration::from_secs(60 * 60) },
            dev_login: false,
            dev_authorize_url: "http://localhost:7400/dev/authorize".to_string(),
            superusers: Vec::new(),
        }
    }
}

fn parse_u64_env(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

fn parse_bool_env(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(v) => {
            let s = v.to_lowercase();
            match s.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
        }
        Err(_) => None,
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn list_env(name: &str) -> Vec<String> {
    env::var(name).map(|v| split_list(&v)).unwrap_or_default()
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Self {
            http_port: env::var("WARDEN_HTTP_PORT").ok().and_then(|v| v.parse::<u16>().ok()).unwrap_or(d.http_port),
            session: SessionConfig {
                ttl: parse_u64_env("WARDEN_SESSION_TTL_SECS").map(Duration::from_secs).unwrap_or(d.session.ttl),
                cookie_name: env::var("WARDEN_SESSION_COOKIE").ok().filter(|s| !s.trim().is_empty()).unwrap_or(d.session.cookie_name),
                domain: env::var("WARDEN_SESSION_DOMAIN").unwrap_or(d.session.domain),
                same_site: env::var("WARDEN_SESSION_SAMESITE").map(|v| SameSite::parse(&v)).unwrap_or(d.session.same_site),
                secure: parse_bool_env("WARDEN_SESSION_SECURE").unwrap_or(d.session.secure),
            },
            authorized_redirect_urls: list_env("WARDEN_AUTHORIZED_REDIRECT_URLS"),
            callback_urls: list_env("WARDEN_CALLBACK_URLS"),
            flow_ttl: parse_u64_env("WARDEN_FLOW_TTL_SECS").map(Duration::from_secs).unwrap_or(d.flow_ttl),
            flow_sweep_interval: parse_u64_env("WARDEN_FLOW_SWEEP_SECS").map(Duration::from_secs).unwrap_or(d.flow_sweep_interval),
            token: TokenConfig {
                key: env::var("WARDEN_TOKEN_KEY").ok().filter(|s| !s.trim().is_empty()),
                issuer: env::var("WARDEN_TOKEN_ISSUER").unwrap_or(d.token.issuer),
                validity: parse_u64_env("WARDEN_TOKEN_VALIDITY_SECS").map(Duration::from_secs).unwrap_or(d.token.validity),
            },
            dev_login: parse_bool_env("WARDEN_DEV_LOGIN").unwrap_or(d.dev_login),
            dev_authorize_url: env::var("WARDEN_DEV_AUTHORIZE_URL").unwrap_or(d.dev_authorize_url),
            superusers: list_env("WARDEN_SUPERUSERS"),
        }
    }
}
