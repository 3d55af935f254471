use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::flow::{Flow, FlowError};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("static email regex")
});

pub fn is_valid_email(s: &str) -> bool { EMAIL_RE.is_match(s.trim()) }

/// What a provider tells us about the person who completed its login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub email: String,
    pub name: String,
}

/// A pluggable credential provider. Protocol mechanics live entirely behind this trait.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Build the provider's authorization url. Returns `(url, nonce)`.
    fn auth_url(&self, state: &str, callback_url: &str) -> Result<(String, String), FlowError>;

    /// Exchange the provider code for a profile. `flow` is the already-consumed flow.
    async fn exchange(&self, code: &str, flow: &Flow) -> Result<ProviderProfile, FlowError>;
}

/// Development strategy: the authorization page is served by warden itself and the
/// "code" coming back is the email the developer typed in. Never enable in production.
pub struct DevStrategy {
    authorize_url: String,
}

impl DevStrategy {
    pub const NAME: &'static str = "dev";

    pub fn new(authorize_url: impl Into<String>) -> Self { Self { authorize_url: authorize_url.into() } }
}

#[async_trait]
impl Strategy for DevStrategy {
    fn name(&self) -> &str { Self::NAME }

    fn auth_url(&self, state: &str, callback_url: &str) -> Result<(String, String), FlowError> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let sep = if self.authorize_url.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}state={}&redirect_uri={}&nonce={}",
            self.authorize_url,
            sep,
            urlencoding::encode(state),
            urlencoding::encode(callback_url),
            nonce
        );
        Ok((url, nonce))
    }

    async fn exchange(&self, code: &str, _flow: &Flow) -> Result<ProviderProfile, FlowError> {
        let email = urlencoding::decode(code)
            .map_err(|e| FlowError::Provider(e.to_string()))?
            .trim()
            .to_lowercase();
        if !is_valid_email(&email) {
            return Err(FlowError::Provider("dev code is not an email".to_string()));
        }
        let name = email.split('@').next().unwrap_or_default().to_string();
        Ok(ProviderProfile { email, name })
    }
}
