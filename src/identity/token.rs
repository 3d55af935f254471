//! Signed user context tokens (PASETO v4.public, Ed25519).
//!
//! A context token binds a user id, the user's organization slugs and an expiry.
//! warden signs with its private keypair; downstream services only need the public
//! key (published at `/v1/auth/keys`) to verify, and cannot mint tokens themselves.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chrono::{SecondsFormat, Utc};
use rusty_paseto::prelude::*;
use serde::{Deserialize, Serialize};

use super::principal::{Organization, User};

/// Ed25519 keypair length: 32-byte secret seed followed by the 32-byte public key.
pub const KEYPAIR_LEN: usize = 64;
pub const PUBLIC_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token key material is not a valid Ed25519 key (expected base64 or base64url)")]
    InvalidKey,
    #[error("token build failed: {0}")]
    Build(String),
    #[error("token rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextClaims {
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub exp: String,
    #[serde(default)]
    pub iat: String,
    #[serde(default)]
    pub nbf: String,
    /// Comma-joined organization slugs.
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub email: String,
}

impl ContextClaims {
    pub fn orgs(&self) -> Vec<&str> {
        self.org.split(',').filter(|s| !s.is_empty()).collect()
    }
}

/// Public key in JWK (RFC 8037 OKP) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyJwk {
    pub kty: String,
    pub crv: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub usage: String,
    pub x: String,
}

#[derive(Clone)]
pub struct ContextTokenSigner {
    keypair: [u8; KEYPAIR_LEN],
    issuer: String,
    validity: Duration,
}

impl std::fmt::Debug for ContextTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextTokenSigner")
            .field("issuer", &self.issuer)
            .field("validity", &self.validity)
            .field("public_key", &general_purpose::URL_SAFE_NO_PAD.encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

impl ContextTokenSigner {
    /// Fails with [`TokenError::InvalidKey`] when the public half does not belong to the secret seed.
    pub fn new(keypair: [u8; KEYPAIR_LEN], issuer: impl Into<String>, validity: Duration) -> Result<Self, TokenError> {
        let signer = Self { keypair, issuer: issuer.into(), validity };
        let check = User { id: "keycheck".to_string(), ..Default::default() };
        let token = signer.sign(&check, &[]).map_err(|_| TokenError::InvalidKey)?;
        signer.verifier().verify(&token).map_err(|_| TokenError::InvalidKey)?;
        Ok(signer)
    }

    pub fn from_key_material(raw: &str, issuer: impl Into<String>, validity: Duration) -> Result<Self, TokenError> {
        let keypair = decode_key::<KEYPAIR_LEN>(raw).ok_or(TokenError::InvalidKey)?;
        Self::new(keypair, issuer, validity)
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        let mut public = [0u8; PUBLIC_KEY_LEN];
        public.copy_from_slice(&self.keypair[KEYPAIR_LEN - PUBLIC_KEY_LEN..]);
        public
    }

    /// A verifier holding only the public half.
    pub fn verifier(&self) -> ContextTokenVerifier {
        ContextTokenVerifier::new(self.public_key(), self.issuer.clone())
    }

    pub fn sign(&self, user: &User, orgs: &[Organization]) -> Result<String, TokenError> {
        let private_key = PasetoAsymmetricPrivateKey::<V4, Public>::from(&self.keypair[..]);
        let validity = chrono::Duration::from_std(self.validity).map_err(|e| TokenError::Build(e.to_string()))?;
        let exp = (Utc::now() + validity).to_rfc3339_opts(SecondsFormat::Secs, true);
        let jti = uuid::Uuid::new_v4().to_string();
        let org = orgs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>().join(",");

        let exp_claim = ExpirationClaim::try_from(exp.as_str()).map_err(|e| TokenError::Build(e.to_string()))?;
        let org_claim = CustomClaim::try_from(("org", org.as_str())).map_err(|e| TokenError::Build(e.to_string()))?;
        let email_claim = CustomClaim::try_from(("email", user.email.as_str())).map_err(|e| TokenError::Build(e.to_string()))?;

        let token = PasetoBuilder::<V4, Public>::default()
            .set_claim(IssuerClaim::from(self.issuer.as_str()))
            .set_claim(SubjectClaim::from(user.id.as_str()))
            .set_claim(TokenIdentifierClaim::from(jti.as_str()))
            .set_claim(exp_claim)
            .set_claim(org_claim)
            .set_claim(email_claim)
            .build(&private_key)
            .map_err(|e| TokenError::Build(e.to_string()))?;
        Ok(token)
    }
}

/// Verification side of the context token. Cannot mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextTokenVerifier {
    public_key: [u8; PUBLIC_KEY_LEN],
    issuer: String,
}

impl ContextTokenVerifier {
    pub fn new(public_key: [u8; PUBLIC_KEY_LEN], issuer: impl Into<String>) -> Self {
        Self { public_key, issuer: issuer.into() }
    }

    pub fn from_key_material(raw: &str, issuer: impl Into<String>) -> Result<Self, TokenError> {
        let public_key = decode_key::<PUBLIC_KEY_LEN>(raw).ok_or(TokenError::InvalidKey)?;
        Ok(Self::new(public_key, issuer))
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] { &self.public_key }

    pub fn jwk(&self) -> PublicKeyJwk {
        PublicKeyJwk {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            alg: "EdDSA".to_string(),
            usage: "sig".to_string(),
            x: general_purpose::URL_SAFE_NO_PAD.encode(self.public_key),
        }
    }

    /// Check the signature, expiry and not-before of a token produced by [`ContextTokenSigner::sign`].
    pub fn verify(&self, token: &str) -> Result<ContextClaims, TokenError> {
        let key = Key::<PUBLIC_KEY_LEN>::from(self.public_key);
        let public_key = PasetoAsymmetricPublicKey::<V4, Public>::from(&key);
        let value = PasetoParser::<V4, Public>::default()
            .parse(token.trim(), &public_key)
            .map_err(|e| TokenError::Rejected(e.to_string()))?;
        let claims: ContextClaims = serde_json::from_value(value).map_err(|e| TokenError::Rejected(e.to_string()))?;
        if claims.iss != self.issuer {
            return Err(TokenError::Rejected(format!("unexpected issuer {}", claims.iss)));
        }
        Ok(claims)
    }
}

fn decode_key<const N: usize>(raw: &str) -> Option<[u8; N]> {
    let trimmed = raw.trim();
    [&general_purpose::URL_SAFE_NO_PAD, &general_purpose::URL_SAFE, &general_purpose::STANDARD]
        .into_iter()
        .filter_map(|engine| engine.decode(trimmed).ok())
        .find_map(|bytes| <[u8; N]>::try_from(bytes.as_slice()).ok())
}
