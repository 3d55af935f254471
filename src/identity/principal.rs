use serde::{Deserialize, Serialize};

use super::authz::USER_PRINCIPAL;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Unique handle derived from the email on registration.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    /// Unique slug; this is what goes into context tokens.
    pub name: String,
    #[serde(default)]
    pub title: String,
}

/// The acting identity of a call, resolved from its session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    /// Principal namespace, e.g. `app/user`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user: Option<User>,
}

impl Principal {
    pub fn from_user(user: User) -> Self {
        Self { id: user.id.clone(), kind: USER_PRINCIPAL.to_string(), user: Some(user) }
    }
}

/// Lowercased slug for a new user derived from the local part of the email.
pub fn user_slug_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let mut slug: String = local
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    slug.push('_');
    slug.push_str(&suffix[..6]);
    slug
}
