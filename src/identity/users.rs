use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::principal::{user_slug_from_email, User};
use super::strategy::is_valid_email;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("user doesn't exist")]
    NotExist,
    #[error("invalid user id")]
    InvalidId,
    #[error("invalid email")]
    InvalidEmail,
    #[error("user directory: {0}")]
    Store(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<User, UserError>;
    async fn get_by_email(&self, email: &str) -> Result<User, UserError>;
    /// Persist a new user; the id is assigned by the directory.
    async fn create(&self, user: User) -> Result<User, UserError>;
}

#[derive(Default)]
pub struct MemoryUsers {
    by_id: RwLock<HashMap<String, User>>,
}

impl MemoryUsers {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.by_id.read().len() }

    pub fn is_empty(&self) -> bool { self.by_id.read().is_empty() }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn get_by_id(&self, id: &str) -> Result<User, UserError> {
        if uuid::Uuid::parse_str(id).is_err() {
            return Err(UserError::InvalidId);
        }
        self.by_id.read().get(id).cloned().ok_or(UserError::NotExist)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        let email = email.trim().to_lowercase();
        self.by_id
            .read()
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(UserError::NotExist)
    }

    async fn create(&self, mut user: User) -> Result<User, UserError> {
        user.email = user.email.trim().to_lowercase();
        if !is_valid_email(&user.email) {
            return Err(UserError::InvalidEmail);
        }
        let mut map = self.by_id.write();
        if map.values().any(|u| u.email == user.email) {
            return Err(UserError::Store(format!("email already registered: {}", user.email)));
        }
        user.id = uuid::Uuid::new_v4().to_string();
        if user.name.is_empty() {
            user.name = user_slug_from_email(&user.email);
        }
        map.insert(user.id.clone(), user.clone());
        Ok(user)
    }
}
