use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::principal::Organization;
use super::request_context::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MembershipError {
    #[error("membership provider: {0}")]
    Provider(String),
}

/// Answers which organizations a user belongs to right now. Results are not cached.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn list_by_user(&self, ctx: &RequestContext, user_id: &str) -> Result<Vec<Organization>, MembershipError>;
}

#[derive(Default)]
pub struct MemoryMemberships {
    orgs: RwLock<HashMap<String, Organization>>,
    members: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryMemberships {
    pub fn new() -> Self { Self::default() }

    pub fn add_organization(&self, org: Organization) {
        self.orgs.write().insert(org.id.clone(), org);
    }

    pub fn add_member(&self, org_id: &str, user_id: &str) {
        let mut m = self.members.write();
        let list = m.entry(user_id.to_string()).or_default();
        if !list.iter().any(|o| o == org_id) {
            list.push(org_id.to_string());
        }
    }
}

#[async_trait]
impl MembershipProvider for MemoryMemberships {
    async fn list_by_user(&self, _ctx: &RequestContext, user_id: &str) -> Result<Vec<Organization>, MembershipError> {
        let ids = self.members.read().get(user_id).cloned().unwrap_or_default();
        let orgs = self.orgs.read();
        Ok(ids.iter().filter_map(|id| orgs.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_known_orgs_in_join_order() {
        let m = MemoryMemberships::new();
        m.add_organization(Organization { id: "o1".into(), name: "acme".into(), ..Default::default() });
        m.add_organization(Organization { id: "o2".into(), name: "globex".into(), ..Default::default() });
        m.add_member("o2", "u1");
        m.add_member("o1", "u1");
        m.add_member("o1", "u1");
        m.add_member("ghost", "u1");
        let orgs = m.list_by_user(&RequestContext::default(), "u1").await.unwrap();
        let names: Vec<_> = orgs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["globex", "acme"]);
        assert!(m.list_by_user(&RequestContext::default(), "u2").await.unwrap().is_empty());
    }
}
