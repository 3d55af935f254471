//! Identity domain: sessions, registration flows, users, memberships and the
//! authorization decision seam. Collaborators are traits with in-memory reference
//! implementations; the server wires them together.

pub mod authz;
pub mod flow;
pub mod membership;
pub mod principal;
pub mod registration;
pub mod request_context;
pub mod session;
pub mod strategy;
pub mod token;
pub mod users;

pub use authz::{AuthzCheck, AuthzError, MemoryRelations, Object, SudoCheck};
pub use flow::{FlowEngine, FlowError, Minted};
pub use membership::{MembershipError, MembershipProvider, MemoryMemberships};
pub use principal::{Organization, Principal, User};
pub use registration::{RegistrationConfig, RegistrationService};
pub use request_context::{RequestContext, ResponseMetadata};
pub use session::{MemorySessionStore, Session, SessionError, SessionStore};
pub use strategy::{DevStrategy, Strategy};
pub use token::{ContextClaims, ContextTokenSigner, ContextTokenVerifier, PublicKeyJwk, TokenError};
pub use users::{MemoryUsers, UserDirectory, UserError};
