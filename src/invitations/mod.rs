//! Invitations: lifecycle entity, persistence, read queries, and the
//! state-machine service.

pub mod models;
pub mod query;
pub mod repo;
pub mod service;

pub use models::{AcceptanceOperation, Invitation, InvitationStatus, InvitationView};
pub use query::{InvitationQuery, SearchParams};
pub use repo::InvitationRepo;
pub use service::{InvitationService, SearchFilter};
