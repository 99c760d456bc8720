//! Organizations and membership: entities, repository, and registration.

pub mod models;
pub mod repo;
pub mod service;

pub use models::{Organization, OrganizationMember};
pub use repo::OrgRepo;
pub use service::OrganizationService;
