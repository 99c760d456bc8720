//! User accounts: entity, repository, and identity-backed sign-up.

pub mod models;
pub mod repo;
pub mod service;

pub use models::User;
pub use repo::UserRepo;
pub use service::UserService;

use regex::Regex;

/// Lightweight email sanity check used before persisting or resolving
/// email input.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}
