//! # Presence (Membership & Invitations)
//!
//! `presence` is a multi-tenant membership backend. Users authenticate
//! through a third-party identity provider, create organizations, invite
//! other users, and accept, reject, or cancel those invitations.
//!
//! ## Tenant Model (Organizations, Admins, Members)
//!
//! Organizations are the tenant boundary. The creator of an organization
//! becomes both its first admin and its first member in the same
//! transaction. Admins may invite existing users and manage invitations;
//! members hold standing membership.
//!
//! - **Email privacy:** Plaintext emails never reach the database. Lookups
//!   use a deterministic keyed hash; storage uses authenticated encryption
//!   with a separately derived key.
//! - **Invitation lifecycle:** `pending` transitions one-way to `accepted`,
//!   `rejected`, or `cancelled`. Re-inviting a rejected or cancelled user
//!   reopens the same row back to `pending`; accepted invitations are
//!   never reset.
//! - **Soft Deletes:** Rows are marked via `deleted_at`; every query
//!   excludes soft-deleted rows on every joined table.
//!
//! ## Authorization
//!
//! Each request resolves its bearer token into verified identity claims,
//! then into a per-request context carrying the caller's organization
//! membership and admin sets. Privileged operations check the context and
//! fail with `401`/`403` as appropriate.

pub mod api;
pub mod auth;
pub mod cli;
pub mod crypto;
pub mod error;
pub mod invitations;
pub mod orgs;
pub mod storage;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
