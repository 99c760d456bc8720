use chrono::{DateTime, Utc};

/// A user account.
///
/// `email` holds the decrypted plaintext and exists only in memory; the
/// database stores the deterministic hash and the ciphertext.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub email_hash: String,
    pub email_verified: bool,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    #[must_use]
    pub fn is_email_verified(&self) -> bool {
        self.email_verified
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(deleted_at: Option<DateTime<Utc>>) -> User {
        User {
            id: 1,
            email: "user@example.com".to_string(),
            email_hash: "0".repeat(64),
            email_verified: true,
            username: "user".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at,
        }
    }

    #[test]
    fn test_is_deleted() {
        assert!(!user(None).is_deleted());
        assert!(user(Some(Utc::now())).is_deleted());
    }
}
