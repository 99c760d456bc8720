use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use utoipa::ToSchema;

/// Lifecycle status of an invitation.
///
/// `Pending` transitions one-way to any of the terminal states.
/// Re-invitation may move `Rejected` or `Cancelled` back to `Pending`;
/// `Accepted` is never reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl InvitationStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Accepted, Self::Rejected, Self::Cancelled];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Case-insensitive parse of the persisted or user-supplied form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Parse the persisted `invitations.status` value into a typed enum.
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        Self::parse(value).ok_or_else(|| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid invitations.status value: {value}"),
            )))
        })
    }
}

/// Operations a caller can perform on an existing invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceOperation {
    Accept,
    Reject,
    Cancel,
}

impl AcceptanceOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

/// An invitation for a user to join an organization.
#[derive(Debug, Clone)]
pub struct Invitation {
    pub id: i64,
    pub organization_id: i64,
    pub created_by: i64,
    pub intended_for: i64,
    pub status: InvitationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// An invitation with no expiration date is considered expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at < Utc::now(),
        }
    }

    /// Whether `operation` may be performed given the current status.
    ///
    /// Accept, reject, and cancel are each valid only while the
    /// invitation is pending; every terminal state refuses all three.
    #[must_use]
    pub fn is_acceptance_operation_valid(&self, operation: AcceptanceOperation) -> bool {
        match operation {
            AcceptanceOperation::Accept
            | AcceptanceOperation::Reject
            | AcceptanceOperation::Cancel => self.status == InvitationStatus::Pending,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for Invitation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            created_by: row.try_get("created_by")?,
            intended_for: row.try_get("intended_for")?,
            status: InvitationStatus::from_db(&status)?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

/// Read model joining an invitation with its organization and both
/// usernames, for list and search endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvitationView {
    pub id: i64,
    pub organization_id: i64,
    pub organization_name: String,
    pub inviter_id: i64,
    pub inviter_name: String,
    pub invitee_id: i64,
    pub invitee_name: String,
    pub status: InvitationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for InvitationView {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("invitation_status")?;
        Ok(Self {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            organization_name: row.try_get("organization_name")?,
            inviter_id: row.try_get("inviter_id")?,
            inviter_name: row.try_get("inviter_name")?,
            invitee_id: row.try_get("invitee_id")?,
            invitee_name: row.try_get("invitee_name")?,
            status: InvitationStatus::from_db(&status)?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
