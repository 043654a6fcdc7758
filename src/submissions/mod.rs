use crate::moderation::{CategoryScores, ModerationSummary};
use crate::storage::ImageRef;
use ::chrono::{DateTime, Utc};
use ::serde::{Deserialize, Deserializer, Serialize};
use ::uuid::Uuid;

pub mod gatekeeper;
pub mod interface;

pub use self::gatekeeper::SubmissionGatekeeper;
pub use self::interface::{AbuseCounter, SubmissionRepository};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, ::sqlx::Type, Serialize, Deserialize,
)]
#[sqlx(type_name = "submission_status")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Validated,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionItem {
    pub drink_id: Uuid,
    /// `None` means the drink is for the submitter. Clients send `"guest"`
    /// for a drink bought for someone without an account, which is stored
    /// the same way.
    #[serde(default, deserialize_with = "friend_or_guest")]
    pub friend_id: Option<Uuid>,
}

fn friend_or_guest<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw == "guest" => Ok(None),
        Some(raw) => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(::serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewSubmission {
    pub user_id: Uuid,
    pub bar_id: Uuid,
    pub photo: ImageRef,
    pub items: Vec<SubmissionItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bar_id: Uuid,
    pub photo: ImageRef,
    pub status: SubmissionStatus,
    pub items: Vec<SubmissionItem>,
    pub moderation: Option<ModerationSummary>,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, ::thiserror::Error)]
pub enum SubmissionError {
    #[error("Photo rejected by moderation: {}", .reasons.join(", "))]
    ContentRejected {
        reasons: Vec<String>,
        scores: CategoryScores,
    },

    #[error("Bar not found")]
    BarNotFound,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Submission not found")]
    NotFound,

    #[error("Not your submission")]
    WrongBar,

    #[error("Submission already processed")]
    AlreadyProcessed,

    #[error(transparent)]
    Internal(#[from] ::anyhow::Error),
}
