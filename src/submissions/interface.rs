use super::{NewSubmission, Submission, SubmissionStatus};
use crate::moderation::ModerationSummary;
use ::async_trait::async_trait;
use ::uuid::Uuid;

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn bar_exists(&self, bar_id: Uuid) -> ::anyhow::Result<bool>;

    async fn bar_for_api_key(&self, api_key: &str) -> ::anyhow::Result<Option<Uuid>>;

    async fn create_submission(
        &self,
        submission: &NewSubmission,
        moderation: Option<&ModerationSummary>,
    ) -> ::anyhow::Result<Submission>;

    async fn load_submission(&self, id: Uuid) -> ::anyhow::Result<Option<Submission>>;

    /// Moves a pending submission to `status`. `None` when the submission
    /// was no longer pending.
    async fn finish_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
    ) -> ::anyhow::Result<Option<Submission>>;
}

#[async_trait]
pub trait AbuseCounter: Send + Sync {
    async fn increment(&self, user_id: Uuid) -> ::anyhow::Result<()>;
}
