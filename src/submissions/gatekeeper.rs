use super::{
    AbuseCounter, NewSubmission, Submission, SubmissionError,
    SubmissionRepository, SubmissionStatus,
};
use crate::moderation::service::PhotoModerator;
use crate::moderation::{ModerationResult, ModerationStatus};
use crate::storage::ImageStore;

use ::cadence::prelude::*;
use ::cadence::{NopMetricSink, StatsdClient};
use ::log::{debug, error, info, warn};
use ::std::sync::Arc;
use ::uuid::Uuid;

/// Runs moderation before a submission is stored and handles the staff
/// transitions afterwards.
pub struct SubmissionGatekeeper {
    moderator: Arc<dyn PhotoModerator>,
    images: Arc<dyn ImageStore>,
    repository: Arc<dyn SubmissionRepository>,
    abuse: Arc<dyn AbuseCounter>,
    metrics: Arc<StatsdClient>,
}

impl SubmissionGatekeeper {
    pub fn new(
        moderator: Arc<dyn PhotoModerator>,
        images: Arc<dyn ImageStore>,
        repository: Arc<dyn SubmissionRepository>,
        abuse: Arc<dyn AbuseCounter>,
    ) -> Self {
        SubmissionGatekeeper {
            moderator,
            images,
            repository,
            abuse,
            metrics: Arc::new(StatsdClient::from_sink(
                "photo_moderation",
                NopMetricSink,
            )),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<StatsdClient>) -> Self {
        self.metrics = metrics;
        self
    }

    async fn moderate(&self, submission: &NewSubmission) -> Option<ModerationResult> {
        match self.moderator.moderate_photo(&submission.photo).await {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(
                    "Photo moderation unavailable, continuing without it: {:?}",
                    err
                );
                None
            }
        }
    }

    async fn discard(&self, submission: &NewSubmission, result: &ModerationResult) {
        warn!(
            "Photo {} from user {} rejected by {}: {}",
            submission.photo,
            submission.user_id,
            result.provider,
            result.reasons.join(", ")
        );

        if let Err(err) = self.images.delete(&submission.photo).await {
            warn!(
                "Failed to delete rejected photo {}: {:?}",
                submission.photo, err
            );
        }

        if let Err(err) = self.abuse.increment(submission.user_id).await {
            error!(
                "Failed to increment flag count for user {}: {:?}",
                submission.user_id, err
            );
        }

        match self.metrics.count("submissions.rejected_by_moderation", 1) {
            Ok(_) => {}
            Err(err) => {
                warn!("Unable to log submission metric due to: {}", err)
            }
        };
    }

    pub async fn submit_photo(
        &self,
        submission: NewSubmission,
    ) -> Result<Submission, SubmissionError> {
        if !self.repository.bar_exists(submission.bar_id).await? {
            return Err(SubmissionError::BarNotFound);
        }

        let verdict = self.moderate(&submission).await;

        if let Some(result) = &verdict {
            match result.status {
                ModerationStatus::Rejected => {
                    self.discard(&submission, result).await;
                    return Err(SubmissionError::ContentRejected {
                        reasons: result.reasons.clone(),
                        scores: result.scores,
                    });
                }
                ModerationStatus::NeedsReview => warn!(
                    "Photo {} needs manual review: {}",
                    submission.photo,
                    result.reasons.join(", ")
                ),
                ModerationStatus::Approved => {
                    debug!("Photo {} approved by {}", submission.photo, result.provider)
                }
            }
        }

        let summary = verdict.map(|result| result.summary());
        let created = self
            .repository
            .create_submission(&submission, summary.as_ref())
            .await?;

        info!(
            "Photo submission {} created for user {}",
            created.id, created.user_id
        );
        Ok(created)
    }

    async fn finish(
        &self,
        id: Uuid,
        api_key: &str,
        status: SubmissionStatus,
    ) -> Result<Submission, SubmissionError> {
        let bar_id = self
            .repository
            .bar_for_api_key(api_key)
            .await?
            .ok_or(SubmissionError::InvalidApiKey)?;

        let submission = self
            .repository
            .load_submission(id)
            .await?
            .ok_or(SubmissionError::NotFound)?;

        if submission.bar_id != bar_id {
            return Err(SubmissionError::WrongBar);
        }

        if submission.status != SubmissionStatus::Pending {
            return Err(SubmissionError::AlreadyProcessed);
        }

        let finished = self
            .repository
            .finish_submission(id, status)
            .await?
            .ok_or(SubmissionError::AlreadyProcessed)?;

        info!("Photo submission {} is now {:?}", id, finished.status);
        Ok(finished)
    }

    pub async fn validate_submission(
        &self,
        id: Uuid,
        api_key: &str,
    ) -> Result<Submission, SubmissionError> {
        self.finish(id, api_key, SubmissionStatus::Validated).await
    }

    pub async fn reject_submission(
        &self,
        id: Uuid,
        api_key: &str,
    ) -> Result<Submission, SubmissionError> {
        self.finish(id, api_key, SubmissionStatus::Rejected).await
    }
}
