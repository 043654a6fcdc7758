use crate::{config::Config, moderation::ModerationStatus, storage::ImageStore};
use ::log::{info, warn};
use ::std::sync::Arc;

use self::interface::ModerationProvider;

pub mod google_vision;
pub mod interface;
pub mod nsfw;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod rekognition;
pub mod sigv4;

/// Builds every adapter in fallback priority order. Adapters whose enable
/// flag is off or whose init fails are kept but report themselves disabled.
pub async fn make_providers(
    config: &Config,
    images: Arc<dyn ImageStore>,
) -> Vec<Arc<dyn ModerationProvider>> {
    let candidates: Vec<(bool, Box<dyn ModerationProvider>)> = vec![
        (
            config.nsfwjs_moderation_enabled,
            Box::new(nsfw::NsfwProvider::new(images.clone())),
        ),
        (
            config.google_vision_moderation_enabled,
            Box::new(google_vision::GoogleVisionProvider::new(images.clone())),
        ),
        (
            config.aws_rekognition_moderation_enabled,
            Box::new(rekognition::RekognitionProvider::new(images)),
        ),
    ];

    let mut providers: Vec<Arc<dyn ModerationProvider>> = vec![];
    for (enabled, mut provider) in candidates {
        if enabled {
            match provider.init(config).await {
                Ok(()) => info!(
                    "{} moderation provider initialized",
                    provider.display_name()
                ),
                Err(err) => warn!(
                    "{} moderation provider disabled: {}",
                    provider.display_name(),
                    err
                ),
            }
        } else {
            info!("{} moderation provider is disabled", provider.display_name());
        }
        providers.push(Arc::from(provider));
    }

    providers
}

/// Accumulates a status and its reasons while an adapter walks its
/// categories. A rejection is never downgraded.
pub(crate) struct Verdict {
    status: ModerationStatus,
    reasons: Vec<String>,
}

impl Verdict {
    pub(crate) fn new() -> Self {
        Verdict {
            status: ModerationStatus::Approved,
            reasons: vec![],
        }
    }

    pub(crate) fn reject(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
        self.status = ModerationStatus::Rejected;
    }

    pub(crate) fn review(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
        if self.status == ModerationStatus::Approved {
            self.status = ModerationStatus::NeedsReview;
        }
    }

    /// Only records the reason when nothing else has been flagged yet.
    pub(crate) fn review_if_clean(&mut self, reason: impl Into<String>) {
        if self.status == ModerationStatus::Approved {
            self.review(reason);
        }
    }

    pub(crate) fn into_parts(self) -> (ModerationStatus, Vec<String>) {
        (self.status, self.reasons)
    }
}
