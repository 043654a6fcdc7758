use super::providers::interface::ModerationProvider;
use super::{ModerationResult, ProviderIdentity};
use crate::{config::Config, storage::ImageRef};

use ::async_trait::async_trait;
use ::cadence::prelude::*;
use ::cadence::{NopMetricSink, StatsdClient};
use ::futures::stream::{self, StreamExt};
use ::futures::FutureExt;
use ::log::{debug, error, info, warn};
use ::serde::Serialize;
use ::std::{collections::BTreeMap, panic::AssertUnwindSafe, sync::Arc};
use ::tokio::time::Duration;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_BATCH_CONCURRENCY: usize = 10;

/// What the submission flow needs from moderation. An `Err` here means the
/// moderation machinery itself broke, not that the photo is risky.
#[async_trait]
pub trait PhotoModerator: Send + Sync {
    async fn moderate_photo(
        &self,
        image: &ImageRef,
    ) -> ::anyhow::Result<ModerationResult>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderState {
    pub name: &'static str,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub preferred: ProviderIdentity,
    pub fallback_enabled: bool,
    pub providers: BTreeMap<ProviderIdentity, ProviderState>,
}

pub struct ModerationService {
    preferred: ProviderIdentity,
    fallback_enabled: bool,
    providers: Vec<Arc<dyn ModerationProvider>>,
    call_timeout: Duration,
    batch_concurrency: usize,
    metrics: Arc<StatsdClient>,
}

impl ModerationService {
    pub fn new(
        preferred: ProviderIdentity,
        fallback_enabled: bool,
        providers: Vec<Arc<dyn ModerationProvider>>,
    ) -> Self {
        ModerationService {
            preferred,
            fallback_enabled,
            providers,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            metrics: Arc::new(StatsdClient::from_sink(
                "photo_moderation",
                NopMetricSink,
            )),
        }
    }

    pub fn from_config(
        config: &Config,
        providers: Vec<Arc<dyn ModerationProvider>>,
    ) -> Self {
        let service = ModerationService::new(
            config.preferred_provider(),
            config.photo_moderation_fallback,
            providers,
        )
        .with_call_timeout(config.photo_moderation_timeout())
        .with_batch_concurrency(config.photo_moderation_batch_concurrency);

        info!(
            "Photo moderation: preferred={}, fallback={}, enabled={:?}",
            service.preferred,
            service.fallback_enabled,
            service
                .providers
                .iter()
                .filter(|provider| provider.is_enabled())
                .map(|provider| provider.identity())
                .collect::<Vec<_>>()
        );

        service
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<StatsdClient>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn enabled_provider_count(&self) -> usize {
        self.providers
            .iter()
            .filter(|provider| provider.is_enabled())
            .count()
    }

    fn provider(
        &self,
        identity: ProviderIdentity,
    ) -> Option<&Arc<dyn ModerationProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.identity() == identity)
    }

    fn count(&self, key: &str) {
        match self.metrics.count(key, 1) {
            Ok(_) => {}
            Err(err) => {
                warn!("Unable to log moderation metric due to: {}", err)
            }
        };
    }

    /// `None` when the provider is disabled, failed, or ran out of time.
    async fn attempt(
        &self,
        identity: ProviderIdentity,
        image: &ImageRef,
    ) -> Option<ModerationResult> {
        let provider = match self.provider(identity) {
            Some(provider) if provider.is_enabled() => provider,
            _ => {
                debug!("{} moderation provider is not available", identity);
                return None;
            }
        };

        let outcome =
            ::tokio::time::timeout(self.call_timeout, provider.moderate_image(image))
                .await;

        match outcome {
            Ok(Ok(result)) => Some(result),
            Ok(Err(err)) => {
                warn!("{} moderation failed: {:?}", identity, err);
                self.count(&format!(
                    "moderation.provider_failure.{}",
                    identity.metric_key()
                ));
                None
            }
            Err(_) => {
                warn!(
                    "{} moderation timed out after {:?}",
                    identity, self.call_timeout
                );
                self.count(&format!(
                    "moderation.provider_failure.{}",
                    identity.metric_key()
                ));
                None
            }
        }
    }

    /// Tries the preferred provider, then the others in fallback order, one
    /// at a time. Never fails: when nothing answers the photo goes to manual
    /// review.
    pub async fn moderate(&self, image: &ImageRef) -> ModerationResult {
        let mut result = self.attempt(self.preferred, image).await;

        if result.is_none() && self.fallback_enabled {
            for identity in ProviderIdentity::FALLBACK_ORDER {
                if identity == self.preferred {
                    continue;
                }
                info!("Falling back to {} moderation", identity);
                result = self.attempt(identity, image).await;
                if result.is_some() {
                    break;
                }
            }
        }

        let result = match result {
            Some(result) => result,
            None => {
                error!("All moderation providers failed for {}", image);
                self.count("moderation.degraded");
                ModerationResult::degraded()
            }
        };

        self.count(&format!("moderation.status.{}", result.status.metric_key()));
        result
    }

    /// One result per input, in input order.
    pub async fn batch_moderate(&self, images: &[ImageRef]) -> Vec<ModerationResult> {
        stream::iter(images.iter().cloned())
            .map(|image| async move {
                match AssertUnwindSafe(self.moderate(&image)).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        error!("Moderation panicked for {}", image);
                        ModerationResult::batch_failure()
                    }
                }
            })
            .buffered(self.batch_concurrency)
            .collect()
            .await
    }

    pub fn provider_status(&self) -> ProviderStatus {
        ProviderStatus {
            preferred: self.preferred,
            fallback_enabled: self.fallback_enabled,
            providers: self
                .providers
                .iter()
                .map(|provider| {
                    (
                        provider.identity(),
                        ProviderState {
                            name: provider.display_name(),
                            enabled: provider.is_enabled(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl PhotoModerator for ModerationService {
    async fn moderate_photo(
        &self,
        image: &ImageRef,
    ) -> ::anyhow::Result<ModerationResult> {
        Ok(self.moderate(image).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{CategoryScores, ModerationStatus};
    use ::std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Answer(ModerationStatus),
        Fail,
        Hang,
        Panic,
    }

    struct ScriptedProvider {
        identity: ProviderIdentity,
        enabled: bool,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(identity: ProviderIdentity, behavior: Behavior) -> Arc<Self> {
            Arc::new(ScriptedProvider {
                identity,
                enabled: true,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn disabled(identity: ProviderIdentity) -> Arc<Self> {
            Arc::new(ScriptedProvider {
                identity,
                enabled: false,
                behavior: Behavior::Fail,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModerationProvider for ScriptedProvider {
        fn identity(&self) -> ProviderIdentity {
            self.identity
        }

        fn display_name(&self) -> &'static str {
            "scripted"
        }

        async fn init(&mut self, _config: &Config) -> ::anyhow::Result<()> {
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn moderate_image(
            &self,
            image: &ImageRef,
        ) -> ::anyhow::Result<ModerationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Answer(status) => Ok(ModerationResult {
                    status: *status,
                    confidence: 90,
                    reasons: vec![],
                    scores: CategoryScores::default(),
                    details: ::serde_json::Value::Null,
                    provider: self.identity.to_string(),
                }),
                Behavior::Fail => Err(::anyhow::anyhow!("provider down")),
                Behavior::Hang => {
                    ::tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(::anyhow::anyhow!("unreachable"))
                }
                Behavior::Panic if image.to_string().contains("boom") => {
                    panic!("classifier crashed")
                }
                Behavior::Panic => Ok(ModerationResult::degraded()),
            }
        }
    }

    fn image(name: &str) -> ImageRef {
        ImageRef::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_preferred_provider_answers() {
        let nsfw = ScriptedProvider::new(
            ProviderIdentity::Nsfwjs,
            Behavior::Answer(ModerationStatus::Approved),
        );
        let google = ScriptedProvider::new(
            ProviderIdentity::GoogleVision,
            Behavior::Answer(ModerationStatus::Rejected),
        );
        let service = ModerationService::new(
            ProviderIdentity::GoogleVision,
            true,
            vec![nsfw.clone(), google.clone()],
        );

        let result = service.moderate(&image("a.jpg")).await;
        assert_eq!(result.status, ModerationStatus::Rejected);
        assert_eq!(result.provider, "GOOGLE_VISION");
        assert_eq!(nsfw.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_stops_at_first_success() {
        let nsfw = ScriptedProvider::new(ProviderIdentity::Nsfwjs, Behavior::Fail);
        let google = ScriptedProvider::new(
            ProviderIdentity::GoogleVision,
            Behavior::Answer(ModerationStatus::Approved),
        );
        let aws = ScriptedProvider::new(
            ProviderIdentity::AwsRekognition,
            Behavior::Answer(ModerationStatus::Approved),
        );
        let service = ModerationService::new(
            ProviderIdentity::Nsfwjs,
            true,
            vec![nsfw.clone(), google.clone(), aws.clone()],
        );

        let result = service.moderate(&image("a.jpg")).await;
        assert_eq!(result.provider, "GOOGLE_VISION");
        assert_eq!(nsfw.calls(), 1);
        assert_eq!(google.calls(), 1);
        assert_eq!(aws.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_skips_preferred_and_disabled() {
        let nsfw = ScriptedProvider::disabled(ProviderIdentity::Nsfwjs);
        let google = ScriptedProvider::new(
            ProviderIdentity::GoogleVision,
            Behavior::Answer(ModerationStatus::NeedsReview),
        );
        let aws = ScriptedProvider::new(ProviderIdentity::AwsRekognition, Behavior::Fail);
        let service = ModerationService::new(
            ProviderIdentity::AwsRekognition,
            true,
            vec![nsfw.clone(), google.clone(), aws.clone()],
        );

        let result = service.moderate(&image("a.jpg")).await;
        assert_eq!(result.provider, "GOOGLE_VISION");
        assert_eq!(nsfw.calls(), 0);
        assert_eq!(aws.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_fallback_degrades_immediately() {
        let nsfw = ScriptedProvider::new(ProviderIdentity::Nsfwjs, Behavior::Fail);
        let google = ScriptedProvider::new(
            ProviderIdentity::GoogleVision,
            Behavior::Answer(ModerationStatus::Approved),
        );
        let service = ModerationService::new(
            ProviderIdentity::Nsfwjs,
            false,
            vec![nsfw.clone(), google.clone()],
        );

        let result = service.moderate(&image("a.jpg")).await;
        assert!(result.is_degraded());
        assert_eq!(google.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_enabled_providers() {
        let service = ModerationService::new(
            ProviderIdentity::Nsfwjs,
            true,
            vec![
                ScriptedProvider::disabled(ProviderIdentity::Nsfwjs),
                ScriptedProvider::disabled(ProviderIdentity::GoogleVision),
            ],
        );

        let result = service.moderate(&image("a.jpg")).await;
        assert_eq!(result.status, ModerationStatus::NeedsReview);
        assert_eq!(result.confidence, 0);
        assert_eq!(result.provider, "NONE");
        assert_eq!(
            result.reasons,
            vec!["Automatic moderation failed — requires manual review"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provider_times_out() {
        let nsfw = ScriptedProvider::new(ProviderIdentity::Nsfwjs, Behavior::Hang);
        let google = ScriptedProvider::new(
            ProviderIdentity::GoogleVision,
            Behavior::Answer(ModerationStatus::Approved),
        );
        let service = ModerationService::new(
            ProviderIdentity::Nsfwjs,
            true,
            vec![nsfw, google],
        )
        .with_call_timeout(Duration::from_secs(5));

        let result = service.moderate(&image("a.jpg")).await;
        assert_eq!(result.provider, "GOOGLE_VISION");
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_survives_panics() {
        let nsfw = ScriptedProvider::new(ProviderIdentity::Nsfwjs, Behavior::Panic);
        let service =
            ModerationService::new(ProviderIdentity::Nsfwjs, false, vec![nsfw])
                .with_batch_concurrency(2);

        let images = vec![image("a.jpg"), image("boom.jpg"), image("c.jpg")];
        let results = service.batch_moderate(&images).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].reasons, ModerationResult::degraded().reasons);
        assert_eq!(results[1].reasons, vec!["Moderation failed"]);
        assert_eq!(results[1].status, ModerationStatus::NeedsReview);
        assert_eq!(results[1].provider, "NONE");
        assert_eq!(results[2].reasons, ModerationResult::degraded().reasons);
    }

    #[tokio::test]
    async fn test_provider_status() {
        let service = ModerationService::new(
            ProviderIdentity::GoogleVision,
            false,
            vec![
                ScriptedProvider::disabled(ProviderIdentity::Nsfwjs),
                ScriptedProvider::new(
                    ProviderIdentity::GoogleVision,
                    Behavior::Answer(ModerationStatus::Approved),
                ),
            ],
        );

        let status = service.provider_status();
        assert_eq!(status.preferred, ProviderIdentity::GoogleVision);
        assert!(!status.fallback_enabled);
        assert!(!status.providers[&ProviderIdentity::Nsfwjs].enabled);
        assert!(status.providers[&ProviderIdentity::GoogleVision].enabled);
        assert_eq!(service.enabled_provider_count(), 1);

        let value = ::serde_json::to_value(&status).unwrap();
        assert_eq!(value["preferred"], "GOOGLE_VISION");
        assert_eq!(value["providers"]["NSFWJS"]["enabled"], false);
    }
}
