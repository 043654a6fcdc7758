use crate::{
    config::Config,
    moderation::{ModerationResult, ProviderIdentity},
    storage::ImageRef,
};
use ::async_trait::async_trait;

/// One moderation backend together with the mapping from its native output
/// to a [`ModerationResult`].
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    fn identity(&self) -> ProviderIdentity;

    fn display_name(&self) -> &'static str;

    /// Resolves credentials and clients. A provider whose init fails stays
    /// disabled.
    async fn init(&mut self, config: &Config) -> ::anyhow::Result<()>;

    fn is_enabled(&self) -> bool;

    /// Fails when the provider is disabled or its backend could not produce
    /// a prediction. Risky content is reported through the result instead.
    async fn moderate_image(
        &self,
        image: &ImageRef,
    ) -> ::anyhow::Result<ModerationResult>;
}
