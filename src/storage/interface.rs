use crate::storage::ImageRef;
use ::anyhow::Result;
use ::bytes::Bytes;

/// Where submitted photos live. Moderation only reads through it, and the
/// gatekeeper deletes through it when a photo is rejected.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    async fn fetch(&self, image: &ImageRef) -> Result<Bytes>;
    async fn delete(&self, image: &ImageRef) -> Result<()>;
}
