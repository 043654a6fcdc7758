use crate::storage::{interface, ImageRef};
use ::anyhow::{Context, Result};
use ::bytes::Bytes;
use ::reqwest::Client;
use ::std::path::{Component, Path, PathBuf};
use ::std::time::Duration;

const MAX_IMAGE_SIZE_MB: u64 = 10;
pub const MAX_IMAGE_SIZE_BYTES: u64 = MAX_IMAGE_SIZE_MB * 1024 * 1024;

/// Reads uploads from a local directory and downloads remote references
/// over HTTP(S). Only local files can be deleted.
pub struct DiskImageStore {
    root: PathBuf,
    client: Client,
    max_size: u64,
}

impl DiskImageStore {
    pub fn new(root: PathBuf, fetch_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            root,
            client,
            max_size: MAX_IMAGE_SIZE_BYTES,
        })
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    fn too_large(&self, image: &ImageRef, size: u64) -> ::anyhow::Error {
        ::anyhow::anyhow!(
            "Image {} is larger than {} bytes ({})",
            image,
            self.max_size,
            size
        )
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(::anyhow::anyhow!(
                "Image path escapes the upload directory: {}",
                path.display()
            ));
        }

        if path.is_absolute() {
            if !path.starts_with(&self.root) {
                return Err(::anyhow::anyhow!(
                    "Image path is outside the upload directory: {}",
                    path.display()
                ));
            }
            return Ok(path.to_path_buf());
        }

        Ok(self.root.join(path))
    }
}

#[async_trait::async_trait]
impl interface::ImageStore for DiskImageStore {
    async fn fetch(&self, image: &ImageRef) -> Result<Bytes> {
        match image {
            ImageRef::Path(path) => {
                let resolved = self.resolve(path)?;
                ::log::debug!("Reading image {}", resolved.display());
                let metadata =
                    ::tokio::fs::metadata(&resolved).await.with_context(|| {
                        format!("Image file not found: {}", resolved.display())
                    })?;
                if metadata.len() > self.max_size {
                    return Err(self.too_large(image, metadata.len()));
                }
                let contents =
                    ::tokio::fs::read(&resolved).await.with_context(|| {
                        format!("Image file not found: {}", resolved.display())
                    })?;
                Ok(Bytes::from(contents))
            }
            ImageRef::Url(url) => {
                ::log::debug!("Downloading image {}", url);
                let mut response = self.client.get(url.clone()).send().await?;

                if !response.status().is_success() {
                    return Err(::anyhow::anyhow!(
                        "Image download returned error: {} - {}",
                        response.status(),
                        url
                    ));
                }

                if let Some(length) = response.content_length() {
                    if length > self.max_size {
                        return Err(self.too_large(image, length));
                    }
                }

                // Content-Length is advisory.
                let mut body = ::bytes::BytesMut::new();
                while let Some(chunk) = response.chunk().await? {
                    let size = (body.len() + chunk.len()) as u64;
                    if size > self.max_size {
                        return Err(self.too_large(image, size));
                    }
                    body.extend_from_slice(&chunk);
                }

                Ok(body.freeze())
            }
        }
    }

    async fn delete(&self, image: &ImageRef) -> Result<()> {
        match image {
            ImageRef::Path(path) => {
                let resolved = self.resolve(path)?;
                ::tokio::fs::remove_file(&resolved).await.with_context(|| {
                    format!("Unable to delete {}", resolved.display())
                })?;
                ::log::debug!("Deleted image {}", resolved.display());
                Ok(())
            }
            ImageRef::Url(url) => Err(::anyhow::anyhow!(
                "Remote image {} cannot be deleted from the upload directory",
                url
            )),
        }
    }
}
