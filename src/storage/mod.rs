use crate::config::Config;
use ::anyhow::Result;
use ::std::{path::PathBuf, sync::Arc};

pub mod disk;
pub mod interface;

pub use self::interface::ImageStore;

/// Reference to a submitted image: a file under the upload directory or a
/// remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageRef {
    Path(PathBuf),
    Url(::url::Url),
}

impl ImageRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(::anyhow::anyhow!("Empty image reference"));
        }

        if reference.starts_with("http://") || reference.starts_with("https://")
        {
            let url = ::url::Url::parse(reference)?;
            return Ok(ImageRef::Url(url));
        }

        Ok(ImageRef::Path(PathBuf::from(reference)))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ImageRef::Url(_))
    }
}

impl ::std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        match self {
            ImageRef::Path(path) => write!(f, "{}", path.display()),
            ImageRef::Url(url) => write!(f, "{}", url),
        }
    }
}

impl ::std::str::FromStr for ImageRef {
    type Err = ::anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ImageRef::parse(s)
    }
}

impl ::serde::Serialize for ImageRef {
    fn serialize<S: ::serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> ::serde::Deserialize<'de> for ImageRef {
    fn deserialize<D: ::serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ImageRef::parse(&raw).map_err(::serde::de::Error::custom)
    }
}

pub fn make_store(config: &Config) -> Result<Arc<dyn ImageStore>> {
    let store = disk::DiskImageStore::new(
        PathBuf::from(&config.upload_dir),
        ::std::time::Duration::from_secs(config.image_fetch_timeout_seconds),
    )?;
    ::log::info!("Serving images from {}", config.upload_dir);
    Ok(Arc::new(store))
}
