use super::interface::ModerationProvider;
use super::Verdict;

use crate::{
    config::Config,
    moderation::{
        safety_confidence, CategoryScores, ModerationResult, ProviderIdentity,
    },
    storage::{ImageRef, ImageStore},
};
use ::async_trait::async_trait;
use ::image::{imageops::FilterType, DynamicImage, RgbImage};
use ::log::{error, info};
use ::serde::{Deserialize, Serialize};
use ::std::{path::PathBuf, sync::Arc};
use ::tokio::sync::watch;

const ADULT_REJECT_THRESHOLD: f64 = 15.0;
const ADULT_REVIEW_THRESHOLD: f64 = 5.0;
const RACY_REVIEW_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NsfwClass {
    Drawing,
    Hentai,
    Neutral,
    Porn,
    Sexy,
}

impl NsfwClass {
    /// Output order of the classifier head.
    pub const ALL: [NsfwClass; 5] = [
        NsfwClass::Drawing,
        NsfwClass::Hentai,
        NsfwClass::Neutral,
        NsfwClass::Porn,
        NsfwClass::Sexy,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub class: NsfwClass,
    /// 0.0 to 1.0
    pub probability: f64,
}

/// Runs the model on an image that has already been resized to the input
/// size. Implementations are CPU bound and are called from a blocking task.
pub trait NsfwClassifier: Send + Sync {
    fn classify(&self, image: &RgbImage) -> ::anyhow::Result<Vec<ClassPrediction>>;
}

enum ModelState {
    Loading,
    Ready(Arc<dyn NsfwClassifier>),
    Failed(String),
}

/// Shared view of a model that may still be loading.
#[derive(Clone)]
pub struct ModelHandle {
    state: watch::Receiver<ModelState>,
}

impl ModelHandle {
    pub fn ready(classifier: Arc<dyn NsfwClassifier>) -> Self {
        let (_, state) = watch::channel(ModelState::Ready(classifier));
        ModelHandle { state }
    }

    /// Loads the model on the blocking pool. Calls made in the meantime
    /// wait for the load to finish.
    pub fn spawn<F>(load: F) -> Self
    where
        F: FnOnce() -> ::anyhow::Result<Arc<dyn NsfwClassifier>> + Send + 'static,
    {
        let (sender, state) = watch::channel(ModelState::Loading);

        ::tokio::task::spawn_blocking(move || {
            let loaded = match load() {
                Ok(classifier) => {
                    info!("NSFW model loaded");
                    ModelState::Ready(classifier)
                }
                Err(err) => {
                    error!("Failed to load NSFW model: {:?}", err);
                    ModelState::Failed(err.to_string())
                }
            };
            sender.send_replace(loaded);
        });

        ModelHandle { state }
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.state.borrow(), ModelState::Failed(_))
    }

    pub async fn wait(&self) -> ::anyhow::Result<Arc<dyn NsfwClassifier>> {
        let mut state = self.state.clone();
        let current = state
            .wait_for(|state| !matches!(state, ModelState::Loading))
            .await
            .map_err(|_| ::anyhow::anyhow!("NSFW model loader went away"))?;

        match &*current {
            ModelState::Ready(classifier) => Ok(classifier.clone()),
            ModelState::Failed(err) => {
                Err(::anyhow::anyhow!("NSFW model failed to load: {}", err))
            }
            ModelState::Loading => {
                Err(::anyhow::anyhow!("NSFW model is still loading"))
            }
        }
    }
}

pub fn preprocess(image: &DynamicImage, size: u32) -> RgbImage {
    image.resize_exact(size, size, FilterType::Triangle).to_rgb8()
}

/// NHWC layout, channel values scaled to 0.0 to 1.0.
pub fn tensor_data(image: &RgbImage) -> Vec<f32> {
    image
        .pixels()
        .flat_map(|pixel| pixel.0)
        .map(|channel| f32::from(channel) / 255.0)
        .collect()
}

fn probability_of(predictions: &[ClassPrediction], class: NsfwClass) -> f64 {
    predictions
        .iter()
        .find(|prediction| prediction.class == class)
        .map(|prediction| prediction.probability)
        .unwrap_or(0.0)
}

pub fn evaluate(predictions: &[ClassPrediction]) -> ModerationResult {
    let adult = (probability_of(predictions, NsfwClass::Porn)
        + probability_of(predictions, NsfwClass::Hentai))
        * 100.0;
    let racy = probability_of(predictions, NsfwClass::Sexy) * 100.0;

    let mut verdict = Verdict::new();
    if adult > ADULT_REJECT_THRESHOLD {
        verdict.reject(format!("Explicit content detected ({:.1}%)", adult));
    } else if adult > ADULT_REVIEW_THRESHOLD {
        verdict.review(format!("Possible explicit content ({:.1}%)", adult));
    }
    if racy > RACY_REVIEW_THRESHOLD {
        verdict.review_if_clean(format!(
            "Suggestive content detected ({:.1}%)",
            racy
        ));
    }

    let details: Vec<::serde_json::Value> = predictions
        .iter()
        .map(|prediction| {
            ::serde_json::json!({
                "class": prediction.class,
                "probability": format!("{:.2}%", prediction.probability * 100.0),
            })
        })
        .collect();

    let (status, reasons) = verdict.into_parts();

    ModerationResult {
        status,
        confidence: safety_confidence(adult.max(racy)),
        reasons,
        scores: CategoryScores {
            adult: Some(adult),
            racy: Some(racy),
            ..Default::default()
        },
        details: ::serde_json::json!({ "predictions": details }),
        provider: ProviderIdentity::Nsfwjs.to_string(),
    }
}

pub struct NsfwProvider {
    images: Arc<dyn ImageStore>,
    model: Option<ModelHandle>,
    input_size: u32,
}

impl NsfwProvider {
    pub fn new(images: Arc<dyn ImageStore>) -> Self {
        NsfwProvider {
            images,
            model: None,
            input_size: 224,
        }
    }

    pub fn with_model(
        images: Arc<dyn ImageStore>,
        model: ModelHandle,
        input_size: u32,
    ) -> Self {
        NsfwProvider {
            images,
            model: Some(model),
            input_size,
        }
    }
}

#[cfg(feature = "onnx")]
fn load_model(path: PathBuf, input_size: u32) -> ::anyhow::Result<ModelHandle> {
    Ok(ModelHandle::spawn(move || {
        let classifier = super::onnx::OnnxClassifier::load(&path, input_size)?;
        Ok(Arc::new(classifier) as Arc<dyn NsfwClassifier>)
    }))
}

#[cfg(not(feature = "onnx"))]
fn load_model(path: PathBuf, _input_size: u32) -> ::anyhow::Result<ModelHandle> {
    Err(::anyhow::anyhow!(
        "cannot load {}: built without the onnx feature",
        path.display()
    ))
}

#[async_trait]
impl ModerationProvider for NsfwProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::Nsfwjs
    }

    fn display_name(&self) -> &'static str {
        "NSFW.js (Open Source)"
    }

    async fn init(&mut self, config: &Config) -> ::anyhow::Result<()> {
        let mut path = PathBuf::from(&config.nsfw_model_path);
        if path.is_relative() {
            path = ::std::env::current_dir()?.join(path);
        }
        if !path.exists() {
            return Err(::anyhow::anyhow!(
                "NSFW model not found at {}",
                path.display()
            ));
        }

        info!("Loading NSFW model from {}", path.display());
        self.input_size = config.nsfw_model_input_size;
        self.model = Some(load_model(path, self.input_size)?);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.model
            .as_ref()
            .map(|model| !model.is_failed())
            .unwrap_or(false)
    }

    async fn moderate_image(
        &self,
        photo: &ImageRef,
    ) -> ::anyhow::Result<ModerationResult> {
        let model = self.model.as_ref().ok_or_else(|| {
            ::anyhow::anyhow!("NSFW.js moderation provider is not enabled")
        })?;

        let classifier = model.wait().await?;
        let bytes = self.images.fetch(photo).await?;
        let input_size = self.input_size;

        let predictions = ::tokio::task::spawn_blocking(move || {
            let decoded = ::image::load_from_memory(&bytes)?;
            classifier.classify(&preprocess(&decoded, input_size))
        })
        .await??;

        let result = evaluate(&predictions);

        info!(
            "NSFW.js moderation: {} ({}%) - Adult: {:.1}%, Racy: {:.1}%",
            result.status,
            result.confidence,
            result.scores.adult.unwrap_or(0.0),
            result.scores.racy.unwrap_or(0.0)
        );

        Ok(result)
    }
}
