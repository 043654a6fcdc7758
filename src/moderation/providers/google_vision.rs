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
use ::log::{debug, error, info};
use ::reqwest::Client;
use ::serde::{Deserialize, Serialize};
use ::std::sync::Arc;

/// Five-point likelihood scale returned by SafeSearch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Likelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

impl Likelihood {
    pub fn score(&self) -> f64 {
        match self {
            Likelihood::Unknown => 0.0,
            Likelihood::VeryUnlikely => 5.0,
            Likelihood::Unlikely => 20.0,
            Likelihood::Possible => 50.0,
            Likelihood::Likely => 80.0,
            Likelihood::VeryLikely => 95.0,
        }
    }

    fn is_high_risk(&self) -> bool {
        matches!(self, Likelihood::Likely | Likelihood::VeryLikely)
    }

    fn is_medium_risk(&self) -> bool {
        *self == Likelihood::Possible
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafeSearchAnnotation {
    #[serde(default)]
    pub adult: Likelihood,
    #[serde(default)]
    pub spoof: Likelihood,
    #[serde(default)]
    pub medical: Likelihood,
    #[serde(default)]
    pub violence: Likelihood,
    #[serde(default)]
    pub racy: Likelihood,
}

#[derive(Debug, Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Debug, Serialize)]
struct AnnotateImageRequest {
    image: Image,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct Image {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    feature_type: String,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    safe_search_annotation: Option<SafeSearchAnnotation>,
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Status,
}

/// Thin client for the `images:annotate` SafeSearch endpoint.
pub struct SafeSearch {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl SafeSearch {
    pub fn new(endpoint: String, api_key: String) -> Self {
        SafeSearch {
            endpoint,
            api_key,
            client: Client::new(),
        }
    }

    fn build_url(&self) -> ::anyhow::Result<::url::Url> {
        let mut url = ::url::Url::parse(&format!(
            "{}/v1/images:annotate",
            self.endpoint.trim_end_matches('/')
        ))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn build_request_body(&self, image: &[u8]) -> AnnotateRequest {
        AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: Image {
                    content: ::base64::encode(image),
                },
                features: vec![Feature {
                    feature_type: "SAFE_SEARCH_DETECTION".to_string(),
                }],
            }],
        }
    }

    pub async fn detect(
        &self,
        image: &[u8],
    ) -> ::anyhow::Result<SafeSearchAnnotation> {
        if image.is_empty() {
            return Err(::anyhow::anyhow!("Refusing to send an empty image"));
        }

        let url = self.build_url()?;
        let body = ::serde_json::to_string(&self.build_request_body(image))?;

        debug!("Google Vision request: image_bytes={}", image.len());

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Google Vision error: status={}, body={}", status, body);
            return match ::serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => Err(::anyhow::anyhow!(
                    "Google Vision error: {} - {}",
                    err.error.code,
                    err.error.message
                )),
                Err(_) => {
                    Err(::anyhow::anyhow!("Google Vision error: {}", status))
                }
            };
        }

        let parsed: AnnotateResponse = ::serde_json::from_str(&body)?;
        let first = parsed
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| ::anyhow::anyhow!("Google Vision returned no responses"))?;

        if let Some(err) = first.error {
            return Err(::anyhow::anyhow!(
                "Google Vision error: {} - {}",
                err.code,
                err.message
            ));
        }

        first.safe_search_annotation.ok_or_else(|| {
            ::anyhow::anyhow!("Google Vision returned no SafeSearch annotation")
        })
    }
}

/// Adult or violence at LIKELY and above rejects, POSSIBLE asks for review.
/// Racy content can only ask for review. Confidence is 100 minus the
/// average of the three category scores.
pub fn evaluate(annotation: &SafeSearchAnnotation) -> ModerationResult {
    let mut verdict = Verdict::new();

    if annotation.adult.is_high_risk() {
        verdict.reject("Adult content detected");
    } else if annotation.adult.is_medium_risk() {
        verdict.review("Possible adult content");
    }

    if annotation.violence.is_high_risk() {
        verdict.reject("Violent content detected");
    } else if annotation.violence.is_medium_risk() {
        verdict.review("Possible violent content");
    }

    if annotation.racy.is_high_risk() {
        verdict.review("Suggestive content detected");
    }

    let scores = CategoryScores {
        adult: Some(annotation.adult.score()),
        violence: Some(annotation.violence.score()),
        racy: Some(annotation.racy.score()),
        medical: Some(annotation.medical.score()),
    };

    let average_risk = (annotation.adult.score()
        + annotation.violence.score()
        + annotation.racy.score())
        / 3.0;

    let (status, reasons) = verdict.into_parts();

    ModerationResult {
        status,
        confidence: safety_confidence(average_risk),
        reasons,
        scores,
        details: ::serde_json::to_value(annotation)
            .unwrap_or(::serde_json::Value::Null),
        provider: ProviderIdentity::GoogleVision.to_string(),
    }
}

pub struct GoogleVisionProvider {
    images: Arc<dyn ImageStore>,
    safe_search: Option<SafeSearch>,
}

impl GoogleVisionProvider {
    pub fn new(images: Arc<dyn ImageStore>) -> Self {
        GoogleVisionProvider {
            images,
            safe_search: None,
        }
    }
}

#[async_trait]
impl ModerationProvider for GoogleVisionProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::GoogleVision
    }

    fn display_name(&self) -> &'static str {
        "Google Cloud Vision API"
    }

    async fn init(&mut self, config: &Config) -> ::anyhow::Result<()> {
        let api_key = config
            .google_vision_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ::anyhow::anyhow!("Google Vision API key not set"))?;

        self.safe_search = Some(SafeSearch::new(
            config.google_vision_endpoint.clone(),
            api_key,
        ));
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.safe_search.is_some()
    }

    async fn moderate_image(
        &self,
        image: &ImageRef,
    ) -> ::anyhow::Result<ModerationResult> {
        let safe_search = self.safe_search.as_ref().ok_or_else(|| {
            ::anyhow::anyhow!("Google Vision moderation provider is not enabled")
        })?;

        let bytes = self.images.fetch(image).await?;
        let annotation = safe_search.detect(&bytes).await?;
        let result = evaluate(&annotation);

        info!(
            "Google Vision moderation: {} ({}%) - {}",
            result.status,
            result.confidence,
            if result.reasons.is_empty() {
                "Clean".to_string()
            } else {
                result.reasons.join(", ")
            }
        );

        Ok(result)
    }
}
