use super::interface::ModerationProvider;
use super::sigv4::{self, Credentials, JsonRequest};
use super::Verdict;

use crate::{
    config::Config,
    moderation::{
        safety_confidence, CategoryScores, ModerationResult, ProviderIdentity,
    },
    storage::{ImageRef, ImageStore},
};
use ::async_trait::async_trait;
use ::log::{debug, error, info, warn};
use ::regex::Regex;
use ::reqwest::Client;
use ::serde::{Deserialize, Serialize};
use ::std::sync::Arc;

const SERVICE: &str = "rekognition";
const TARGET: &str = "RekognitionService.DetectModerationLabels";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

const ADULT_KEYWORDS: [&str; 4] = ["explicit nudity", "nudity", "sexual", "adult"];
const VIOLENCE_KEYWORDS: [&str; 5] =
    ["violence", "weapon", "blood", "gore", "corpse"];
const SUGGESTIVE_KEYWORDS: [&str; 3] =
    ["suggestive", "revealing", "partial nudity"];

const REJECT_THRESHOLD: f64 = 80.0;
const REVIEW_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModerationLabel {
    pub name: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectModerationLabelsRequest {
    image: Image,
    min_confidence: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Image {
    bytes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectModerationLabelsResponse {
    #[serde(default)]
    moderation_labels: Vec<ModerationLabel>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Case-insensitive keyword matchers that sort labels into risk buckets.
pub struct LabelBuckets {
    adult: Regex,
    violence: Regex,
    suggestive: Regex,
}

fn keyword_pattern(keywords: &[&str]) -> Result<Regex, ::regex::Error> {
    let alternatives: Vec<String> =
        keywords.iter().map(|keyword| ::regex::escape(keyword)).collect();
    Regex::new(&format!("(?i){}", alternatives.join("|")))
}

impl LabelBuckets {
    pub fn new() -> ::anyhow::Result<Self> {
        Ok(LabelBuckets {
            adult: keyword_pattern(&ADULT_KEYWORDS)?,
            violence: keyword_pattern(&VIOLENCE_KEYWORDS)?,
            suggestive: keyword_pattern(&SUGGESTIVE_KEYWORDS)?,
        })
    }
}

/// Highest confidence seen for one bucket and the label that produced it.
#[derive(Default)]
struct BucketMax<'a> {
    confidence: f64,
    label: Option<&'a str>,
}

impl<'a> BucketMax<'a> {
    fn observe(&mut self, label: &'a ModerationLabel) {
        if self.label.is_none() || label.confidence > self.confidence {
            self.confidence = label.confidence;
            self.label = Some(&label.name);
        }
    }
}

fn check_severe(
    verdict: &mut Verdict,
    bucket: &BucketMax<'_>,
    detected: &str,
    possible: &str,
) {
    let Some(label) = bucket.label else {
        return;
    };
    if bucket.confidence > REJECT_THRESHOLD {
        verdict.reject(format!("{}: {}", detected, label));
    } else if bucket.confidence > REVIEW_THRESHOLD {
        verdict.review(format!("{}: {}", possible, label));
    }
}

/// Adult and violence buckets reject above 80 and ask for review above 60.
/// The suggestive bucket only asks for review. Confidence is 100 minus the
/// worst bucket, which is stricter than averaging.
pub fn evaluate(
    labels: &[ModerationLabel],
    buckets: &LabelBuckets,
) -> ModerationResult {
    let mut adult = BucketMax::default();
    let mut violence = BucketMax::default();
    let mut racy = BucketMax::default();

    for label in labels {
        if buckets.adult.is_match(&label.name) {
            adult.observe(label);
        }
        if buckets.violence.is_match(&label.name) {
            violence.observe(label);
        }
        if buckets.suggestive.is_match(&label.name) {
            racy.observe(label);
        }
    }

    let mut verdict = Verdict::new();
    check_severe(&mut verdict, &adult, "Adult content", "Possible adult content");
    check_severe(
        &mut verdict,
        &violence,
        "Violent content",
        "Possible violent content",
    );
    if let Some(label) = racy.label {
        if racy.confidence > REVIEW_THRESHOLD {
            verdict.review_if_clean(format!("Suggestive content: {}", label));
        }
    }

    let worst = adult
        .confidence
        .max(violence.confidence)
        .max(racy.confidence);

    let scores = CategoryScores {
        adult: Some(adult.confidence),
        violence: Some(violence.confidence),
        racy: Some(racy.confidence),
        medical: None,
    };

    let (status, reasons) = verdict.into_parts();

    ModerationResult {
        status,
        confidence: safety_confidence(worst),
        reasons,
        scores,
        details: ::serde_json::json!({ "labels": labels }),
        provider: ProviderIdentity::AwsRekognition.to_string(),
    }
}

/// Minimal DetectModerationLabels client.
pub struct Rekognition {
    endpoint: ::url::Url,
    host: String,
    region: String,
    credentials: Credentials,
    min_confidence: f64,
    client: Client,
}

impl Rekognition {
    pub fn new(
        region: String,
        credentials: Credentials,
        endpoint: Option<String>,
        min_confidence: f64,
    ) -> ::anyhow::Result<Self> {
        let endpoint = endpoint.unwrap_or_else(|| {
            format!("https://rekognition.{}.amazonaws.com", region)
        });
        let endpoint = ::url::Url::parse(&endpoint)?;

        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(::anyhow::anyhow!(
                    "Rekognition endpoint has no host: {}",
                    endpoint
                ))
            }
        };

        Ok(Rekognition {
            endpoint,
            host,
            region,
            credentials,
            min_confidence,
            client: Client::new(),
        })
    }

    pub async fn detect_moderation_labels(
        &self,
        image: &[u8],
    ) -> ::anyhow::Result<Vec<ModerationLabel>> {
        if image.is_empty() {
            return Err(::anyhow::anyhow!("Refusing to send an empty image"));
        }

        let body = ::serde_json::to_string(&DetectModerationLabelsRequest {
            image: Image {
                bytes: ::base64::encode(image),
            },
            min_confidence: self.min_confidence,
        })?;

        let signed = sigv4::sign(
            &self.credentials,
            &self.region,
            SERVICE,
            &JsonRequest {
                host: &self.host,
                target: TARGET,
                content_type: CONTENT_TYPE,
                payload: body.as_bytes(),
            },
            ::chrono::Utc::now(),
        );

        debug!("Rekognition request: image_bytes={}", image.len());

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", TARGET);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let parsed: DetectModerationLabelsResponse =
                ::serde_json::from_str(&body)?;
            return Ok(parsed.moderation_labels);
        }

        error!("Rekognition error: status={}, body={}", status, body);
        match ::serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => {
                let kind = err
                    .error_type
                    .rsplit('#')
                    .next()
                    .unwrap_or(err.error_type.as_str())
                    .to_string();
                Err(::anyhow::anyhow!(
                    "Rekognition error: {} - {}",
                    kind,
                    err.message
                ))
            }
            Err(_) => Err(::anyhow::anyhow!("Rekognition error: {}", status)),
        }
    }
}

struct Backend {
    client: Rekognition,
    buckets: LabelBuckets,
}

pub struct RekognitionProvider {
    images: Arc<dyn ImageStore>,
    backend: Option<Backend>,
}

impl RekognitionProvider {
    pub fn new(images: Arc<dyn ImageStore>) -> Self {
        RekognitionProvider {
            images,
            backend: None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|value| !value.trim().is_empty())
}

#[async_trait]
impl ModerationProvider for RekognitionProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::AwsRekognition
    }

    fn display_name(&self) -> &'static str {
        "AWS Rekognition"
    }

    async fn init(&mut self, config: &Config) -> ::anyhow::Result<()> {
        let (access_key_id, secret_access_key) = match (
            non_empty(&config.aws_access_key_id),
            non_empty(&config.aws_secret_access_key),
        ) {
            (Some(id), Some(secret)) => (id, secret),
            _ => return Err(::anyhow::anyhow!("AWS credentials not set")),
        };

        if config.aws_rekognition_min_confidence < 50.0 {
            warn!(
                "Rekognition MinConfidence {} is below the default of 50",
                config.aws_rekognition_min_confidence
            );
        }

        let client = Rekognition::new(
            config.aws_region.clone(),
            Credentials {
                access_key_id,
                secret_access_key,
                session_token: non_empty(&config.aws_session_token),
            },
            non_empty(&config.aws_rekognition_endpoint),
            config.aws_rekognition_min_confidence,
        )?;

        self.backend = Some(Backend {
            client,
            buckets: LabelBuckets::new()?,
        });
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    async fn moderate_image(
        &self,
        image: &ImageRef,
    ) -> ::anyhow::Result<ModerationResult> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            ::anyhow::anyhow!("AWS Rekognition moderation provider is not enabled")
        })?;

        let bytes = self.images.fetch(image).await?;
        let labels = backend.client.detect_moderation_labels(&bytes).await?;
        let result = evaluate(&labels, &backend.buckets);

        info!(
            "AWS Rekognition moderation: {} ({}%) - {}",
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
