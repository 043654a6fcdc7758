use ::serde::{Deserialize, Serialize};

pub mod providers;
pub mod service;

/// Provider name reported when no backend produced a verdict.
pub const NO_PROVIDER: &str = "NONE";

pub(crate) const DEGRADED_REASON: &str =
    "Automatic moderation failed — requires manual review";

pub(crate) const BATCH_FAILURE_REASON: &str = "Moderation failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationStatus {
    Approved,
    Rejected,
    NeedsReview,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Approved => "APPROVED",
            ModerationStatus::Rejected => "REJECTED",
            ModerationStatus::NeedsReview => "NEEDS_REVIEW",
        }
    }

    pub(crate) fn metric_key(&self) -> &'static str {
        match self {
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::NeedsReview => "needs_review",
        }
    }
}

impl ::std::fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderIdentity {
    GoogleVision,
    AwsRekognition,
    Nsfwjs,
}

impl ProviderIdentity {
    /// Order in which alternates are tried once the preferred provider
    /// has failed. The local model goes first since it costs nothing.
    pub const FALLBACK_ORDER: [ProviderIdentity; 3] = [
        ProviderIdentity::Nsfwjs,
        ProviderIdentity::GoogleVision,
        ProviderIdentity::AwsRekognition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderIdentity::GoogleVision => "GOOGLE_VISION",
            ProviderIdentity::AwsRekognition => "AWS_REKOGNITION",
            ProviderIdentity::Nsfwjs => "NSFWJS",
        }
    }

    pub(crate) fn metric_key(&self) -> &'static str {
        match self {
            ProviderIdentity::GoogleVision => "google_vision",
            ProviderIdentity::AwsRekognition => "aws_rekognition",
            ProviderIdentity::Nsfwjs => "nsfwjs",
        }
    }
}

impl ::std::fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, ::thiserror::Error)]
#[error("unknown moderation provider: {0}")]
pub struct UnknownProvider(pub String);

impl ::std::str::FromStr for ProviderIdentity {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GOOGLE_VISION" => Ok(ProviderIdentity::GoogleVision),
            "AWS_REKOGNITION" => Ok(ProviderIdentity::AwsRekognition),
            "NSFWJS" => Ok(ProviderIdentity::Nsfwjs),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// Per-category risk on a 0-100 scale. `None` means the provider did not
/// evaluate the category, which is different from a zero risk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adult: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub racy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical: Option<f64>,
}

/// Outcome of evaluating one image. Built fresh for every call.
///
/// `confidence` is the confidence that the content is safe, so higher
/// values are safer. Each adapter derives it from its own scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub status: ModerationStatus,
    pub confidence: u8,
    pub reasons: Vec<String>,
    pub scores: CategoryScores,
    /// Raw classifier output, kept for audit only.
    #[serde(default, skip_serializing_if = "::serde_json::Value::is_null")]
    pub details: ::serde_json::Value,
    pub provider: String,
}

impl ModerationResult {
    /// Verdict used when no provider could evaluate the image.
    pub fn degraded() -> Self {
        Self::unmoderated(DEGRADED_REASON)
    }

    /// Verdict used for a batch entry whose evaluation blew up.
    pub fn batch_failure() -> Self {
        Self::unmoderated(BATCH_FAILURE_REASON)
    }

    fn unmoderated(reason: &str) -> Self {
        ModerationResult {
            status: ModerationStatus::NeedsReview,
            confidence: 0,
            reasons: vec![reason.to_string()],
            scores: CategoryScores::default(),
            details: ::serde_json::Value::Null,
            provider: NO_PROVIDER.to_string(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.provider == NO_PROVIDER
    }

    pub fn summary(&self) -> ModerationSummary {
        ModerationSummary {
            status: self.status,
            reasons: self.reasons.clone(),
            scores: self.scores,
        }
    }
}

/// The part of a verdict that is stored alongside a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationSummary {
    pub status: ModerationStatus,
    pub reasons: Vec<String>,
    pub scores: CategoryScores,
}

/// Turns a 0-100 risk into a rounded 0-100 safety confidence.
pub(crate) fn safety_confidence(risk: f64) -> u8 {
    (100.0 - risk).clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_identity_parse() {
        assert_eq!(
            "nsfwjs".parse::<ProviderIdentity>().unwrap(),
            ProviderIdentity::Nsfwjs
        );
        assert_eq!(
            " Google_Vision ".parse::<ProviderIdentity>().unwrap(),
            ProviderIdentity::GoogleVision
        );
        assert!("azure".parse::<ProviderIdentity>().is_err());
    }

    #[test]
    fn test_degraded_result() {
        let result = ModerationResult::degraded();
        assert_eq!(result.status, ModerationStatus::NeedsReview);
        assert_eq!(result.confidence, 0);
        assert_eq!(result.provider, "NONE");
        assert!(!result.reasons.is_empty());
        assert!(result.is_degraded());
    }

    #[test]
    fn test_serialized_shape() {
        let result = ModerationResult {
            status: ModerationStatus::NeedsReview,
            confidence: 70,
            reasons: vec!["Possible adult content".to_string()],
            scores: CategoryScores {
                adult: Some(50.0),
                ..Default::default()
            },
            details: ::serde_json::Value::Null,
            provider: ProviderIdentity::GoogleVision.to_string(),
        };

        let value = ::serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "NEEDS_REVIEW");
        assert_eq!(value["provider"], "GOOGLE_VISION");
        assert_eq!(value["scores"]["adult"], 50.0);
        assert!(value["scores"].get("violence").is_none());
        assert!(value.get("details").is_none());
    }

    #[test]
    fn test_safety_confidence_bounds() {
        assert_eq!(safety_confidence(0.0), 100);
        assert_eq!(safety_confidence(12.4), 88);
        assert_eq!(safety_confidence(140.0), 0);
    }
}
