#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use photo_moderation::{
    config::Config,
    moderation::{
        providers::interface::ModerationProvider, service::PhotoModerator,
        CategoryScores, ModerationResult, ModerationStatus, ModerationSummary,
        ProviderIdentity,
    },
    storage::{ImageRef, ImageStore},
    submissions::{
        AbuseCounter, NewSubmission, Submission, SubmissionItem,
        SubmissionRepository, SubmissionStatus,
    },
};

pub fn verdict(
    status: ModerationStatus,
    provider: ProviderIdentity,
    reasons: &[&str],
) -> ModerationResult {
    ModerationResult {
        status,
        confidence: match status {
            ModerationStatus::Approved => 95,
            ModerationStatus::NeedsReview => 50,
            ModerationStatus::Rejected => 5,
        },
        reasons: reasons.iter().map(|reason| reason.to_string()).collect(),
        scores: CategoryScores {
            adult: Some(match status {
                ModerationStatus::Approved => 5.0,
                ModerationStatus::NeedsReview => 50.0,
                ModerationStatus::Rejected => 95.0,
            }),
            ..Default::default()
        },
        details: serde_json::Value::Null,
        provider: provider.to_string(),
    }
}

pub fn image(reference: &str) -> ImageRef {
    ImageRef::parse(reference).unwrap()
}

pub fn make_config(overrides: &[(&str, &str)]) -> Config {
    use envconfig::Envconfig;

    let mut vars = HashMap::new();
    vars.insert("ADMIN_TOKEN".to_string(), "admin".to_string());
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::init_from_hashmap(&vars).unwrap()
}

/// Provider that answers from a script and counts its calls.
pub struct ScriptedProvider {
    identity: ProviderIdentity,
    enabled: bool,
    answer: Option<ModerationStatus>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn answering(
        identity: ProviderIdentity,
        status: ModerationStatus,
    ) -> Arc<Self> {
        Arc::new(ScriptedProvider {
            identity,
            enabled: true,
            answer: Some(status),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(identity: ProviderIdentity) -> Arc<Self> {
        Arc::new(ScriptedProvider {
            identity,
            enabled: true,
            answer: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn disabled(identity: ProviderIdentity) -> Arc<Self> {
        Arc::new(ScriptedProvider {
            identity,
            enabled: false,
            answer: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
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

    async fn init(&mut self, _config: &Config) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn moderate_image(
        &self,
        _image: &ImageRef,
    ) -> anyhow::Result<ModerationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Some(status) => Ok(verdict(status, self.identity, &[])),
            None => Err(anyhow::anyhow!("{} is down", self.identity)),
        }
    }
}

/// Moderator that returns a fixed verdict, or fails outright.
pub struct ScriptedModerator {
    result: Option<ModerationResult>,
    calls: AtomicUsize,
}

impl ScriptedModerator {
    pub fn returning(result: ModerationResult) -> Arc<Self> {
        Arc::new(ScriptedModerator {
            result: Some(result),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(ScriptedModerator {
            result: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhotoModerator for ScriptedModerator {
    async fn moderate_photo(
        &self,
        _image: &ImageRef,
    ) -> anyhow::Result<ModerationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .ok_or_else(|| anyhow::anyhow!("moderation service misconfigured"))
    }
}

/// In-memory image store that records deletions.
#[derive(Default)]
pub struct MemoryImageStore {
    images: Mutex<HashMap<String, Bytes>>,
    deleted: Mutex<Vec<ImageRef>>,
    fail_deletes: bool,
}

impl MemoryImageStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryImageStore::default())
    }

    pub fn failing_deletes() -> Arc<Self> {
        Arc::new(MemoryImageStore {
            fail_deletes: true,
            ..Default::default()
        })
    }

    pub fn insert(&self, reference: &str, bytes: &'static [u8]) {
        self.images
            .lock()
            .unwrap()
            .insert(reference.to_string(), Bytes::from_static(bytes));
    }

    pub fn deleted(&self) -> Vec<ImageRef> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn fetch(&self, image: &ImageRef) -> anyhow::Result<Bytes> {
        self.images
            .lock()
            .unwrap()
            .get(&image.to_string())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Image file not found: {}", image))
    }

    async fn delete(&self, image: &ImageRef) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(image.clone());
        if self.fail_deletes {
            return Err(anyhow::anyhow!("permission denied"));
        }
        self.images.lock().unwrap().remove(&image.to_string());
        Ok(())
    }
}

/// In-memory bars and submissions.
#[derive(Default)]
pub struct MemoryRepository {
    bars: Mutex<HashMap<Uuid, String>>,
    submissions: Mutex<HashMap<Uuid, Submission>>,
}

impl MemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryRepository::default())
    }

    pub fn add_bar(&self, api_key: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.bars.lock().unwrap().insert(id, api_key.to_string());
        id
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn get(&self, id: Uuid) -> Option<Submission> {
        self.submissions.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl SubmissionRepository for MemoryRepository {
    async fn bar_exists(&self, bar_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.bars.lock().unwrap().contains_key(&bar_id))
    }

    async fn bar_for_api_key(&self, api_key: &str) -> anyhow::Result<Option<Uuid>> {
        Ok(self
            .bars
            .lock()
            .unwrap()
            .iter()
            .find(|(_, key)| key.as_str() == api_key)
            .map(|(id, _)| *id))
    }

    async fn create_submission(
        &self,
        submission: &NewSubmission,
        moderation: Option<&ModerationSummary>,
    ) -> anyhow::Result<Submission> {
        let created = Submission {
            id: Uuid::new_v4(),
            user_id: submission.user_id,
            bar_id: submission.bar_id,
            photo: submission.photo.clone(),
            status: SubmissionStatus::Pending,
            items: submission.items.clone(),
            moderation: moderation.cloned(),
            created_at: Utc::now(),
            validated_at: None,
            rejected_at: None,
        };
        self.submissions
            .lock()
            .unwrap()
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn load_submission(&self, id: Uuid) -> anyhow::Result<Option<Submission>> {
        Ok(self.get(id))
    }

    async fn finish_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
    ) -> anyhow::Result<Option<Submission>> {
        let mut submissions = self.submissions.lock().unwrap();
        let submission = match submissions.get_mut(&id) {
            Some(submission) if submission.status == SubmissionStatus::Pending => {
                submission
            }
            _ => return Ok(None),
        };

        submission.status = status;
        match status {
            SubmissionStatus::Validated => submission.validated_at = Some(Utc::now()),
            SubmissionStatus::Rejected => submission.rejected_at = Some(Utc::now()),
            SubmissionStatus::Pending => {}
        }
        Ok(Some(submission.clone()))
    }
}

#[derive(Default)]
pub struct RecordingAbuseCounter {
    increments: Mutex<Vec<Uuid>>,
}

impl RecordingAbuseCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingAbuseCounter::default())
    }

    pub fn increments(&self) -> Vec<Uuid> {
        self.increments.lock().unwrap().clone()
    }
}

#[async_trait]
impl AbuseCounter for RecordingAbuseCounter {
    async fn increment(&self, user_id: Uuid) -> anyhow::Result<()> {
        self.increments.lock().unwrap().push(user_id);
        Ok(())
    }
}

pub fn new_submission(bar_id: Uuid, photo: &str) -> NewSubmission {
    NewSubmission {
        user_id: Uuid::new_v4(),
        bar_id,
        photo: image(photo),
        items: vec![
            SubmissionItem {
                drink_id: Uuid::new_v4(),
                friend_id: None,
            },
            SubmissionItem {
                drink_id: Uuid::new_v4(),
                friend_id: Some(Uuid::new_v4()),
            },
        ],
    }
}
