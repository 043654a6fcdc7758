use ::async_trait::async_trait;
use ::chrono::{DateTime, Utc};
use ::sqlx::types::Json;
use ::sqlx::Executor;
use ::uuid::Uuid;

use crate::moderation::ModerationSummary;
use crate::storage::ImageRef;
use crate::submissions::{
    AbuseCounter, NewSubmission, Submission, SubmissionItem,
    SubmissionRepository, SubmissionStatus,
};

const SUBMISSION_COLUMNS: &str = "
    id, user_id, bar_id, photo, status, moderation,
    created_at, validated_at, rejected_at
";

pub async fn prepare_database(
    transaction: &mut ::sqlx::Transaction<'_, ::sqlx::Postgres>,
) -> ::sqlx::Result<()> {
    transaction.execute(include_str!("schema.sql")).await?;
    Ok(())
}

#[derive(::sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    user_id: Uuid,
    bar_id: Uuid,
    photo: String,
    status: SubmissionStatus,
    moderation: Option<Json<ModerationSummary>>,
    created_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
}

#[derive(::sqlx::FromRow)]
struct ItemRow {
    drink_id: Uuid,
    friend_id: Option<Uuid>,
}

impl SubmissionRow {
    fn into_submission(
        self,
        items: Vec<SubmissionItem>,
    ) -> ::anyhow::Result<Submission> {
        Ok(Submission {
            id: self.id,
            user_id: self.user_id,
            bar_id: self.bar_id,
            photo: ImageRef::parse(&self.photo)?,
            status: self.status,
            items,
            moderation: self.moderation.map(|Json(summary)| summary),
            created_at: self.created_at,
            validated_at: self.validated_at,
            rejected_at: self.rejected_at,
        })
    }
}

/// Postgres backed submissions and user flag counts.
#[derive(Clone)]
pub struct PgStore {
    pool: ::sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: ::sqlx::PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn ping(&self) -> ::anyhow::Result<()> {
        ::sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn load_items(
        &self,
        submission_id: Uuid,
    ) -> ::anyhow::Result<Vec<SubmissionItem>> {
        let query = "
            SELECT drink_id, friend_id
            FROM photo_submission_items
            WHERE submission_id = $1
            ORDER BY position ASC
        ";

        let rows: Vec<ItemRow> = ::sqlx::query_as(query)
            .bind(submission_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| SubmissionItem {
                drink_id: row.drink_id,
                friend_id: row.friend_id,
            })
            .collect())
    }
}

#[async_trait]
impl SubmissionRepository for PgStore {
    async fn bar_exists(&self, bar_id: Uuid) -> ::anyhow::Result<bool> {
        let query = "SELECT EXISTS (SELECT 1 FROM bars WHERE id = $1)";

        let exists: bool = ::sqlx::query_scalar(query)
            .bind(bar_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn bar_for_api_key(
        &self,
        api_key: &str,
    ) -> ::anyhow::Result<Option<Uuid>> {
        let query = "SELECT id FROM bars WHERE api_key = $1";

        let bar_id: Option<Uuid> = ::sqlx::query_scalar(query)
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(bar_id)
    }

    async fn create_submission(
        &self,
        submission: &NewSubmission,
        moderation: Option<&ModerationSummary>,
    ) -> ::anyhow::Result<Submission> {
        let insert_submission = format!(
            "
            INSERT INTO photo_submissions
                (id, user_id, bar_id, photo, status, moderation)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {}
            ",
            SUBMISSION_COLUMNS
        );

        let insert_item = "
            INSERT INTO photo_submission_items
                (submission_id, position, drink_id, friend_id)
            VALUES ($1, $2, $3, $4)
        ";

        let mut transaction = self.pool.begin().await?;

        let row: SubmissionRow = ::sqlx::query_as(&insert_submission)
            .bind(Uuid::new_v4())
            .bind(submission.user_id)
            .bind(submission.bar_id)
            .bind(submission.photo.to_string())
            .bind(moderation.map(Json))
            .fetch_one(&mut *transaction)
            .await?;

        for (position, item) in submission.items.iter().enumerate() {
            ::sqlx::query(insert_item)
                .bind(row.id)
                .bind(i32::try_from(position)?)
                .bind(item.drink_id)
                .bind(item.friend_id)
                .execute(&mut *transaction)
                .await?;
        }

        transaction.commit().await?;

        row.into_submission(submission.items.clone())
    }

    async fn load_submission(
        &self,
        id: Uuid,
    ) -> ::anyhow::Result<Option<Submission>> {
        let query = format!(
            "SELECT {} FROM photo_submissions WHERE id = $1",
            SUBMISSION_COLUMNS
        );

        let row: Option<SubmissionRow> = ::sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let items = self.load_items(row.id).await?;
                Ok(Some(row.into_submission(items)?))
            }
            None => Ok(None),
        }
    }

    async fn finish_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
    ) -> ::anyhow::Result<Option<Submission>> {
        let query = format!(
            "
            UPDATE photo_submissions
            SET status = $2,
                validated_at = CASE
                    WHEN $2 = 'validated'::submission_status THEN NOW()
                    ELSE validated_at
                END,
                rejected_at = CASE
                    WHEN $2 = 'rejected'::submission_status THEN NOW()
                    ELSE rejected_at
                END
            WHERE id = $1
            AND status = 'pending'
            RETURNING {}
            ",
            SUBMISSION_COLUMNS
        );

        let row: Option<SubmissionRow> = ::sqlx::query_as(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let items = self.load_items(row.id).await?;
                Ok(Some(row.into_submission(items)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AbuseCounter for PgStore {
    async fn increment(&self, user_id: Uuid) -> ::anyhow::Result<()> {
        let query = "
            UPDATE users
            SET flag_count = flag_count + 1
            WHERE id = $1
        ";

        let result = ::sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(::anyhow::anyhow!("Unknown user {}", user_id));
        }

        Ok(())
    }
}
