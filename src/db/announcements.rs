use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder};

use crate::models::announcement::{Announcement, AnnouncementFields, AnnouncementPatch, Kind};

use super::single_active;

/// Storage for announcement rows.
///
/// Every write that leaves a row active also switches off every other row,
/// atomically with the write itself.
#[async_trait]
pub trait AnnouncementRepository: Send + Sync {
    /// Connectivity check for `/health`.
    async fn ping(&self) -> sqlx::Result<()>;

    async fn get(&self, id: i64) -> sqlx::Result<Option<Announcement>>;

    /// Most recently updated rows first.
    async fn list(&self, limit: i64) -> sqlx::Result<Vec<Announcement>>;

    /// The most recently updated active row whose window contains `now`.
    async fn find_active(&self, now: DateTime<Utc>) -> sqlx::Result<Option<Announcement>>;

    /// Insert a row and return its id.
    async fn insert(&self, fields: &AnnouncementFields) -> sqlx::Result<i64>;

    /// Overwrite every mutable column. `false` if the row does not exist.
    async fn update(&self, id: i64, fields: &AnnouncementFields) -> sqlx::Result<bool>;

    /// Overwrite only the supplied columns. `false` if the row does not exist.
    async fn patch(&self, id: i64, patch: &AnnouncementPatch) -> sqlx::Result<bool>;

    /// `false` if the row does not exist.
    async fn delete(&self, id: i64) -> sqlx::Result<bool>;

    /// Every file path referenced by any row.
    async fn referenced_files(&self) -> sqlx::Result<Vec<String>>;
}

const ANNOUNCEMENT_COLS: &str = "id, kind, title, message, link_url, image_url, carousel_images,
     active, dismissible, include_pages, exclude_pages, starts_at, ends_at,
     created_at, updated_at";

/// Raw row: kind is TEXT, slides are a JSONB array.
#[derive(Debug, FromRow)]
struct AnnouncementRow {
    id: i64,
    kind: String,
    title: Option<String>,
    message: Option<String>,
    link_url: Option<String>,
    image_url: Option<String>,
    carousel_images: Option<Json<Vec<String>>>,
    active: bool,
    dismissible: bool,
    include_pages: Option<String>,
    exclude_pages: Option<String>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AnnouncementRow> for Announcement {
    type Error = sqlx::Error;

    fn try_from(row: AnnouncementRow) -> Result<Self, Self::Error> {
        let kind: Kind = row
            .kind
            .parse()
            .map_err(|e: anyhow::Error| sqlx::Error::Decode(e.into()))?;
        let carousel_images = match kind {
            Kind::Carousel => Some(row.carousel_images.map(|j| j.0).unwrap_or_default()),
            _ => None,
        };

        Ok(Announcement {
            id: row.id,
            kind,
            title: row.title,
            message: row.message,
            link_url: row.link_url,
            image_url: row.image_url,
            carousel_images,
            active: row.active,
            dismissible: row.dismissible,
            include_pages: row.include_pages,
            exclude_pages: row.exclude_pages,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgAnnouncementRepository {
    pool: PgPool,
}

impl PgAnnouncementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn slides_param(fields: &AnnouncementFields) -> Option<Json<Vec<String>>> {
    match fields.kind {
        Kind::Carousel => fields.carousel_images.clone().map(Json),
        _ => None,
    }
}

#[async_trait]
impl AnnouncementRepository for PgAnnouncementRepository {
    async fn ping(&self) -> sqlx::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: i64) -> sqlx::Result<Option<Announcement>> {
        sqlx::query_as::<_, AnnouncementRow>(&format!(
            "SELECT {ANNOUNCEMENT_COLS} FROM announcements WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Announcement::try_from)
        .transpose()
    }

    async fn list(&self, limit: i64) -> sqlx::Result<Vec<Announcement>> {
        sqlx::query_as::<_, AnnouncementRow>(&format!(
            "SELECT {ANNOUNCEMENT_COLS} FROM announcements
             ORDER BY updated_at DESC, id DESC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Announcement::try_from)
        .collect()
    }

    async fn find_active(&self, now: DateTime<Utc>) -> sqlx::Result<Option<Announcement>> {
        sqlx::query_as::<_, AnnouncementRow>(&format!(
            "SELECT {ANNOUNCEMENT_COLS} FROM announcements
             WHERE active
               AND (starts_at IS NULL OR starts_at <= $1)
               AND (ends_at IS NULL OR ends_at >= $1)
             ORDER BY updated_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .map(Announcement::try_from)
        .transpose()
    }

    async fn insert(&self, fields: &AnnouncementFields) -> sqlx::Result<i64> {
        let mut tx = self.pool.begin().await?;

        if fields.active {
            single_active::lock(&mut *tx).await?;
            single_active::activate_exclusive(&mut *tx, None).await?;
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO announcements
                (kind, title, message, link_url, image_url, carousel_images, active, dismissible,
                 include_pages, exclude_pages, starts_at, ends_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING id",
        )
        .bind(fields.kind.to_string())
        .bind(&fields.title)
        .bind(&fields.message)
        .bind(&fields.link_url)
        .bind(&fields.image_url)
        .bind(slides_param(fields))
        .bind(fields.active)
        .bind(fields.dismissible)
        .bind(&fields.include_pages)
        .bind(&fields.exclude_pages)
        .bind(fields.starts_at)
        .bind(fields.ends_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn update(&self, id: i64, fields: &AnnouncementFields) -> sqlx::Result<bool> {
        let mut tx = self.pool.begin().await?;

        if fields.active {
            single_active::lock(&mut *tx).await?;
            single_active::activate_exclusive(&mut *tx, Some(id)).await?;
        }

        let result = sqlx::query(
            "UPDATE announcements
             SET kind = $1, title = $2, message = $3, link_url = $4, image_url = $5,
                 carousel_images = $6, active = $7, dismissible = $8, include_pages = $9,
                 exclude_pages = $10, starts_at = $11, ends_at = $12, updated_at = NOW()
             WHERE id = $13",
        )
        .bind(fields.kind.to_string())
        .bind(&fields.title)
        .bind(&fields.message)
        .bind(&fields.link_url)
        .bind(&fields.image_url)
        .bind(slides_param(fields))
        .bind(fields.active)
        .bind(fields.dismissible)
        .bind(&fields.include_pages)
        .bind(&fields.exclude_pages)
        .bind(fields.starts_at)
        .bind(fields.ends_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // dropping the transaction rolls back the deactivation
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn patch(&self, id: i64, patch: &AnnouncementPatch) -> sqlx::Result<bool> {
        let mut tx = self.pool.begin().await?;

        if patch.active == Some(true) {
            single_active::lock(&mut *tx).await?;
            single_active::activate_exclusive(&mut *tx, Some(id)).await?;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE announcements SET updated_at = NOW()");
        if let Some(kind) = patch.kind {
            qb.push(", kind = ").push_bind(kind.to_string());
        }
        if let Some(title) = &patch.title {
            qb.push(", title = ").push_bind(title.clone());
        }
        if let Some(message) = &patch.message {
            qb.push(", message = ").push_bind(message.clone());
        }
        if let Some(link_url) = &patch.link_url {
            qb.push(", link_url = ").push_bind(link_url.clone());
        }
        if let Some(image_url) = &patch.image_url {
            qb.push(", image_url = ").push_bind(image_url.clone());
        }
        if let Some(active) = patch.active {
            qb.push(", active = ").push_bind(active);
        }
        if let Some(dismissible) = patch.dismissible {
            qb.push(", dismissible = ").push_bind(dismissible);
        }
        if let Some(include_pages) = &patch.include_pages {
            qb.push(", include_pages = ").push_bind(include_pages.clone());
        }
        if let Some(exclude_pages) = &patch.exclude_pages {
            qb.push(", exclude_pages = ").push_bind(exclude_pages.clone());
        }
        if let Some(starts_at) = patch.starts_at {
            qb.push(", starts_at = ").push_bind(starts_at);
        }
        if let Some(ends_at) = patch.ends_at {
            qb.push(", ends_at = ").push_bind(ends_at);
        }
        if patch.clear_carousel {
            qb.push(", carousel_images = NULL");
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM announcements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn referenced_files(&self) -> sqlx::Result<Vec<String>> {
        let rows: Vec<(Option<String>, Option<Json<Vec<String>>>)> =
            sqlx::query_as("SELECT image_url, carousel_images FROM announcements")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .flat_map(|(image, slides)| {
                image
                    .into_iter()
                    .chain(slides.map(|j| j.0).unwrap_or_default())
            })
            .collect())
    }
}
