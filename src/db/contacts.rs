use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::contact::{ContactMessage, NewContactMessage};

/// Append-only contact inbox.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// `None` when the code is already taken.
    async fn insert(&self, msg: &NewContactMessage) -> sqlx::Result<Option<ContactMessage>>;

    /// Newest first.
    async fn list(&self) -> sqlx::Result<Vec<ContactMessage>>;

    async fn find(&self, code: &str) -> sqlx::Result<Option<ContactMessage>>;
}

#[derive(Clone)]
pub struct PgContactRepository {
    pool: PgPool,
}

impl PgContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for PgContactRepository {
    async fn insert(&self, msg: &NewContactMessage) -> sqlx::Result<Option<ContactMessage>> {
        sqlx::query_as::<_, ContactMessage>(
            "INSERT INTO contact_messages (code, name, email, subject, body)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (code) DO NOTHING
             RETURNING code, name, email, subject, body, created_at",
        )
        .bind(&msg.code)
        .bind(&msg.name)
        .bind(&msg.email)
        .bind(&msg.subject)
        .bind(&msg.body)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list(&self) -> sqlx::Result<Vec<ContactMessage>> {
        sqlx::query_as::<_, ContactMessage>(
            "SELECT code, name, email, subject, body, created_at
             FROM contact_messages
             ORDER BY created_at DESC, code DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn find(&self, code: &str) -> sqlx::Result<Option<ContactMessage>> {
        sqlx::query_as::<_, ContactMessage>(
            "SELECT code, name, email, subject, body, created_at
             FROM contact_messages
             WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
    }
}
