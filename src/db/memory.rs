//! In-memory repositories with the same semantics as the PostgreSQL ones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::{
    announcement::{Announcement, AnnouncementFields, AnnouncementPatch, Kind},
    contact::{ContactMessage, NewContactMessage},
};

use super::{AnnouncementRepository, ContactRepository};

#[derive(Default)]
struct Table {
    rows: Vec<Announcement>,
    next_id: i64,
    clock: Option<DateTime<Utc>>,
}

impl Table {
    /// Strictly increasing timestamps so "most recently updated" is stable.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn deactivate_except(&mut self, keep: Option<i64>) {
        for row in self.rows.iter_mut().filter(|r| Some(r.id) != keep) {
            row.active = false;
        }
    }
}

#[derive(Default)]
pub struct MemoryAnnouncementRepository {
    table: Mutex<Table>,
    fail_writes: AtomicBool,
}

impl MemoryAnnouncementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail like a lost database connection.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn active_count(&self) -> usize {
        self.table.lock().unwrap().rows.iter().filter(|r| r.active).count()
    }

    pub fn row_count(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }

    /// Force a column value, bypassing the single-active rule.
    pub fn force(&self, id: i64, f: impl FnOnce(&mut Announcement)) {
        let mut table = self.table.lock().unwrap();
        if let Some(row) = table.rows.iter_mut().find(|r| r.id == id) {
            f(row);
        }
    }

    fn check_writable(&self) -> sqlx::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("simulated write failure".into()));
        }
        Ok(())
    }
}

fn slides_for(fields: &AnnouncementFields) -> Option<Vec<String>> {
    match fields.kind {
        Kind::Carousel => Some(fields.carousel_images.clone().unwrap_or_default()),
        _ => None,
    }
}

fn apply_fields(row: &mut Announcement, fields: &AnnouncementFields) {
    row.kind = fields.kind;
    row.title = fields.title.clone();
    row.message = fields.message.clone();
    row.link_url = fields.link_url.clone();
    row.image_url = fields.image_url.clone();
    row.carousel_images = slides_for(fields);
    row.active = fields.active;
    row.dismissible = fields.dismissible;
    row.include_pages = fields.include_pages.clone();
    row.exclude_pages = fields.exclude_pages.clone();
    row.starts_at = fields.starts_at;
    row.ends_at = fields.ends_at;
}

#[async_trait]
impl AnnouncementRepository for MemoryAnnouncementRepository {
    async fn ping(&self) -> sqlx::Result<()> {
        Ok(())
    }

    async fn get(&self, id: i64) -> sqlx::Result<Option<Announcement>> {
        let table = self.table.lock().unwrap();
        Ok(table.rows.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, limit: i64) -> sqlx::Result<Vec<Announcement>> {
        let table = self.table.lock().unwrap();
        let mut rows = table.rows.clone();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn find_active(&self, now: DateTime<Utc>) -> sqlx::Result<Option<Announcement>> {
        let table = self.table.lock().unwrap();
        Ok(table
            .rows
            .iter()
            .filter(|r| r.active && r.in_window(now))
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn insert(&self, fields: &AnnouncementFields) -> sqlx::Result<i64> {
        self.check_writable()?;
        let mut table = self.table.lock().unwrap();
        if fields.active {
            table.deactivate_except(None);
        }

        table.next_id += 1;
        let id = table.next_id;
        let now = table.tick();
        let mut row = Announcement {
            id,
            kind: fields.kind,
            title: None,
            message: None,
            link_url: None,
            image_url: None,
            carousel_images: None,
            active: false,
            dismissible: true,
            include_pages: None,
            exclude_pages: None,
            starts_at: None,
            ends_at: None,
            created_at: now,
            updated_at: now,
        };
        apply_fields(&mut row, fields);
        table.rows.push(row);
        Ok(id)
    }

    async fn update(&self, id: i64, fields: &AnnouncementFields) -> sqlx::Result<bool> {
        self.check_writable()?;
        let mut table = self.table.lock().unwrap();
        if !table.rows.iter().any(|r| r.id == id) {
            return Ok(false);
        }
        if fields.active {
            table.deactivate_except(Some(id));
        }
        let now = table.tick();
        if let Some(row) = table.rows.iter_mut().find(|r| r.id == id) {
            apply_fields(row, fields);
            row.updated_at = now;
        }
        Ok(true)
    }

    async fn patch(&self, id: i64, patch: &AnnouncementPatch) -> sqlx::Result<bool> {
        self.check_writable()?;
        let mut table = self.table.lock().unwrap();
        if !table.rows.iter().any(|r| r.id == id) {
            return Ok(false);
        }
        if patch.active == Some(true) {
            table.deactivate_except(Some(id));
        }
        let now = table.tick();
        let Some(row) = table.rows.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };

        if let Some(kind) = patch.kind {
            row.kind = kind;
        }
        if let Some(v) = &patch.title {
            row.title = v.clone();
        }
        if let Some(v) = &patch.message {
            row.message = v.clone();
        }
        if let Some(v) = &patch.link_url {
            row.link_url = v.clone();
        }
        if let Some(v) = &patch.image_url {
            row.image_url = v.clone();
        }
        if let Some(v) = patch.active {
            row.active = v;
        }
        if let Some(v) = patch.dismissible {
            row.dismissible = v;
        }
        if let Some(v) = &patch.include_pages {
            row.include_pages = v.clone();
        }
        if let Some(v) = &patch.exclude_pages {
            row.exclude_pages = v.clone();
        }
        if let Some(v) = patch.starts_at {
            row.starts_at = v;
        }
        if let Some(v) = patch.ends_at {
            row.ends_at = v;
        }
        if patch.clear_carousel {
            row.carousel_images = None;
        }
        // the serving layer only exposes slides for carousels
        if row.kind == Kind::Carousel && row.carousel_images.is_none() {
            row.carousel_images = Some(Vec::new());
        } else if row.kind != Kind::Carousel {
            row.carousel_images = None;
        }
        row.updated_at = now;
        Ok(true)
    }

    async fn delete(&self, id: i64) -> sqlx::Result<bool> {
        self.check_writable()?;
        let mut table = self.table.lock().unwrap();
        let before = table.rows.len();
        table.rows.retain(|r| r.id != id);
        Ok(table.rows.len() != before)
    }

    async fn referenced_files(&self) -> sqlx::Result<Vec<String>> {
        let table = self.table.lock().unwrap();
        Ok(table.rows.iter().flat_map(Announcement::referenced_files).collect())
    }
}

#[derive(Default)]
pub struct MemoryContactRepository {
    rows: Mutex<Vec<ContactMessage>>,
    fail_writes: AtomicBool,
}

impl MemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ContactRepository for MemoryContactRepository {
    async fn insert(&self, msg: &NewContactMessage) -> sqlx::Result<Option<ContactMessage>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("simulated write failure".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.code == msg.code) {
            return Ok(None);
        }
        let row = ContactMessage {
            code: msg.code.clone(),
            name: msg.name.clone(),
            email: msg.email.clone(),
            subject: msg.subject.clone(),
            body: msg.body.clone(),
            created_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(Some(row))
    }

    async fn list(&self) -> sqlx::Result<Vec<ContactMessage>> {
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.code.cmp(&a.code)));
        Ok(rows)
    }

    async fn find(&self, code: &str) -> sqlx::Result<Option<ContactMessage>> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.code == code).cloned())
    }
}
