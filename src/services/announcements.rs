use std::collections::{HashMap, HashSet};

use axum::extract::Multipart;
use chrono::{DateTime, Utc};

use crate::{
    db::AnnouncementRepository,
    error::ApiError,
    models::announcement::{
        non_empty, parse_flag, parse_timestamp, Announcement, AnnouncementFields,
        AnnouncementPatch, Kind, KIND_VALUES,
    },
    services::uploads::{check_image, FileCategory, FileStore, UploadGuard},
};

/// Rows returned by the admin listing.
pub const LIST_LIMIT: i64 = 50;
pub const MAX_SLIDES: usize = 10;
pub const MIN_SLIDES: usize = 2;

/// Decoded multipart body of a create / full-update request. Uploaded files
/// are already on disk and tracked by `guard`.
pub struct AnnouncementUpload {
    text: HashMap<String, String>,
    pub primary: Option<String>,
    pub slides: Vec<String>,
    pub guard: UploadGuard,
}

impl AnnouncementUpload {
    pub fn new(guard: UploadGuard) -> Self {
        Self {
            text: HashMap::new(),
            primary: None,
            slides: Vec::new(),
            guard,
        }
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.text.insert(name.to_string(), value.into());
    }

    /// `None` when the field was not sent at all.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }

    /// Optional text column: omitted keeps `existing`, present overwrites
    /// (blank clears).
    fn merged_text(&self, name: &str, existing: Option<&String>) -> Option<String> {
        match self.text(name) {
            Some(raw) => non_empty(raw),
            None => existing.cloned(),
        }
    }

    fn merged_time(
        &self,
        name: &str,
        existing: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, ApiError> {
        match self.text(name) {
            Some(raw) => parse_timestamp(raw).map_err(ApiError::Validation),
            None => Ok(existing),
        }
    }

    /// Delete uploaded slides that the resulting record will not reference.
    async fn discard_slides(&mut self) {
        for path in std::mem::take(&mut self.slides) {
            self.guard.discard(&path).await;
        }
    }
}

const TEXT_FIELDS: &[&str] = &[
    "kind",
    "title",
    "message",
    "link_url",
    "active",
    "dismissible",
    "include_pages",
    "exclude_pages",
    "starts_at",
    "ends_at",
];

pub struct AnnouncementService;

impl AnnouncementService {
    /// Drain a multipart body: `image` (one file), `carouselImages` /
    /// `carousel_images` (up to ten files) and the text fields. Any error
    /// drops the guard, which deletes whatever was already written.
    pub async fn read_upload(
        files: &FileStore,
        max_bytes: usize,
        mut multipart: Multipart,
    ) -> Result<AnnouncementUpload, ApiError> {
        let mut upload = AnnouncementUpload::new(UploadGuard::new(files));

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "image" | "carouselImages" | "carousel_images" => {
                    let original = field.file_name().unwrap_or("").to_string();
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await?;
                    // browsers send an empty part for an untouched file input
                    if bytes.is_empty() && original.is_empty() {
                        continue;
                    }
                    check_image(&content_type, bytes.len(), max_bytes)?;

                    if name == "image" {
                        if upload.primary.is_some() {
                            return Err(ApiError::validation("Only one primary image is allowed"));
                        }
                        let path = files
                            .save(&bytes, FileCategory::Primary, &content_type)
                            .await?;
                        upload.guard.track(path.clone());
                        upload.primary = Some(path);
                    } else {
                        if upload.slides.len() >= MAX_SLIDES {
                            return Err(ApiError::validation(format!(
                                "At most {MAX_SLIDES} carousel images are allowed"
                            )));
                        }
                        let path = files
                            .save(&bytes, FileCategory::Slide, &content_type)
                            .await?;
                        upload.guard.track(path.clone());
                        upload.slides.push(path);
                    }
                }
                n if TEXT_FIELDS.contains(&n) => {
                    let value = field.text().await?;
                    upload.set_text(n, value);
                }
                _ => {}
            }
        }

        Ok(upload)
    }

    pub async fn list(repo: &dyn AnnouncementRepository) -> Result<Vec<Announcement>, ApiError> {
        Ok(repo.list(LIST_LIMIT).await?)
    }

    /// The announcement to show right now, if any. A row whose primary image
    /// is missing on disk is treated as no announcement at all.
    pub async fn get_active(
        repo: &dyn AnnouncementRepository,
        files: &FileStore,
        now: DateTime<Utc>,
    ) -> Result<Option<Announcement>, ApiError> {
        let Some(active) = repo.find_active(now).await? else {
            return Ok(None);
        };

        if let Some(image) = &active.image_url {
            if !files.exists(image).await {
                tracing::warn!(id = active.id, %image, "active announcement image missing, serving none");
                return Ok(None);
            }
        }
        Ok(Some(active))
    }

    pub async fn create(
        repo: &dyn AnnouncementRepository,
        mut upload: AnnouncementUpload,
    ) -> Result<Announcement, ApiError> {
        let kind = match upload.text("kind").map(str::trim) {
            None | Some("") => Kind::Banner,
            Some(raw) => parse_kind(raw)?,
        };

        let carousel_images = if kind == Kind::Carousel {
            if upload.primary.is_none() {
                return Err(ApiError::validation(
                    "A carousel requires a primary image (field 'image')",
                ));
            }
            if upload.slides.len() < MIN_SLIDES {
                return Err(ApiError::validation(format!(
                    "A carousel requires at least {MIN_SLIDES} additional images (field 'carouselImages')"
                )));
            }
            Some(upload.slides.clone())
        } else {
            upload.discard_slides().await;
            None
        };

        let fields = AnnouncementFields {
            kind,
            title: upload.merged_text("title", None),
            message: upload.merged_text("message", None),
            link_url: upload.merged_text("link_url", None),
            image_url: upload.primary.clone(),
            carousel_images,
            active: upload.text("active").and_then(parse_flag).unwrap_or(true),
            dismissible: upload.text("dismissible").and_then(parse_flag).unwrap_or(true),
            include_pages: upload.merged_text("include_pages", None),
            exclude_pages: upload.merged_text("exclude_pages", None),
            starts_at: upload.merged_time("starts_at", None)?,
            ends_at: upload.merged_time("ends_at", None)?,
        };
        validate_record(&fields)?;

        let id = repo.insert(&fields).await?;
        upload.guard.commit();
        tracing::info!(id, %kind, active = fields.active, "announcement created");

        repo.get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Announcement not found"))
    }

    /// Full replace: omitted fields keep their stored value, present fields
    /// overwrite it. Replaced image files are removed once the row no longer
    /// references them.
    pub async fn replace(
        repo: &dyn AnnouncementRepository,
        files: &FileStore,
        id: i64,
        mut upload: AnnouncementUpload,
    ) -> Result<Announcement, ApiError> {
        let existing = repo
            .get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Announcement not found"))?;

        let kind = match upload.text("kind").map(str::trim) {
            None | Some("") => existing.kind,
            Some(raw) => parse_kind(raw)?,
        };

        let old_slides = existing.carousel_images.clone().unwrap_or_default();
        let mut stale: Vec<String> = Vec::new();

        let carousel_images = if kind == Kind::Carousel {
            let slides = if upload.slides.is_empty() {
                old_slides
            } else {
                stale.extend(old_slides);
                upload.slides.clone()
            };
            if slides.len() < MIN_SLIDES {
                return Err(ApiError::validation(format!(
                    "A carousel requires at least {MIN_SLIDES} additional images (field 'carouselImages')"
                )));
            }
            Some(slides)
        } else {
            upload.discard_slides().await;
            stale.extend(old_slides);
            None
        };

        let image_url = match &upload.primary {
            Some(new) => {
                stale.extend(existing.image_url.clone());
                Some(new.clone())
            }
            None => existing.image_url.clone(),
        };

        let active = match upload.text("active") {
            Some(raw) => parse_flag(raw),
            None => Some(existing.active),
        };
        let dismissible = match upload.text("dismissible") {
            Some(raw) => parse_flag(raw),
            None => Some(existing.dismissible),
        };

        let fields = AnnouncementFields {
            kind,
            title: upload.merged_text("title", existing.title.as_ref()),
            message: upload.merged_text("message", existing.message.as_ref()),
            link_url: upload.merged_text("link_url", existing.link_url.as_ref()),
            image_url,
            carousel_images,
            active: active.unwrap_or(false),
            dismissible: dismissible.unwrap_or(true),
            include_pages: upload.merged_text("include_pages", existing.include_pages.as_ref()),
            exclude_pages: upload.merged_text("exclude_pages", existing.exclude_pages.as_ref()),
            starts_at: upload.merged_time("starts_at", existing.starts_at)?,
            ends_at: upload.merged_time("ends_at", existing.ends_at)?,
        };
        validate_record(&fields)?;

        if !repo.update(id, &fields).await? {
            return Err(ApiError::not_found("Announcement not found"));
        }
        upload.guard.commit();

        release(repo, files, stale).await;
        tracing::info!(id, %kind, active = fields.active, "announcement updated");

        repo.get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Announcement not found"))
    }

    /// Partial update from a JSON object. Kind-specific requirements (popup
    /// message, carousel slide count) are not checked here.
    pub async fn patch(
        repo: &dyn AnnouncementRepository,
        files: &FileStore,
        id: i64,
        body: &serde_json::Value,
    ) -> Result<Announcement, ApiError> {
        let object = body
            .as_object()
            .ok_or_else(|| ApiError::validation("Expected a JSON object"))?;
        let mut patch = AnnouncementPatch::from_json(object).map_err(ApiError::Validation)?;
        if patch.is_empty() {
            return Err(ApiError::validation("No changes to apply"));
        }

        let mut stale: Vec<String> = Vec::new();
        let touches_files = patch.kind.is_some() || patch.image_url.is_some();
        if touches_files {
            let existing = repo
                .get(id)
                .await?
                .ok_or_else(|| ApiError::not_found("Announcement not found"))?;

            if matches!(patch.kind, Some(k) if k != Kind::Carousel) {
                patch.clear_carousel = true;
                stale.extend(existing.carousel_images.clone().unwrap_or_default());
            }
            if let Some(new) = &patch.image_url {
                if new.as_ref() != existing.image_url.as_ref() {
                    if let Some(path) = new {
                        check_primary_path(files, path).await?;
                    }
                    stale.extend(existing.image_url.clone());
                }
            }
        }

        if !repo.patch(id, &patch).await? {
            return Err(ApiError::not_found("Announcement not found"));
        }
        release(repo, files, stale).await;
        tracing::info!(id, "announcement patched");

        repo.get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Announcement not found"))
    }

    /// Remove the row first, then its files: a crash in between leaves an
    /// orphaned file, never a row pointing at a missing one.
    pub async fn delete(
        repo: &dyn AnnouncementRepository,
        files: &FileStore,
        id: i64,
    ) -> Result<(), ApiError> {
        let existing = repo
            .get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Announcement not found"))?;

        if !repo.delete(id).await? {
            return Err(ApiError::not_found("Announcement not found"));
        }

        release(repo, files, existing.referenced_files()).await;
        tracing::info!(id, kind = %existing.kind, "announcement deleted");
        Ok(())
    }
}

fn parse_kind(raw: &str) -> Result<Kind, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("Invalid kind. Values: {KIND_VALUES}")))
}

/// A patched `image_url` must name a stored primary image.
async fn check_primary_path(files: &FileStore, path: &str) -> Result<(), ApiError> {
    if files.category_of(path) != Some(FileCategory::Primary) || !files.exists(path).await {
        return Err(ApiError::validation(format!(
            "image_url must be an uploaded announcement image: {path}"
        )));
    }
    Ok(())
}

/// Delete files the write dropped, skipping any another row still points at.
/// Runs after the row is written; a failed lookup only leaves orphans.
async fn release(repo: &dyn AnnouncementRepository, files: &FileStore, paths: Vec<String>) {
    if paths.is_empty() {
        return;
    }
    let referenced: HashSet<String> = match repo.referenced_files().await {
        Ok(paths) => paths.into_iter().collect(),
        Err(e) => {
            tracing::warn!("skipping file cleanup, reference lookup failed: {e}");
            return;
        }
    };
    for path in paths.iter().filter(|p| !referenced.contains(*p)) {
        files.delete(path).await;
    }
}

/// Requirements shared by create and full replace.
fn validate_record(fields: &AnnouncementFields) -> Result<(), ApiError> {
    if fields.image_url.is_none() {
        return Err(ApiError::validation("A primary image is required (field 'image')"));
    }
    if fields.kind == Kind::Popup && fields.message.is_none() {
        return Err(ApiError::validation("A popup requires a message"));
    }
    if let (Some(start), Some(end)) = (fields.starts_at, fields.ends_at) {
        if end < start {
            return Err(ApiError::validation("ends_at must not be before starts_at"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryAnnouncementRepository;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        files: FileStore,
        repo: MemoryAnnouncementRepository,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let files = FileStore::new(dir.path());
            Self {
                _dir: dir,
                files,
                repo: MemoryAnnouncementRepository::new(),
            }
        }

        async fn upload(&self, text: &[(&str, &str)], primary: bool, slides: usize) -> AnnouncementUpload {
            let mut upload = AnnouncementUpload::new(UploadGuard::new(&self.files));
            for (k, v) in text {
                upload.set_text(k, *v);
            }
            if primary {
                let p = self
                    .files
                    .save(b"primary", FileCategory::Primary, "image/png")
                    .await
                    .unwrap();
                upload.guard.track(p.clone());
                upload.primary = Some(p);
            }
            for _ in 0..slides {
                let s = self
                    .files
                    .save(b"slide", FileCategory::Slide, "image/png")
                    .await
                    .unwrap();
                upload.guard.track(s.clone());
                upload.slides.push(s);
            }
            upload
        }

        async fn stored_files(&self) -> usize {
            let mut n = 0;
            for category in [FileCategory::Primary, FileCategory::Slide] {
                n += self.files.list(category).await.unwrap().len();
            }
            n
        }
    }

    #[tokio::test]
    async fn second_activation_switches_off_the_first() {
        let fx = Fixture::new();

        let carousel = fx
            .upload(&[("kind", "carousel"), ("active", "true")], true, 2)
            .await;
        let first = AnnouncementService::create(&fx.repo, carousel).await.unwrap();
        assert!(first.active);
        assert_eq!(first.carousel_images.as_ref().map(Vec::len), Some(2));
        assert_eq!(fx.repo.active_count(), 1);

        let banner = fx.upload(&[("kind", "banner"), ("active", "true")], true, 0).await;
        let second = AnnouncementService::create(&fx.repo, banner).await.unwrap();
        assert!(second.active);
        assert_eq!(fx.repo.active_count(), 1);

        let first_now = fx.repo.get(first.id).await.unwrap().unwrap();
        assert!(!first_now.active);
    }

    #[tokio::test]
    async fn carousel_with_one_slide_leaves_nothing_behind() {
        let fx = Fixture::new();
        let upload = fx.upload(&[("kind", "carousel")], true, 1).await;
        assert_eq!(fx.stored_files().await, 2);

        let err = AnnouncementService::create(&fx.repo, upload).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(fx.repo.row_count(), 0);
        assert_eq!(fx.stored_files().await, 0);
    }

    #[tokio::test]
    async fn carousel_without_primary_is_rejected() {
        let fx = Fixture::new();
        let upload = fx.upload(&[("kind", "carousel")], false, 3).await;

        let err = AnnouncementService::create(&fx.repo, upload).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(fx.stored_files().await, 0);
    }

    #[tokio::test]
    async fn unknown_kind_deletes_uploads() {
        let fx = Fixture::new();
        let upload = fx.upload(&[("kind", "marquee")], true, 2).await;

        let err = AnnouncementService::create(&fx.repo, upload).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(fx.repo.row_count(), 0);
        assert_eq!(fx.stored_files().await, 0);
    }

    #[tokio::test]
    async fn popup_needs_message_but_imagepopup_does_not() {
        let fx = Fixture::new();

        let popup = fx.upload(&[("kind", "popup")], true, 0).await;
        assert!(AnnouncementService::create(&fx.repo, popup).await.is_err());

        let image_popup = fx.upload(&[("kind", "imagepopup")], true, 0).await;
        let created = AnnouncementService::create(&fx.repo, image_popup).await.unwrap();
        assert_eq!(created.kind, Kind::ImagePopup);
        assert_eq!(created.message, None);
    }

    #[tokio::test]
    async fn create_defaults_and_discards_stray_slides() {
        let fx = Fixture::new();
        let upload = fx.upload(&[("title", "Sale"), ("active", "maybe")], true, 2).await;

        let created = AnnouncementService::create(&fx.repo, upload).await.unwrap();
        assert_eq!(created.kind, Kind::Banner);
        assert!(created.active);
        assert!(created.dismissible);
        assert_eq!(created.carousel_images, None);
        // only the primary image survives
        assert_eq!(fx.stored_files().await, 1);
    }

    #[tokio::test]
    async fn storage_failure_removes_uploads() {
        let fx = Fixture::new();
        fx.repo.fail_writes(true);
        let upload = fx.upload(&[("kind", "carousel")], true, 3).await;

        let err = AnnouncementService::create(&fx.repo, upload).await.unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
        assert_eq!(fx.stored_files().await, 0);
    }

    #[tokio::test]
    async fn replace_missing_row_is_not_found_and_cleans_up() {
        let fx = Fixture::new();
        let upload = fx.upload(&[("title", "x")], true, 0).await;

        let err = AnnouncementService::replace(&fx.repo, &fx.files, 99, upload)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(fx.stored_files().await, 0);
    }

    #[tokio::test]
    async fn replace_merges_and_swaps_primary_image() {
        let fx = Fixture::new();
        let created = AnnouncementService::create(
            &fx.repo,
            fx.upload(&[("title", "Old"), ("link_url", "https://shop.test")], true, 0).await,
        )
        .await
        .unwrap();
        let old_image = created.image_url.clone().unwrap();

        let upload = fx.upload(&[("title", ""), ("message", "New text")], true, 0).await;
        let updated = AnnouncementService::replace(&fx.repo, &fx.files, created.id, upload)
            .await
            .unwrap();

        assert_eq!(updated.title, None);
        assert_eq!(updated.message.as_deref(), Some("New text"));
        assert_eq!(updated.link_url.as_deref(), Some("https://shop.test"));
        assert_ne!(updated.image_url.as_deref(), Some(old_image.as_str()));
        assert!(!fx.files.exists(&old_image).await);
        assert!(fx.files.exists(updated.image_url.as_deref().unwrap()).await);
        // omitted flag keeps the stored value
        assert!(updated.active);
    }

    #[tokio::test]
    async fn replace_leaving_carousel_deletes_slides() {
        let fx = Fixture::new();
        let created = AnnouncementService::create(
            &fx.repo,
            fx.upload(&[("kind", "carousel")], true, 3).await,
        )
        .await
        .unwrap();
        let slides = created.carousel_images.clone().unwrap();

        let upload = fx.upload(&[("kind", "banner")], false, 0).await;
        let updated = AnnouncementService::replace(&fx.repo, &fx.files, created.id, upload)
            .await
            .unwrap();

        assert_eq!(updated.kind, Kind::Banner);
        assert_eq!(updated.carousel_images, None);
        for slide in &slides {
            assert!(!fx.files.exists(slide).await);
        }
        assert_eq!(fx.stored_files().await, 1);
    }

    #[tokio::test]
    async fn replace_with_new_slides_swaps_the_whole_set() {
        let fx = Fixture::new();
        let created = AnnouncementService::create(
            &fx.repo,
            fx.upload(&[("kind", "carousel")], true, 2).await,
        )
        .await
        .unwrap();
        let old = created.carousel_images.clone().unwrap();

        let upload = fx.upload(&[], false, 3).await;
        let updated = AnnouncementService::replace(&fx.repo, &fx.files, created.id, upload)
            .await
            .unwrap();

        let new = updated.carousel_images.unwrap();
        assert_eq!(new.len(), 3);
        for slide in &old {
            assert!(!fx.files.exists(slide).await);
        }
        for slide in &new {
            assert!(fx.files.exists(slide).await);
        }
    }

    #[tokio::test]
    async fn replace_activation_is_exclusive() {
        let fx = Fixture::new();
        let a = AnnouncementService::create(&fx.repo, fx.upload(&[("active", "1")], true, 0).await)
            .await
            .unwrap();
        let b = AnnouncementService::create(&fx.repo, fx.upload(&[("active", "0")], true, 0).await)
            .await
            .unwrap();
        assert!(!b.active);

        let upload = fx.upload(&[("active", "true")], false, 0).await;
        let b = AnnouncementService::replace(&fx.repo, &fx.files, b.id, upload).await.unwrap();
        assert!(b.active);
        assert!(!fx.repo.get(a.id).await.unwrap().unwrap().active);
        assert_eq!(fx.repo.active_count(), 1);
    }

    #[tokio::test]
    async fn replace_with_invalid_kind_keeps_existing_files() {
        let fx = Fixture::new();
        let created = AnnouncementService::create(&fx.repo, fx.upload(&[], true, 0).await)
            .await
            .unwrap();

        let upload = fx.upload(&[("kind", "ticker")], true, 0).await;
        let err = AnnouncementService::replace(&fx.repo, &fx.files, created.id, upload)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(fx.files.exists(created.image_url.as_deref().unwrap()).await);
        assert_eq!(fx.stored_files().await, 1);
    }

    #[tokio::test]
    async fn patch_rules() {
        let fx = Fixture::new();
        let created = AnnouncementService::create(&fx.repo, fx.upload(&[], true, 0).await)
            .await
            .unwrap();

        let err = AnnouncementService::patch(&fx.repo, &fx.files, created.id, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = AnnouncementService::patch(&fx.repo, &fx.files, created.id, &json!({ "kind": "nope" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = AnnouncementService::patch(&fx.repo, &fx.files, 404, &json!({ "title": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        // popup without a message is accepted at this layer
        let patched = AnnouncementService::patch(&fx.repo, &fx.files, created.id, &json!({ "kind": "popup" }))
            .await
            .unwrap();
        assert_eq!(patched.kind, Kind::Popup);
        assert_eq!(patched.message, None);
    }

    #[tokio::test]
    async fn patch_activation_is_exclusive() {
        let fx = Fixture::new();
        let a = AnnouncementService::create(&fx.repo, fx.upload(&[], true, 0).await)
            .await
            .unwrap();
        let b = AnnouncementService::create(&fx.repo, fx.upload(&[("active", "false")], true, 0).await)
            .await
            .unwrap();

        AnnouncementService::patch(&fx.repo, &fx.files, b.id, &json!({ "active": 1 }))
            .await
            .unwrap();
        assert_eq!(fx.repo.active_count(), 1);
        assert!(!fx.repo.get(a.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn patch_away_from_carousel_drops_slides() {
        let fx = Fixture::new();
        let created = AnnouncementService::create(&fx.repo, fx.upload(&[("kind", "carousel")], true, 2).await)
            .await
            .unwrap();
        let slides = created.carousel_images.clone().unwrap();

        let patched = AnnouncementService::patch(&fx.repo, &fx.files, created.id, &json!({ "kind": "banner" }))
            .await
            .unwrap();
        assert_eq!(patched.carousel_images, None);
        for slide in &slides {
            assert!(!fx.files.exists(slide).await);
        }
    }

    #[tokio::test]
    async fn patch_image_url_must_name_a_stored_primary_image() {
        let fx = Fixture::new();
        let created = AnnouncementService::create(&fx.repo, fx.upload(&[("kind", "carousel")], true, 2).await)
            .await
            .unwrap();
        let slide = created.carousel_images.clone().unwrap()[0].clone();

        for path in [
            slide.as_str(),
            "/uploads/announcements/announcement-0-missing.png",
            "/uploads/contact/attachment-0-abc.bin",
            "https://cdn.example/banner.png",
        ] {
            let err = AnnouncementService::patch(&fx.repo, &fx.files, created.id, &json!({ "image_url": path }))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "{path}");
        }
        assert_eq!(fx.repo.get(created.id).await.unwrap().unwrap().image_url, created.image_url);
        assert_eq!(fx.stored_files().await, 3);
    }

    #[tokio::test]
    async fn shared_image_outlives_the_row_it_was_copied_into() {
        let fx = Fixture::new();
        let a = AnnouncementService::create(&fx.repo, fx.upload(&[("active", "false")], true, 0).await)
            .await
            .unwrap();
        let b = AnnouncementService::create(&fx.repo, fx.upload(&[], true, 0).await)
            .await
            .unwrap();
        let a_image = a.image_url.clone().unwrap();
        let b_image = b.image_url.clone().unwrap();

        let patched = AnnouncementService::patch(&fx.repo, &fx.files, a.id, &json!({ "image_url": b_image }))
            .await
            .unwrap();
        assert_eq!(patched.image_url.as_deref(), Some(b_image.as_str()));
        assert!(!fx.files.exists(&a_image).await);

        AnnouncementService::delete(&fx.repo, &fx.files, a.id).await.unwrap();
        assert!(fx.files.exists(&b_image).await);

        let active = AnnouncementService::get_active(&fx.repo, &fx.files, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, b.id);
    }

    #[tokio::test]
    async fn delete_removes_row_and_every_file() {
        let fx = Fixture::new();
        let created = AnnouncementService::create(&fx.repo, fx.upload(&[("kind", "carousel")], true, 3).await)
            .await
            .unwrap();
        assert_eq!(fx.stored_files().await, 4);

        AnnouncementService::delete(&fx.repo, &fx.files, created.id).await.unwrap();
        assert_eq!(fx.repo.row_count(), 0);
        assert_eq!(fx.stored_files().await, 0);

        let err = AnnouncementService::delete(&fx.repo, &fx.files, created.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn active_respects_window_and_missing_image() {
        let fx = Fixture::new();
        let now = Utc::now();

        let created = AnnouncementService::create(&fx.repo, fx.upload(&[], true, 0).await)
            .await
            .unwrap();
        let served = AnnouncementService::get_active(&fx.repo, &fx.files, now).await.unwrap();
        assert_eq!(served.map(|a| a.id), Some(created.id));

        fx.repo.force(created.id, |r| r.starts_at = Some(now + chrono::Duration::hours(1)));
        assert!(AnnouncementService::get_active(&fx.repo, &fx.files, now).await.unwrap().is_none());

        fx.repo.force(created.id, |r| {
            r.starts_at = None;
            r.ends_at = Some(now - chrono::Duration::hours(1));
        });
        assert!(AnnouncementService::get_active(&fx.repo, &fx.files, now).await.unwrap().is_none());

        fx.repo.force(created.id, |r| r.ends_at = None);
        fx.files.delete(created.image_url.as_deref().unwrap()).await;
        assert!(AnnouncementService::get_active(&fx.repo, &fx.files, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn every_stored_upload_is_referenced() {
        let fx = Fixture::new();
        AnnouncementService::create(&fx.repo, fx.upload(&[("kind", "carousel")], true, 2).await)
            .await
            .unwrap();
        AnnouncementService::create(&fx.repo, fx.upload(&[("kind", "info")], true, 1).await)
            .await
            .unwrap();

        let mut referenced = fx.repo.referenced_files().await.unwrap();
        let mut stored: Vec<String> = Vec::new();
        for category in [FileCategory::Primary, FileCategory::Slide] {
            stored.extend(fx.files.list(category).await.unwrap().into_iter().map(|(p, _)| p));
        }
        referenced.sort();
        stored.sort();
        assert_eq!(referenced, stored);
    }

    #[tokio::test]
    async fn reversed_window_is_rejected() {
        let fx = Fixture::new();
        let upload = fx
            .upload(&[("starts_at", "2026-06-02"), ("ends_at", "2026-06-01")], true, 0)
            .await;
        assert!(AnnouncementService::create(&fx.repo, upload).await.is_err());
        assert_eq!(fx.stored_files().await, 0);
    }
}
