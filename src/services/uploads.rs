//! Filesystem storage for uploaded files.
//!
//! Files are written under `<root>/<category dir>/` and referenced by rows
//! through their public path `/uploads/<category dir>/<filename>`. Only the
//! basename of a stored path is ever joined onto the root, so a tampered
//! path cannot point outside the category directory.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::ApiError;

/// URL prefix under which the upload root is served.
pub const PUBLIC_PREFIX: &str = "/uploads";

pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/gif"];

/// Content types whose extension is kept on disk.
const STORED_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
];

const RANDOM_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    /// Lead image of an announcement.
    Primary,
    /// Additional carousel image.
    Slide,
    /// File attached to a contact message.
    Attachment,
}

impl FileCategory {
    pub const ALL: [FileCategory; 3] =
        [FileCategory::Primary, FileCategory::Slide, FileCategory::Attachment];

    /// Categories served over HTTP. Contact attachments stay on disk only.
    pub const SERVED: [FileCategory; 2] = [FileCategory::Primary, FileCategory::Slide];

    pub fn dir(self) -> &'static str {
        match self {
            FileCategory::Primary => "announcements",
            FileCategory::Slide => "carousels",
            FileCategory::Attachment => "contact",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            FileCategory::Primary => "announcement",
            FileCategory::Slide => "slide",
            FileCategory::Attachment => "attachment",
        }
    }

    fn from_dir(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.dir() == dir)
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every category directory.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for category in FileCategory::ALL {
            tokio::fs::create_dir_all(self.root.join(category.dir())).await?;
        }
        Ok(())
    }

    /// Write `bytes` under a fresh generated name and return its public path.
    /// The extension is derived from `content_type` only; the client's
    /// filename never reaches the disk.
    pub async fn save(
        &self,
        bytes: &[u8],
        category: FileCategory,
        content_type: &str,
    ) -> std::io::Result<String> {
        let dir = self.root.join(category.dir());
        tokio::fs::create_dir_all(&dir).await?;

        let filename = generate_filename(category, content_type);
        tokio::fs::write(dir.join(&filename), bytes).await?;

        tracing::debug!(category = category.dir(), %filename, size = bytes.len(), "upload stored");
        Ok(public_path(category, &filename))
    }

    /// Map a public path back onto the filesystem.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let (category, filename) = split_public_path(public_path)?;
        Some(self.root.join(category.dir()).join(filename))
    }

    /// Category directory a public path points into.
    pub fn category_of(&self, public_path: &str) -> Option<FileCategory> {
        split_public_path(public_path).map(|(category, _)| category)
    }

    pub async fn exists(&self, public_path: &str) -> bool {
        match self.resolve(public_path) {
            Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }

    /// Best-effort removal. Missing files and I/O failures are logged, never
    /// returned: a failed delete leaves an orphan, which is acceptable.
    pub async fn delete(&self, public_path: &str) {
        let Some(path) = self.resolve(public_path) else {
            tracing::warn!(%public_path, "refusing to delete unrecognised upload path");
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!(%public_path, "upload deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(%public_path, "upload already gone")
            }
            Err(e) => tracing::warn!(%public_path, "failed to delete upload: {e}"),
        }
    }

    /// Blocking counterpart of [`FileStore::delete`], for drop handlers.
    pub fn delete_now(&self, public_path: &str) {
        let Some(path) = self.resolve(public_path) else {
            tracing::warn!(%public_path, "refusing to delete unrecognised upload path");
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::info!(%public_path, "discarded upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(%public_path, "failed to discard upload: {e}"),
        }
    }

    /// Public paths of every file currently stored in `category`, with their
    /// modification time.
    pub async fn list(
        &self,
        category: FileCategory,
    ) -> std::io::Result<Vec<(String, std::time::SystemTime)>> {
        let dir = self.root.join(category.dir());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                files.push((public_path(category, name), meta.modified()?));
            }
        }
        Ok(files)
    }
}

fn public_path(category: FileCategory, filename: &str) -> String {
    format!("{PUBLIC_PREFIX}/{}/{}", category.dir(), filename)
}

fn split_public_path(public_path: &str) -> Option<(FileCategory, &str)> {
    let mut segments = public_path.trim_end_matches('/').rsplit('/');
    let filename = segments.next()?;
    let category = FileCategory::from_dir(segments.next()?)?;
    if filename.is_empty() || filename == "." || filename == ".." {
        return None;
    }
    Some((category, filename))
}

/// `{prefix}-{unix millis}-{9 random chars}.{ext}`
fn generate_filename(category: FileCategory, content_type: &str) -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..9)
        .map(|_| RANDOM_CHARSET[rng.gen_range(0..RANDOM_CHARSET.len())] as char)
        .collect();
    let millis = chrono::Utc::now().timestamp_millis();

    format!(
        "{}-{millis}-{random}.{}",
        category.prefix(),
        extension(category, content_type)
    )
}

/// Images get the extension of their (already validated) type. Attachments
/// only keep an extension for inert document types; anything else is stored
/// as `.bin`.
fn extension(category: FileCategory, content_type: &str) -> &'static str {
    let content_type = content_type.trim().to_ascii_lowercase();
    let ext = STORED_EXTENSIONS
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext);
    match (category, ext) {
        (FileCategory::Attachment, Some(ext)) => ext,
        (_, Some(ext)) if ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) => ext,
        _ => "bin",
    }
}

/// Reject anything that is not an allowed image type or exceeds `max_bytes`.
pub fn check_image(content_type: &str, len: usize, max_bytes: usize) -> Result<(), ApiError> {
    if !ALLOWED_IMAGE_TYPES.contains(&content_type.to_ascii_lowercase().as_str()) {
        return Err(ApiError::validation(format!(
            "File type not allowed: {content_type}. Only JPEG, PNG and GIF"
        )));
    }
    check_size(len, max_bytes)
}

pub fn check_size(len: usize, max_bytes: usize) -> Result<(), ApiError> {
    if len > max_bytes {
        return Err(ApiError::validation(format!(
            "File too large: {len} bytes (max {max_bytes})"
        )));
    }
    Ok(())
}

/// Files written during one request.
///
/// Every saved file is tracked here. Dropping the guard deletes them all;
/// [`UploadGuard::commit`] hands them over to the committed row instead.
pub struct UploadGuard {
    store: FileStore,
    paths: Vec<String>,
}

impl UploadGuard {
    pub fn new(store: &FileStore) -> Self {
        Self {
            store: store.clone(),
            paths: Vec::new(),
        }
    }

    pub fn track(&mut self, public_path: String) {
        self.paths.push(public_path);
    }

    /// Delete one tracked file right away.
    pub async fn discard(&mut self, public_path: &str) {
        self.paths.retain(|p| p != public_path);
        self.store.delete(public_path).await;
    }

    /// The tracked files are now referenced by a committed row; keep them.
    pub fn commit(mut self) {
        self.paths.clear();
    }
}

// Deletes inline so the files are gone once the guard is dropped. A request
// tracks at most eleven small files.
impl Drop for UploadGuard {
    fn drop(&mut self) {
        if self.paths.is_empty() {
            return;
        }
        tracing::info!(count = self.paths.len(), "request aborted, discarding uploads");
        for path in self.paths.drain(..) {
            self.store.delete_now(&path);
        }
    }
}
