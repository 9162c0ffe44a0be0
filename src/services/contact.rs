use axum::extract::Multipart;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::{
    db::ContactRepository,
    error::ApiError,
    models::contact::{ContactMessage, NewContactMessage},
    services::uploads::{check_size, FileCategory, FileStore, UploadGuard},
};

pub const CODE_PREFIX: &str = "CNT";
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_ATTEMPTS: usize = 3;

/// `CNT` + `YYMMDD` + three random characters from `A-Z0-9`.
pub fn generate_code<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = (0..3)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect();
    format!("{CODE_PREFIX}{}{suffix}", now.format("%y%m%d"))
}

/// Text fields of a contact submission, before validation.
#[derive(Debug, Default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactForm {
    fn validate(&self) -> Result<(), ApiError> {
        let missing: Vec<&str> = [
            ("name", &self.name),
            ("email", &self.email),
            ("subject", &self.subject),
            ("message", &self.message),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// Message body as stored, with a reference to the attachment if any.
    fn body(&self, attachment: Option<&str>) -> String {
        match attachment {
            Some(path) => format!("{}\n\nAttached file: {path}", self.message),
            None => self.message.clone(),
        }
    }
}

pub struct ContactService;

impl ContactService {
    /// Parse a public contact submission. The optional file (`file`, alias
    /// `attachment`) is stored right away and tracked by the returned guard.
    pub async fn read_form(
        files: &FileStore,
        max_bytes: usize,
        mut multipart: Multipart,
    ) -> Result<(ContactForm, Option<String>, UploadGuard), ApiError> {
        let mut form = ContactForm::default();
        let mut attachment = None;
        let mut guard = UploadGuard::new(files);

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" | "attachment" => {
                    let original = field.file_name().unwrap_or("").to_string();
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await?;
                    if bytes.is_empty() && original.is_empty() {
                        continue;
                    }
                    if attachment.is_some() {
                        return Err(ApiError::validation("Only one attachment is allowed"));
                    }
                    check_size(bytes.len(), max_bytes)?;
                    let path = files
                        .save(&bytes, FileCategory::Attachment, &content_type)
                        .await?;
                    guard.track(path.clone());
                    attachment = Some(path);
                }
                "name" => form.name = field.text().await?,
                "email" => form.email = field.text().await?,
                "subject" => form.subject = field.text().await?,
                "message" | "body" => form.message = field.text().await?,
                _ => {}
            }
        }

        Ok((form, attachment, guard))
    }

    /// Validate and store a submission, returning the generated code.
    /// A code collision is retried with a fresh code.
    pub async fn submit(
        repo: &dyn ContactRepository,
        form: ContactForm,
        attachment: Option<String>,
        guard: UploadGuard,
    ) -> Result<ContactMessage, ApiError> {
        Self::submit_with(repo, form, attachment, guard, || {
            generate_code(Utc::now(), &mut rand::thread_rng())
        })
        .await
    }

    /// `submit` with the code source supplied by the caller.
    pub async fn submit_with(
        repo: &dyn ContactRepository,
        form: ContactForm,
        attachment: Option<String>,
        guard: UploadGuard,
        mut next_code: impl FnMut() -> String + Send,
    ) -> Result<ContactMessage, ApiError> {
        form.validate()?;

        for attempt in 1..=CODE_ATTEMPTS {
            let msg = NewContactMessage {
                code: next_code(),
                name: form.name.trim().to_string(),
                email: form.email.trim().to_string(),
                subject: form.subject.trim().to_string(),
                body: form.body(attachment.as_deref()),
            };

            if let Some(saved) = repo.insert(&msg).await? {
                guard.commit();
                tracing::info!(code = %saved.code, "contact message stored");
                return Ok(saved);
            }
            tracing::warn!(attempt, code = %msg.code, "contact code collision, retrying");
        }

        Err(ApiError::Conflict(
            "Could not allocate a contact code, please try again".into(),
        ))
    }

    pub async fn list(repo: &dyn ContactRepository) -> Result<Vec<ContactMessage>, ApiError> {
        Ok(repo.list().await?)
    }

    pub async fn find(repo: &dyn ContactRepository, code: &str) -> Result<ContactMessage, ApiError> {
        repo.find(code)
            .await?
            .ok_or_else(|| ApiError::not_found("Contact message not found"))
    }
}
