use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display style of an announcement. Decides which optional fields are
/// required: popups need a message, carousels need at least two slides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Info,
    Success,
    Warning,
    Danger,
    Banner,
    Popup,
    Carousel,
    ImagePopup,
}

pub const KIND_VALUES: &str =
    "'info'|'success'|'warning'|'danger'|'banner'|'popup'|'carousel'|'imagepopup'";

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Kind::Info => "info",
            Kind::Success => "success",
            Kind::Warning => "warning",
            Kind::Danger => "danger",
            Kind::Banner => "banner",
            Kind::Popup => "popup",
            Kind::Carousel => "carousel",
            Kind::ImagePopup => "imagepopup",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Kind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Kind::Info),
            "success" => Ok(Kind::Success),
            "warning" => Ok(Kind::Warning),
            "danger" => Ok(Kind::Danger),
            "banner" => Ok(Kind::Banner),
            "popup" => Ok(Kind::Popup),
            "carousel" => Ok(Kind::Carousel),
            "imagepopup" => Ok(Kind::ImagePopup),
            _ => Err(anyhow::anyhow!("Unknown kind: {s}")),
        }
    }
}

/// Committed announcement row, as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Announcement {
    pub id: i64,
    pub kind: Kind,
    pub title: Option<String>,
    pub message: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    /// Only present for carousels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carousel_images: Option<Vec<String>>,
    pub active: bool,
    pub dismissible: bool,
    pub include_pages: Option<String>,
    pub exclude_pages: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Announcement {
    /// Whether `now` falls inside the optional [starts_at, ends_at] window.
    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |s| s <= now) && self.ends_at.map_or(true, |e| e >= now)
    }

    /// Every file path this row points at.
    pub fn referenced_files(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.image_url.iter().cloned().collect();
        if let Some(slides) = &self.carousel_images {
            paths.extend(slides.iter().cloned());
        }
        paths
    }
}

/// Full column set written by create and full replace.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementFields {
    pub kind: Kind,
    pub title: Option<String>,
    pub message: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub carousel_images: Option<Vec<String>>,
    pub active: bool,
    pub dismissible: bool,
    pub include_pages: Option<String>,
    pub exclude_pages: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Partial update. Outer `None` means "leave the column alone"; for nullable
/// columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnouncementPatch {
    pub kind: Option<Kind>,
    pub title: Option<Option<String>>,
    pub message: Option<Option<String>>,
    pub link_url: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub active: Option<bool>,
    pub dismissible: Option<bool>,
    pub include_pages: Option<Option<String>>,
    pub exclude_pages: Option<Option<String>>,
    pub starts_at: Option<Option<DateTime<Utc>>>,
    pub ends_at: Option<Option<DateTime<Utc>>>,
    /// Set by the coordinator when the kind leaves `carousel`.
    pub clear_carousel: bool,
}

impl AnnouncementPatch {
    /// Parse a JSON object body. Unknown keys are ignored.
    pub fn from_json(body: &serde_json::Map<String, Value>) -> Result<Self, String> {
        let mut patch = Self::default();

        if let Some(v) = body.get("kind") {
            let raw = v.as_str().unwrap_or_default();
            patch.kind = Some(
                raw.parse()
                    .map_err(|_| format!("Invalid kind. Values: {KIND_VALUES}"))?,
            );
        }
        patch.title = text_value(body, "title")?;
        patch.message = text_value(body, "message")?;
        patch.link_url = text_value(body, "link_url")?;
        patch.image_url = text_value(body, "image_url")?;
        patch.include_pages = text_value(body, "include_pages")?;
        patch.exclude_pages = text_value(body, "exclude_pages")?;
        patch.active = body.get("active").map(|v| parse_flag_value(v).unwrap_or(false));
        patch.dismissible = body
            .get("dismissible")
            .map(|v| parse_flag_value(v).unwrap_or(true));
        patch.starts_at = time_value(body, "starts_at")?;
        patch.ends_at = time_value(body, "ends_at")?;

        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.title.is_none()
            && self.message.is_none()
            && self.link_url.is_none()
            && self.image_url.is_none()
            && self.active.is_none()
            && self.dismissible.is_none()
            && self.include_pages.is_none()
            && self.exclude_pages.is_none()
            && self.starts_at.is_none()
            && self.ends_at.is_none()
    }
}

fn text_value(
    body: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<Option<String>>, String> {
    match body.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => Ok(Some(non_empty(s))),
        Some(_) => Err(format!("{key} must be a string")),
    }
}

fn time_value(
    body: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<Option<DateTime<Utc>>>, String> {
    match body.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => parse_timestamp(s).map(Some),
        Some(_) => Err(format!("{key} must be a date string")),
    }
}

/// Empty strings are stored as NULL.
pub fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Tri-state boolean from a form value: "true"/"1" and "false"/"0"
/// (case-insensitive). Anything else is unset.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Tri-state boolean from a JSON value: booleans, numbers (non-zero is true)
/// and the strings accepted by [`parse_flag`].
pub fn parse_flag_value(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => parse_flag(s),
        _ => None,
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]`, `YYYY-MM-DDTHH:MM[:SS]` and
/// bare dates. Naive values are read as UTC. Blank means "no bound".
pub fn parse_timestamp(raw: &str) -> Result<Option<DateTime<Utc>>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(midnight.and_utc()));
    }
    Err(format!("Invalid date: {raw}"))
}
