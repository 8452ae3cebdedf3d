//! Context items attached to a memo.
//!
//! Attachments exist in two shapes. [`StoredAttachment`] is what the row store
//! persists: media entries carry a bucket-relative object path and never a
//! URL. [`ServedAttachment`] is what clients receive: media entries carry a
//! freshly signed URL and never a path. The conversion lives in
//! [`crate::memos::present`].

use std::path::Path as FsPath;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::CaptureLimits;

const DEFAULT_AUDIO_SUFFIX: &str = ".wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// MIME whitelist for media uploads with the extension used for stored keys.
const MEDIA_TYPES: &[(&str, MediaKind, &str)] = &[
    ("image/jpeg", MediaKind::Image, "jpg"),
    ("image/png", MediaKind::Image, "png"),
    ("image/gif", MediaKind::Image, "gif"),
    ("image/webp", MediaKind::Image, "webp"),
    ("image/heic", MediaKind::Image, "heic"),
    ("video/mp4", MediaKind::Video, "mp4"),
    ("video/quicktime", MediaKind::Video, "mov"),
    ("video/webm", MediaKind::Video, "webm"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMedia {
    pub path: String,
    pub mime: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn validate(&self) -> Result<(), String> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(format!("lat must be between -90 and 90, got {}", self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(format!("lng must be between -180 and 180, got {}", self.lng));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoredAttachment {
    Image(StoredMedia),
    Video(StoredMedia),
    Location(GeoPoint),
}

impl StoredAttachment {
    pub fn media(kind: MediaKind, media: StoredMedia) -> Self {
        match kind {
            MediaKind::Image => Self::Image(media),
            MediaKind::Video => Self::Video(media),
        }
    }

    /// Object path backing this attachment, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Image(media) | Self::Video(media) => Some(media.path.as_str()),
            Self::Location(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServedMedia {
    pub url: String,
    pub mime: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServedAttachment {
    Image(ServedMedia),
    Video(ServedMedia),
    Location(GeoPoint),
}

/// One file part of an add-media request, before validation.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A media file that passed the validation gate.
#[derive(Debug, Clone)]
pub struct AcceptedMedia {
    pub kind: MediaKind,
    pub mime: String,
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Validates a whole batch before anything is uploaded; one bad file rejects
/// the batch.
pub fn validate_media_batch(
    files: Vec<MediaUpload>,
    limits: &CaptureLimits,
) -> Result<Vec<AcceptedMedia>, String> {
    if files.is_empty() {
        return Err("at least one file is required".to_string());
    }
    if files.len() > limits.max_attachments_per_request {
        return Err(format!(
            "too many files: {} supplied, at most {} allowed per request",
            files.len(),
            limits.max_attachments_per_request
        ));
    }

    files
        .into_iter()
        .enumerate()
        .map(|(index, file)| {
            let label = file
                .file_name
                .clone()
                .unwrap_or_else(|| format!("file #{}", index + 1));
            if file.bytes.is_empty() {
                return Err(format!("{label} is empty"));
            }
            if file.bytes.len() > limits.max_attachment_bytes {
                return Err(format!(
                    "{label} is {} bytes, limit is {} bytes",
                    file.bytes.len(),
                    limits.max_attachment_bytes
                ));
            }
            let mime = resolve_mime(file.content_type.as_deref(), file.file_name.as_deref())
                .ok_or_else(|| format!("{label} has no recognizable content type"))?;
            let (_, kind, extension) = MEDIA_TYPES
                .iter()
                .find(|(allowed, _, _)| *allowed == mime)
                .ok_or_else(|| format!("{label} has unsupported content type {mime}"))?;
            Ok(AcceptedMedia {
                kind: *kind,
                mime,
                extension: *extension,
                bytes: file.bytes,
            })
        })
        .collect()
}

fn resolve_mime(content_type: Option<&str>, file_name: Option<&str>) -> Option<String> {
    let declared = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value != "application/octet-stream");

    declared.or_else(|| {
        file_name
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|guess| guess.essence_str().to_ascii_lowercase())
    })
}

/// Parses the optional capture-time seed list. Only locations are accepted:
/// media must go through the upload path so stored keys are server-generated.
pub fn parse_seed_attachments(raw: Option<&str>) -> Result<Vec<StoredAttachment>, String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Vec::new());
    };

    let parsed: Value =
        serde_json::from_str(raw).map_err(|_| "attachments must be valid JSON".to_string())?;
    let Value::Array(items) = parsed else {
        return Err("attachments must be a JSON array".to_string());
    };

    items
        .into_iter()
        .map(|item| {
            match item.get("type").and_then(Value::as_str) {
                Some("location") => {}
                Some(other) => {
                    return Err(format!(
                        "attachment type '{other}' cannot be supplied at capture; upload media separately"
                    ))
                }
                None => return Err("attachment is missing a type".to_string()),
            }
            let point: GeoPoint = serde_json::from_value(item)
                .map_err(|err| format!("invalid location attachment: {err}"))?;
            point.validate()?;
            Ok(StoredAttachment::Location(point))
        })
        .collect()
}

/// `owner/memo.ext`, keeping the uploaded file's extension.
pub fn audio_object_path(owner_id: Uuid, memo_id: Uuid, file_name: Option<&str>) -> String {
    let suffix = file_name
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|ch| ch.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_AUDIO_SUFFIX.to_string());
    format!("{owner_id}/{memo_id}{suffix}")
}

pub fn media_object_path(owner_id: Uuid, memo_id: Uuid, extension: &str) -> String {
    format!("{owner_id}/{memo_id}/{}.{extension}", Uuid::new_v4())
}
