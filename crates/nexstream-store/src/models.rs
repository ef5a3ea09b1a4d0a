//! Typed domain models and their mapping to raw store documents.
//!
//! The store itself only knows JSON documents. The fixed-shape records the
//! client works with are decoded here, at the subscription boundary, and
//! decoding fails closed: a missing or mistyped field becomes a documented
//! default (empty string, zero counter, epoch timestamp, nil id) instead of
//! leaking an undefined value into the projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use nexstream_shared::Identity;

/// A raw store document: a JSON object keyed by field name.
pub type Document = serde_json::Map<String, Value>;

// Field names shared by queries, writes and increments.
pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_VIEWS: &str = "views";
pub const FIELD_LIKES: &str = "likes";
pub const FIELD_UPLOADER_ID: &str = "uploader_id";
pub const FIELD_VIDEO_ID: &str = "video_id";

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// A published video. Created by upload, counters mutated only through
/// atomic increments, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoRecord {
    /// Unique record identifier assigned by the store.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Media locator (playback URL).
    pub url: String,
    /// Thumbnail image locator.
    pub thumbnail: String,
    /// User id of the uploader; doubles as the channel identifier.
    pub uploader_id: String,
    /// Display name of the uploader at upload time.
    pub uploader_name: String,
    /// Optional avatar locator of the uploader.
    pub uploader_avatar: Option<String>,
    /// Server-assigned creation timestamp.
    pub created_at: DateTime<Utc>,
    /// View counter.
    pub views: i64,
    /// Like counter.
    pub likes: i64,
    /// Optional pre-rendered duration label ("12:45").
    pub duration: Option<String>,
}

impl VideoRecord {
    /// Decode a raw document, applying defaults for anything missing.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: get_uuid(doc, FIELD_ID),
            title: get_string(doc, "title"),
            description: get_string(doc, "description"),
            url: get_string(doc, "url"),
            thumbnail: get_string(doc, "thumbnail"),
            uploader_id: get_string(doc, FIELD_UPLOADER_ID),
            uploader_name: get_string(doc, "uploader_name"),
            uploader_avatar: get_opt_string(doc, "uploader_avatar"),
            created_at: get_timestamp(doc, FIELD_CREATED_AT),
            views: get_i64(doc, FIELD_VIEWS),
            likes: get_i64(doc, FIELD_LIKES),
            duration: get_opt_string(doc, "duration"),
        }
    }
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

/// A single comment under a video. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentRecord {
    /// Unique record identifier assigned by the store.
    pub id: Uuid,
    /// The video this comment belongs to.
    pub video_id: Uuid,
    /// User id of the author.
    pub author_id: String,
    /// Display name of the author at submission time.
    pub author_name: String,
    /// Optional avatar locator of the author.
    pub author_avatar: Option<String>,
    /// Comment body.
    pub text: String,
    /// Server-assigned creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl CommentRecord {
    /// Decode a raw document, applying defaults for anything missing.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: get_uuid(doc, FIELD_ID),
            video_id: get_uuid(doc, FIELD_VIDEO_ID),
            author_id: get_string(doc, "author_id"),
            author_name: get_string(doc, "author_name"),
            author_avatar: get_opt_string(doc, "author_avatar"),
            text: get_string(doc, "text"),
            created_at: get_timestamp(doc, FIELD_CREATED_AT),
        }
    }

    /// Build the document written when `author` submits `text` under a
    /// video. `id` and `created_at` are assigned by the store on write.
    pub fn draft_document(video_id: Uuid, text: &str, author: &Identity) -> Document {
        let mut doc = Document::new();
        doc.insert(FIELD_VIDEO_ID.into(), json!(video_id.to_string()));
        doc.insert("author_id".into(), json!(author.user_id));
        doc.insert("author_name".into(), json!(author.display_name));
        doc.insert("author_avatar".into(), json!(author.avatar_url));
        doc.insert("text".into(), json!(text));
        doc
    }
}

// ---------------------------------------------------------------------------
// Upload draft
// ---------------------------------------------------------------------------

/// The upload form payload. Validated by the engine before it is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoDraft {
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumbnail: String,
}

impl VideoDraft {
    /// Build the document written for a new upload by `uploader`.
    /// Counters start at zero; `id` and `created_at` come from the store.
    pub fn into_document(self, uploader: &Identity) -> Document {
        let mut doc = Document::new();
        doc.insert("title".into(), json!(self.title));
        doc.insert("description".into(), json!(self.description));
        doc.insert("url".into(), json!(self.url));
        doc.insert("thumbnail".into(), json!(self.thumbnail));
        doc.insert(FIELD_UPLOADER_ID.into(), json!(uploader.user_id));
        doc.insert("uploader_name".into(), json!(uploader.display_name));
        doc.insert("uploader_avatar".into(), json!(uploader.avatar_url));
        doc.insert(FIELD_VIEWS.into(), json!(0));
        doc.insert(FIELD_LIKES.into(), json!(0));
        doc
    }
}

// ---------------------------------------------------------------------------
// Fail-closed field accessors
// ---------------------------------------------------------------------------

fn get_string(doc: &Document, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn get_opt_string(doc: &Document, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn get_i64(doc: &Document, key: &str) -> i64 {
    doc.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn get_uuid(doc: &Document, key: &str) -> Uuid {
    doc.get(key)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::nil)
}

fn get_timestamp(doc: &Document, key: &str) -> DateTime<Utc> {
    doc.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
}
