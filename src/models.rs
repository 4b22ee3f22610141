use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value; // free-form metadata bag (tags, categories, SEO fields)
use utoipa::ToSchema;

/// Opaque string identifier (uuid v4 at creation time).
pub type Id = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "postgres-store",
    derive(sqlx::Type),
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum ContentType {
    Post,
    Page,
    Gallery,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "postgres-store",
    derive(sqlx::Type),
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum ContentStatus {
    Draft,
    Published,
    Archived,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Archived => "archived",
        }
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "postgres-store",
    derive(sqlx::Type),
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum CommentStatus {
    Pending,
    Approved,
    Rejected,
    Spam,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Rejected => "rejected",
            CommentStatus::Spam => "spam",
        }
    }
}

impl std::fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A publishable unit of material. All four types share one record shape
/// and identical lifecycle behavior; type-specific rendering is the
/// frontend's concern.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct ContentItem {
    pub id: Id,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub excerpt: String,
    pub author: String,
    pub status: ContentStatus,
    pub featured_image: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stamped exactly once, on the first transition into published.
    pub published_at: Option<DateTime<Utc>>,
    /// Pending scheduled publish while status = draft; inert history otherwise.
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewContent {
    #[serde(rename = "type", default = "default_content_type")]
    pub content_type: ContentType,
    pub title: String,
    pub slug: Option<String>,
    pub body: String,
    pub excerpt: Option<String>,
    pub status: Option<ContentStatus>,
    pub featured_image: Option<String>,
    pub metadata: Option<Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

fn default_content_type() -> ContentType {
    ContentType::Post
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateContent {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub body: Option<String>,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub metadata: Option<Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Status-only update body for the lifecycle endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatusChange {
    pub status: ContentStatus,
}

/// A visitor-submitted comment. `author_email` is never serialized in
/// API responses; it is retained for moderation tooling only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Comment {
    pub id: Id,
    pub content_id: Id,
    pub parent_id: Option<Id>,
    pub author_name: String,
    #[serde(skip_serializing, default)]
    pub author_email: String,
    pub body: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewComment {
    pub author_name: String,
    pub author_email: String,
    pub body: String,
    pub parent_id: Option<Id>,
    /// Token from the external CAPTCHA widget, forwarded to the verifier
    /// when `captcha_required` is set.
    pub captcha_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ModerateComment {
    pub status: CommentStatus,
}

/// Site-wide feature toggles, read on every comment submission.
/// Eventually-consistent configuration, not a transactional participant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Settings {
    pub comments_enabled: bool,
    pub moderation_required: bool,
    pub captcha_required: bool,
    pub site_title: String,
    pub site_description: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            comments_enabled: true,
            moderation_required: true,
            captcha_required: false,
            site_title: String::new(),
            site_description: String::new(),
            updated_at: DateTime::<Utc>::MIN_UTC,
            updated_by: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateSettings {
    pub comments_enabled: Option<bool>,
    pub moderation_required: Option<bool>,
    pub captcha_required: Option<bool>,
    pub site_title: Option<String>,
    pub site_description: Option<String>,
}

/// Subset of settings safe to expose without authentication.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublicSettings {
    pub comments_enabled: bool,
    pub captcha_required: bool,
    pub site_title: String,
    pub site_description: String,
}

impl From<&Settings> for PublicSettings {
    fn from(s: &Settings) -> Self {
        PublicSettings {
            comments_enabled: s.comments_enabled,
            captcha_required: s.captcha_required,
            site_title: s.site_title.clone(),
            site_description: s.site_description.clone(),
        }
    }
}
