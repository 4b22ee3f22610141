use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Persist a new item. Slug collisions yield `Conflict`.
    async fn create_content(&self, item: ContentItem) -> RepoResult<ContentItem>;
    async fn get_content(&self, id: &str) -> RepoResult<ContentItem>;
    async fn get_content_by_slug(&self, slug: &str) -> RepoResult<ContentItem>;
    async fn list_content(
        &self,
        content_type: Option<ContentType>,
        status: Option<ContentStatus>,
    ) -> RepoResult<Vec<ContentItem>>;
    /// Whole-item write. Concurrent writers resolve last-write-wins.
    async fn update_content(&self, item: ContentItem) -> RepoResult<ContentItem>;
    /// Draft items whose scheduled time has arrived, oldest schedule first.
    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> RepoResult<Vec<ContentItem>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn create_comment(&self, comment: Comment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: &str) -> RepoResult<Comment>;
    /// Comments for one content item, created-at ascending (tree input).
    async fn list_comments_for_content(
        &self,
        content_id: &str,
        status: Option<CommentStatus>,
    ) -> RepoResult<Vec<Comment>>;
    /// Moderation queue view, created-at ascending.
    async fn list_comments_by_status(
        &self,
        status: Option<CommentStatus>,
    ) -> RepoResult<Vec<Comment>>;
    async fn update_comment(&self, comment: Comment) -> RepoResult<Comment>;
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    /// Single-record lookup; defaults when nothing has been stored yet.
    async fn get_settings(&self) -> RepoResult<Settings>;
    async fn update_settings(
        &self,
        update: UpdateSettings,
        updated_by: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Settings>;
}

pub trait Repo: ContentRepo + CommentRepo + SettingsRepo {}

impl<T> Repo for T where T: ContentRepo + CommentRepo + SettingsRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default)]
    struct State {
        content: HashMap<Id, ContentItem>,
        comments: HashMap<Id, Comment>,
        settings: Option<Settings>,
    }

    /// On-disk comment record. `Comment` redacts `author_email` when
    /// serialized for API responses, so the snapshot carries its own type
    /// to round-trip every stored field.
    #[derive(Serialize, Deserialize)]
    struct CommentRecord {
        id: Id,
        content_id: Id,
        parent_id: Option<Id>,
        author_name: String,
        author_email: String,
        body: String,
        status: CommentStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    impl From<&Comment> for CommentRecord {
        fn from(c: &Comment) -> Self {
            CommentRecord {
                id: c.id.clone(),
                content_id: c.content_id.clone(),
                parent_id: c.parent_id.clone(),
                author_name: c.author_name.clone(),
                author_email: c.author_email.clone(),
                body: c.body.clone(),
                status: c.status,
                created_at: c.created_at,
                updated_at: c.updated_at,
            }
        }
    }

    impl From<CommentRecord> for Comment {
        fn from(r: CommentRecord) -> Self {
            Comment {
                id: r.id,
                content_id: r.content_id,
                parent_id: r.parent_id,
                author_name: r.author_name,
                author_email: r.author_email,
                body: r.body,
                status: r.status,
                created_at: r.created_at,
                updated_at: r.updated_at,
            }
        }
    }

    #[derive(Default, Serialize, Deserialize)]
    struct Snapshot {
        content: HashMap<Id, ContentItem>,
        comments: HashMap<Id, CommentRecord>,
        settings: Option<Settings>,
    }

    impl From<&State> for Snapshot {
        fn from(s: &State) -> Self {
            Snapshot {
                content: s.content.clone(),
                comments: s.comments.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
                settings: s.settings.clone(),
            }
        }
    }

    impl From<Snapshot> for State {
        fn from(s: Snapshot) -> Self {
            State {
                content: s.content,
                comments: s.comments.into_iter().map(|(k, v)| (k, v.into())).collect(),
                settings: s.settings,
            }
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("PAPYRUS_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<Snapshot>(&bytes) {
                    Ok(s) => {
                        eprintln!("[inmem] Loaded snapshot '{}'", path.display());
                        s.into()
                    }
                    Err(e) => {
                        eprintln!(
                            "[inmem] Failed to parse snapshot '{}': {e}. Starting empty.",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(e) => {
                    eprintln!("[inmem] No snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            let snapshot = Snapshot::from(&*self.state.read().unwrap());
            if let Ok(s) = serde_json::to_vec_pretty(&snapshot) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    eprintln!("[inmem] Failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    fn publish_order(item: &ContentItem) -> DateTime<Utc> {
        item.published_at.unwrap_or(item.created_at)
    }

    #[async_trait]
    impl ContentRepo for InMemRepo {
        async fn create_content(&self, item: ContentItem) -> RepoResult<ContentItem> {
            let mut s = self.state.write().unwrap();
            if s.content.values().any(|c| c.slug == item.slug) {
                return Err(RepoError::Conflict);
            }
            s.content.insert(item.id.clone(), item.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(item)
        }

        async fn get_content(&self, id: &str) -> RepoResult<ContentItem> {
            let s = self.state.read().unwrap();
            s.content.get(id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_content_by_slug(&self, slug: &str) -> RepoResult<ContentItem> {
            let s = self.state.read().unwrap();
            s.content
                .values()
                .find(|c| c.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn list_content(
            &self,
            content_type: Option<ContentType>,
            status: Option<ContentStatus>,
        ) -> RepoResult<Vec<ContentItem>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .content
                .values()
                .filter(|c| content_type.map_or(true, |t| c.content_type == t))
                .filter(|c| status.map_or(true, |st| c.status == st))
                .cloned()
                .collect();
            v.sort_by_key(publish_order);
            Ok(v)
        }

        async fn update_content(&self, item: ContentItem) -> RepoResult<ContentItem> {
            let mut s = self.state.write().unwrap();
            // slug uniqueness against everyone else
            if s.content
                .values()
                .any(|c| c.slug == item.slug && c.id != item.id)
            {
                return Err(RepoError::Conflict);
            }
            if !s.content.contains_key(&item.id) {
                return Err(RepoError::NotFound);
            }
            s.content.insert(item.id.clone(), item.clone());
            drop(s);
            self.persist();
            Ok(item)
        }

        async fn list_due_scheduled(&self, now: DateTime<Utc>) -> RepoResult<Vec<ContentItem>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .content
                .values()
                .filter(|c| c.status == ContentStatus::Draft)
                .filter(|c| c.scheduled_at.map_or(false, |t| t <= now))
                .cloned()
                .collect();
            v.sort_by_key(|c| c.scheduled_at);
            Ok(v)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn create_comment(&self, comment: Comment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            s.comments.insert(comment.id.clone(), comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn get_comment(&self, id: &str) -> RepoResult<Comment> {
            let s = self.state.read().unwrap();
            s.comments.get(id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_comments_for_content(
            &self,
            content_id: &str,
            status: Option<CommentStatus>,
        ) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.content_id == content_id)
                .filter(|c| status.map_or(true, |st| c.status == st))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(v)
        }

        async fn list_comments_by_status(
            &self,
            status: Option<CommentStatus>,
        ) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| status.map_or(true, |st| c.status == st))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(v)
        }

        async fn update_comment(&self, comment: Comment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.comments.contains_key(&comment.id) {
                return Err(RepoError::NotFound);
            }
            s.comments.insert(comment.id.clone(), comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }
    }

    #[async_trait]
    impl SettingsRepo for InMemRepo {
        async fn get_settings(&self) -> RepoResult<Settings> {
            let s = self.state.read().unwrap();
            Ok(s.settings.clone().unwrap_or_default())
        }

        async fn update_settings(
            &self,
            update: UpdateSettings,
            updated_by: &str,
            now: DateTime<Utc>,
        ) -> RepoResult<Settings> {
            let mut s = self.state.write().unwrap();
            let mut settings = s.settings.clone().unwrap_or_default();
            if let Some(v) = update.comments_enabled {
                settings.comments_enabled = v;
            }
            if let Some(v) = update.moderation_required {
                settings.moderation_required = v;
            }
            if let Some(v) = update.captcha_required {
                settings.captcha_required = v;
            }
            if let Some(v) = update.site_title {
                settings.site_title = v;
            }
            if let Some(v) = update.site_description {
                settings.site_description = v;
            }
            settings.updated_at = now;
            settings.updated_by = Some(updated_by.to_string());
            s.settings = Some(settings.clone());
            drop(s);
            self.persist();
            Ok(settings)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Unavailable(other.to_string()),
        }
    }

    const CONTENT_COLS: &str = "id, content_type, title, slug, body, excerpt, author, status, \
                                featured_image, metadata, created_at, updated_at, published_at, scheduled_at";
    const COMMENT_COLS: &str =
        "id, content_id, parent_id, author_name, author_email, body, status, created_at, updated_at";

    #[async_trait]
    impl ContentRepo for PgRepo {
        async fn create_content(&self, item: ContentItem) -> RepoResult<ContentItem> {
            sqlx::query(
                "INSERT INTO content (id, content_type, title, slug, body, excerpt, author, status, \
                 featured_image, metadata, created_at, updated_at, published_at, scheduled_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
            )
            .bind(&item.id)
            .bind(item.content_type)
            .bind(&item.title)
            .bind(&item.slug)
            .bind(&item.body)
            .bind(&item.excerpt)
            .bind(&item.author)
            .bind(item.status)
            .bind(&item.featured_image)
            .bind(&item.metadata)
            .bind(item.created_at)
            .bind(item.updated_at)
            .bind(item.published_at)
            .bind(item.scheduled_at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(item)
        }

        async fn get_content(&self, id: &str) -> RepoResult<ContentItem> {
            sqlx::query_as::<_, ContentItem>(&format!(
                "SELECT {CONTENT_COLS} FROM content WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_content_by_slug(&self, slug: &str) -> RepoResult<ContentItem> {
            sqlx::query_as::<_, ContentItem>(&format!(
                "SELECT {CONTENT_COLS} FROM content WHERE slug = $1"
            ))
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn list_content(
            &self,
            content_type: Option<ContentType>,
            status: Option<ContentStatus>,
        ) -> RepoResult<Vec<ContentItem>> {
            sqlx::query_as::<_, ContentItem>(&format!(
                "SELECT {CONTENT_COLS} FROM content \
                 WHERE ($1::text IS NULL OR content_type = $1) \
                   AND ($2::text IS NULL OR status = $2) \
                 ORDER BY COALESCE(published_at, created_at) ASC"
            ))
            .bind(content_type)
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn update_content(&self, item: ContentItem) -> RepoResult<ContentItem> {
            let res = sqlx::query(
                "UPDATE content SET content_type=$2, title=$3, slug=$4, body=$5, excerpt=$6, \
                 author=$7, status=$8, featured_image=$9, metadata=$10, updated_at=$11, \
                 published_at=$12, scheduled_at=$13 WHERE id=$1",
            )
            .bind(&item.id)
            .bind(item.content_type)
            .bind(&item.title)
            .bind(&item.slug)
            .bind(&item.body)
            .bind(&item.excerpt)
            .bind(&item.author)
            .bind(item.status)
            .bind(&item.featured_image)
            .bind(&item.metadata)
            .bind(item.updated_at)
            .bind(item.published_at)
            .bind(item.scheduled_at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(item)
        }

        async fn list_due_scheduled(&self, now: DateTime<Utc>) -> RepoResult<Vec<ContentItem>> {
            sqlx::query_as::<_, ContentItem>(&format!(
                "SELECT {CONTENT_COLS} FROM content \
                 WHERE status = 'draft' AND scheduled_at IS NOT NULL AND scheduled_at <= $1 \
                 ORDER BY scheduled_at ASC"
            ))
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn create_comment(&self, comment: Comment) -> RepoResult<Comment> {
            sqlx::query(
                "INSERT INTO comments (id, content_id, parent_id, author_name, author_email, \
                 body, status, created_at, updated_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
            )
            .bind(&comment.id)
            .bind(&comment.content_id)
            .bind(&comment.parent_id)
            .bind(&comment.author_name)
            .bind(&comment.author_email)
            .bind(&comment.body)
            .bind(comment.status)
            .bind(comment.created_at)
            .bind(comment.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(comment)
        }

        async fn get_comment(&self, id: &str) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(&format!(
                "SELECT {COMMENT_COLS} FROM comments WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn list_comments_for_content(
            &self,
            content_id: &str,
            status: Option<CommentStatus>,
        ) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(&format!(
                "SELECT {COMMENT_COLS} FROM comments \
                 WHERE content_id = $1 AND ($2::text IS NULL OR status = $2) \
                 ORDER BY created_at ASC, id ASC"
            ))
            .bind(content_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn list_comments_by_status(
            &self,
            status: Option<CommentStatus>,
        ) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(&format!(
                "SELECT {COMMENT_COLS} FROM comments \
                 WHERE ($1::text IS NULL OR status = $1) \
                 ORDER BY created_at ASC, id ASC"
            ))
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn update_comment(&self, comment: Comment) -> RepoResult<Comment> {
            let res = sqlx::query(
                "UPDATE comments SET status=$2, updated_at=$3 WHERE id=$1",
            )
            .bind(&comment.id)
            .bind(comment.status)
            .bind(comment.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(comment)
        }
    }

    #[async_trait]
    impl SettingsRepo for PgRepo {
        async fn get_settings(&self) -> RepoResult<Settings> {
            let row = sqlx::query_as::<_, Settings>(
                "SELECT comments_enabled, moderation_required, captcha_required, site_title, \
                 site_description, updated_at, updated_by FROM settings WHERE key = 'site'",
            )
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(row.unwrap_or_default())
        }

        async fn update_settings(
            &self,
            update: UpdateSettings,
            updated_by: &str,
            now: DateTime<Utc>,
        ) -> RepoResult<Settings> {
            let mut settings = self.get_settings().await?;
            if let Some(v) = update.comments_enabled {
                settings.comments_enabled = v;
            }
            if let Some(v) = update.moderation_required {
                settings.moderation_required = v;
            }
            if let Some(v) = update.captcha_required {
                settings.captcha_required = v;
            }
            if let Some(v) = update.site_title {
                settings.site_title = v;
            }
            if let Some(v) = update.site_description {
                settings.site_description = v;
            }
            settings.updated_at = now;
            settings.updated_by = Some(updated_by.to_string());
            sqlx::query(
                "INSERT INTO settings (key, comments_enabled, moderation_required, captcha_required, \
                 site_title, site_description, updated_at, updated_by) \
                 VALUES ('site',$1,$2,$3,$4,$5,$6,$7) \
                 ON CONFLICT (key) DO UPDATE SET comments_enabled=$1, moderation_required=$2, \
                 captcha_required=$3, site_title=$4, site_description=$5, updated_at=$6, updated_by=$7",
            )
            .bind(settings.comments_enabled)
            .bind(settings.moderation_required)
            .bind(settings.captcha_required)
            .bind(&settings.site_title)
            .bind(&settings.site_description)
            .bind(settings.updated_at)
            .bind(&settings.updated_by)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(settings)
        }
    }
}
