use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use metrics::counter;
use serde::Deserialize;
use tracing::info;

use crate::auth::{Auth, Role};
use crate::captcha::CaptchaVerifier;
use crate::clock::Clock;
use crate::error::ApiError;
use crate::models::*;
use crate::moderation;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::lifecycle;
use crate::require_role;
use crate::threads::{build_tree, CommentNode};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/content")
                    .route(web::get().to(list_content))
                    .route(web::post().to(create_content)),
            )
            .service(
                web::resource("/content/{id}")
                    .route(web::get().to(get_content))
                    .route(web::put().to(update_content)),
            )
            .service(
                web::resource("/content/slug/{slug}").route(web::get().to(get_content_by_slug)),
            )
            .service(
                web::resource("/content/{id}/status").route(web::post().to(change_status)),
            )
            .service(
                web::resource("/content/{id}/comments")
                    .route(web::get().to(list_comment_tree))
                    .route(web::post().to(submit_comment)),
            )
            .service(web::resource("/comments").route(web::get().to(moderation_queue)))
            .service(web::resource("/comments/{id}").route(web::put().to(moderate_comment)))
            .service(web::resource("/settings").route(web::get().to(public_settings)))
            .service(
                web::resource("/admin/settings")
                    .route(web::get().to(admin_settings))
                    .route(web::put().to(update_admin_settings)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub clock: Arc<dyn Clock>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub rate_limiter: RateLimiterFacade,
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string()
}

/// Derive a url-safe slug from a title, original-system style.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

// ---------------- Content ----------------

#[utoipa::path(
    post,
    path = "/api/v1/content",
    request_body = NewContent,
    responses(
        (status = 201, description = "Content created", body = ContentItem),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Slug conflict")
    )
)]
pub async fn create_content(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewContent>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Author | Role::Editor | Role::Admin);
    let payload = payload.into_inner();

    if payload.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    if payload.body.is_empty() {
        return Err(ApiError::Validation("body is required".into()));
    }
    let slug = match payload.slug {
        Some(s) if !s.trim().is_empty() => s,
        _ => slugify(&payload.title),
    };
    if slug.is_empty() {
        return Err(ApiError::Validation("slug could not be derived from title".into()));
    }

    let now = data.clock.now();
    // scheduled content is held in draft until the trigger fires
    let status = if payload.scheduled_at.is_some() {
        ContentStatus::Draft
    } else {
        payload.status.unwrap_or(ContentStatus::Draft)
    };
    let item = ContentItem {
        id: uuid::Uuid::new_v4().to_string(),
        content_type: payload.content_type,
        title: payload.title,
        slug,
        body: payload.body,
        excerpt: payload.excerpt.unwrap_or_default(),
        author: auth.0.sub.clone(),
        status,
        featured_image: payload.featured_image,
        metadata: payload.metadata.unwrap_or_else(|| serde_json::json!({})),
        created_at: now,
        updated_at: now,
        published_at: (status == ContentStatus::Published).then_some(now),
        scheduled_at: payload.scheduled_at,
    };
    let item = data.repo.create_content(item).await?;
    info!(content_id = %item.id, slug = %item.slug, status = %item.status, "content created");
    Ok(HttpResponse::Created().json(item))
}

#[derive(Debug, Deserialize)]
pub struct ListContentQuery {
    #[serde(rename = "type")]
    pub content_type: Option<ContentType>,
    pub status: Option<ContentStatus>,
}

#[utoipa::path(
    get,
    path = "/api/v1/content",
    params(
        ("type" = Option<String>, Query, description = "Filter by content type"),
        ("status" = Option<String>, Query, description = "Filter by status (authenticated for non-published)")
    ),
    responses((status = 200, description = "List content", body = [ContentItem]))
)]
pub async fn list_content(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    query: web::Query<ListContentQuery>,
) -> Result<HttpResponse, ApiError> {
    // anonymous callers only ever see published items
    let status = if auth.is_some() {
        query.status
    } else {
        Some(ContentStatus::Published)
    };
    let items = data.repo.list_content(query.content_type, status).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/content/{id}",
    params(("id" = String, Path, description = "Content id")),
    responses(
        (status = 200, description = "Content item", body = ContentItem),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_content(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let item = data.repo.get_content(&path.into_inner()).await?;
    if item.status != ContentStatus::Published && auth.is_none() {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(item))
}

#[utoipa::path(
    get,
    path = "/api/v1/content/slug/{slug}",
    params(("slug" = String, Path, description = "Content slug")),
    responses(
        (status = 200, description = "Content item", body = ContentItem),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_content_by_slug(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let item = data.repo.get_content_by_slug(&path.into_inner()).await?;
    if item.status != ContentStatus::Published && auth.is_none() {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(item))
}

#[utoipa::path(
    put,
    path = "/api/v1/content/{id}",
    request_body = UpdateContent,
    params(("id" = String, Path, description = "Content id")),
    responses(
        (status = 200, description = "Content updated", body = ContentItem),
        (status = 404, description = "Not found"),
        (status = 409, description = "Slug conflict")
    )
)]
pub async fn update_content(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateContent>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Author | Role::Editor | Role::Admin);
    let mut item = data.repo.get_content(&path.into_inner()).await?;
    let upd = payload.into_inner();

    if let Some(title) = upd.title {
        if title.trim().is_empty() {
            return Err(ApiError::Validation("title must not be empty".into()));
        }
        item.title = title;
    }
    if let Some(slug) = upd.slug {
        if slug.trim().is_empty() {
            return Err(ApiError::Validation("slug must not be empty".into()));
        }
        item.slug = slug;
    }
    if let Some(body) = upd.body {
        item.body = body;
    }
    if let Some(excerpt) = upd.excerpt {
        item.excerpt = excerpt;
    }
    if let Some(featured_image) = upd.featured_image {
        item.featured_image = Some(featured_image);
    }
    if let Some(metadata) = upd.metadata {
        item.metadata = metadata;
    }
    if let Some(scheduled_at) = upd.scheduled_at {
        // (re)scheduling pulls the item back to draft
        item.scheduled_at = Some(scheduled_at);
        item.status = ContentStatus::Draft;
    }
    item.updated_at = data.clock.now();

    let item = data.repo.update_content(item).await?;
    Ok(HttpResponse::Ok().json(item))
}

#[utoipa::path(
    post,
    path = "/api/v1/content/{id}/status",
    request_body = StatusChange,
    params(("id" = String, Path, description = "Content id")),
    responses(
        (status = 200, description = "Status changed", body = ContentItem),
        (status = 404, description = "Not found"),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn change_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<StatusChange>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Author | Role::Editor | Role::Admin);
    let item = data.repo.get_content(&path.into_inner()).await?;
    let next = lifecycle::transition(&item, payload.status, data.clock.now())?;
    let next = data.repo.update_content(next).await?;
    info!(content_id = %next.id, from = %item.status, to = %next.status, "content status changed");
    Ok(HttpResponse::Ok().json(next))
}

// ---------------- Comments ----------------

#[utoipa::path(
    post,
    path = "/api/v1/content/{id}/comments",
    request_body = NewComment,
    params(("id" = String, Path, description = "Content id")),
    responses(
        (status = 201, description = "Comment admitted", body = Comment),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Comments disabled / CAPTCHA required / not published"),
        (status = 404, description = "Content or parent comment not found"),
        (status = 429, description = "Rate limit exceeded")
    )
)]
pub async fn submit_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let content_id = path.into_inner();
    let draft = payload.into_inner();
    let ip = client_ip(&req);

    let settings = data.repo.get_settings().await?;

    let content = data.repo.get_content(&content_id).await?;
    if content.status != ContentStatus::Published {
        counter!("comments_rejected_total", 1);
        return Err(ApiError::PolicyRejected(
            "comments are only allowed on published content".into(),
        ));
    }

    let captcha_verified = match (settings.captcha_required, &draft.captcha_token) {
        (true, Some(token)) => data.captcha.verify(token, &ip).await,
        _ => false,
    };

    // a solved CAPTCHA is the primary abuse control; otherwise rate limit
    if !(settings.captcha_required && captcha_verified) && !data.rate_limiter.allow_comment(&ip) {
        return Err(ApiError::RateLimited);
    }

    let parent = match &draft.parent_id {
        Some(pid) => match data.repo.get_comment(pid).await {
            Ok(p) => Some(p),
            Err(RepoError::NotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    let initial = match moderation::admit(&draft, &content_id, parent.as_ref(), &settings, captcha_verified)
    {
        Ok(status) => status,
        Err(e) => {
            counter!("comments_rejected_total", 1);
            return Err(e.into());
        }
    };

    let now = data.clock.now();
    let comment = Comment {
        id: uuid::Uuid::new_v4().to_string(),
        content_id,
        parent_id: draft.parent_id,
        author_name: moderation::sanitize(&draft.author_name),
        author_email: draft.author_email.trim().to_string(),
        body: moderation::sanitize(&draft.body),
        status: initial,
        created_at: now,
        updated_at: now,
    };
    let comment = data.repo.create_comment(comment).await?;
    counter!("comments_admitted_total", 1);
    info!(comment_id = %comment.id, content_id = %comment.content_id, status = %comment.status, "comment admitted");
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/api/v1/content/{id}/comments",
    params(("id" = String, Path, description = "Content id")),
    responses(
        (status = 200, description = "Approved comment tree", body = [CommentNode]),
        (status = 404, description = "Content not found")
    )
)]
pub async fn list_comment_tree(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let content_id = path.into_inner();
    let content = data.repo.get_content(&content_id).await?;
    if content.status != ContentStatus::Published {
        return Err(ApiError::NotFound);
    }
    let comments = data
        .repo
        .list_comments_for_content(&content_id, Some(CommentStatus::Approved))
        .await?;
    let forest: Vec<CommentNode> = build_tree(comments);
    Ok(HttpResponse::Ok().json(forest))
}

#[derive(Debug, Deserialize)]
pub struct ModerationQueueQuery {
    pub status: Option<CommentStatus>,
}

#[utoipa::path(
    get,
    path = "/api/v1/comments",
    params(("status" = Option<String>, Query, description = "Filter by moderation status")),
    responses(
        (status = 200, description = "Moderation queue", body = [Comment]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn moderation_queue(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<ModerationQueueQuery>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Editor | Role::Admin);
    let comments = data.repo.list_comments_by_status(query.status).await?;
    Ok(HttpResponse::Ok().json(comments))
}

#[utoipa::path(
    put,
    path = "/api/v1/comments/{id}",
    request_body = ModerateComment,
    params(("id" = String, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment moderated", body = Comment),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn moderate_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ModerateComment>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Editor | Role::Admin);
    let comment = data.repo.get_comment(&path.into_inner()).await?;
    let next = moderation::moderate(&comment, payload.status, data.clock.now())?;
    let next = data.repo.update_comment(next).await?;
    if next.status == CommentStatus::Spam {
        counter!("comments_spam_total", 1);
    }
    info!(
        comment_id = %next.id,
        from = %comment.status,
        to = %next.status,
        moderator = %auth.0.sub,
        "comment moderated"
    );
    Ok(HttpResponse::Ok().json(next))
}

// ---------------- Settings ----------------

#[utoipa::path(
    get,
    path = "/api/v1/settings",
    responses((status = 200, description = "Public settings", body = PublicSettings))
)]
pub async fn public_settings(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let settings = data.repo.get_settings().await?;
    Ok(HttpResponse::Ok().json(PublicSettings::from(&settings)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/settings",
    responses(
        (status = 200, description = "Full settings", body = Settings),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn admin_settings(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let settings = data.repo.get_settings().await?;
    Ok(HttpResponse::Ok().json(settings))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/settings",
    request_body = UpdateSettings,
    responses(
        (status = 200, description = "Settings updated", body = Settings),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn update_admin_settings(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateSettings>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let settings = data
        .repo
        .update_settings(payload.into_inner(), &auth.0.sub, data.clock.now())
        .await?;
    info!(updated_by = %auth.0.sub, "settings updated");
    Ok(HttpResponse::Ok().json(settings))
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugify_normalizes_titles() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Already--dashed  "), "already-dashed");
        assert_eq!(slugify("!!!"), "");
    }
}
