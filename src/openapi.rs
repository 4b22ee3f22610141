use utoipa::OpenApi;

use crate::models::{
    Comment, ContentItem, ContentStatus, ContentType, CommentStatus, ModerateComment, NewComment,
    NewContent, PublicSettings, Settings, StatusChange, UpdateContent, UpdateSettings,
};
use crate::threads::CommentNode;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_content,
        crate::routes::list_content,
        crate::routes::get_content,
        crate::routes::get_content_by_slug,
        crate::routes::update_content,
        crate::routes::change_status,
        crate::routes::submit_comment,
        crate::routes::list_comment_tree,
        crate::routes::moderation_queue,
        crate::routes::moderate_comment,
        crate::routes::public_settings,
        crate::routes::admin_settings,
        crate::routes::update_admin_settings,
    ),
    components(schemas(
        ContentItem, NewContent, UpdateContent, StatusChange, ContentType, ContentStatus,
        Comment, NewComment, ModerateComment, CommentStatus, CommentNode,
        Settings, UpdateSettings, PublicSettings
    )),
    tags(
        (name = "content", description = "Content lifecycle operations"),
        (name = "comments", description = "Comment submission and moderation"),
        (name = "settings", description = "Site settings"),
    )
)]
pub struct ApiDoc;
