use crate::auth::Role;
use crate::error::{ApiErrorBody, ErrorCode, FieldError};
use crate::feed::{BlogEdge, BlogFeed, PageInfo};
use crate::file::UploadForm;
use crate::interaction::HeartChange;
use crate::models::{
    Blog, BlogStatus, File, Interaction, InteractionState, InteractionType, NewBlog, NewNotification, Notification,
    Provider, UpdateBlog, UpdateProfile, User,
};
use crate::notification::{MarkedRead, NotificationList};
use crate::session::{RefreshRequest, TokenPair};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_blogs,
        crate::routes::published_feed,
        crate::routes::last_edited_blog,
        crate::routes::get_blog,
        crate::routes::create_blog,
        crate::routes::update_blog,
        crate::routes::delete_blog,
        crate::routes::interaction_state,
        crate::routes::add_heart,
        crate::routes::remove_heart,
        crate::routes::create_notification,
        crate::routes::list_notifications,
        crate::routes::mark_notification_read,
        crate::routes::get_profile,
        crate::routes::update_profile,
        crate::routes::upload_file,
        crate::routes::file_ids,
        crate::routes::open_session,
        crate::routes::refresh_session,
        crate::routes::logout,
    ),
    components(schemas(
        Blog, BlogStatus, NewBlog, UpdateBlog, BlogFeed, BlogEdge, PageInfo,
        Interaction, InteractionType, InteractionState, HeartChange,
        Notification, NewNotification, NotificationList, MarkedRead,
        User, Provider, Role, UpdateProfile,
        File, UploadForm, crate::routes::FileLookup, crate::routes::FileIds,
        TokenPair, RefreshRequest,
        ApiErrorBody, ErrorCode, FieldError,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "blogs", description = "Blog posts and the published feed"),
        (name = "interactions", description = "Hearts"),
        (name = "notifications", description = "User notifications"),
        (name = "users", description = "Profiles"),
        (name = "files", description = "Uploads"),
        (name = "auth", description = "Refresh-token sessions"),
    )
)]
pub struct ApiDoc;
