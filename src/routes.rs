use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Auth, Role};
use crate::blog::BlogService;
use crate::error::{json_config, path_config, query_config, ApiError};
use crate::feed::FeedParams;
use crate::file::{read_upload, FileService};
use crate::interaction::InteractionService;
use crate::models::*;
use crate::notification::{ListParams, NotificationHub, NotificationService};
use crate::realtime;
use crate::repo::Repo;
use crate::require_role;
use crate::session::{RefreshRequest, SessionService};
use crate::storage::ObjectStore;
use crate::user::UserService;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .service(
            web::scope("/api")
                .service(
                    web::resource("/blog")
                        .route(web::get().to(list_blogs))
                        .route(web::post().to(create_blog)),
                )
                .service(web::resource("/blog/published").route(web::get().to(published_feed)))
                .service(web::resource("/blog/last-edited").route(web::get().to(last_edited_blog)))
                .service(
                    web::resource("/blog/{id}")
                        .route(web::get().to(get_blog))
                        .route(web::put().to(update_blog))
                        .route(web::delete().to(delete_blog)),
                )
                .service(web::resource("/interaction/user/blog/{blog_id}").route(web::get().to(interaction_state)))
                .service(
                    web::resource("/interaction/blog/{blog_id}/heart")
                        .route(web::post().to(add_heart))
                        .route(web::delete().to(remove_heart)),
                )
                .service(
                    web::resource("/notification")
                        .route(web::get().to(list_notifications))
                        .route(web::post().to(create_notification)),
                )
                .service(web::resource("/notification/{id}/read").route(web::patch().to(mark_notification_read)))
                .service(
                    web::resource("/user")
                        .route(web::get().to(get_profile))
                        .route(web::put().to(update_profile)),
                )
                .service(web::resource("/user/file").route(web::post().to(upload_file)))
                .service(web::resource("/user/file/ids").route(web::post().to(file_ids)))
                .service(web::resource("/auth/session").route(web::post().to(open_session)))
                .service(web::resource("/auth/refresh").route(web::post().to(refresh_session)))
                .service(web::resource("/auth/logout").route(web::post().to(logout)))
                .service(web::resource("/realtime").route(web::get().to(realtime::connect))),
        );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub object_store: Arc<dyn ObjectStore>,
    pub hub: Arc<NotificationHub>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, object_store: Arc<dyn ObjectStore>) -> Self {
        Self { repo, object_store, hub: Arc::new(NotificationHub::new()) }
    }
}

// ---------------------------------------------------------------- blogs

#[utoipa::path(
    get,
    path = "/api/blog",
    tag = "blogs",
    responses((status = 200, description = "Every blog", body = [Blog]))
)]
pub async fn list_blogs(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let blogs = BlogService::new(data.repo.as_ref()).list().await?;
    Ok(HttpResponse::Ok().json(blogs))
}

#[utoipa::path(
    get,
    path = "/api/blog/published",
    tag = "blogs",
    params(FeedParams),
    responses(
        (status = 200, description = "One page of published blogs", body = crate::feed::BlogFeed),
        (status = 400, description = "Malformed cursor", body = crate::error::ApiErrorBody)
    )
)]
pub async fn published_feed(data: web::Data<AppState>, params: web::Query<FeedParams>) -> Result<HttpResponse, ApiError> {
    let feed = BlogService::new(data.repo.as_ref()).feed(&params).await?;
    Ok(HttpResponse::Ok().json(feed))
}

#[utoipa::path(
    get,
    path = "/api/blog/last-edited",
    tag = "blogs",
    responses(
        (status = 200, description = "Caller's most recently updated blog", body = Blog),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiErrorBody),
        (status = 404, description = "Caller has no blogs", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn last_edited_blog(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::User);
    let blog = BlogService::new(data.repo.as_ref()).last_edited(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(blog))
}

#[utoipa::path(
    get,
    path = "/api/blog/{id}",
    tag = "blogs",
    params(("id" = String, Path, description = "Blog id")),
    responses(
        (status = 200, description = "Blog", body = Blog),
        (status = 400, description = "Malformed id", body = crate::error::ApiErrorBody),
        (status = 404, description = "Blog not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_blog(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let blog = BlogService::new(data.repo.as_ref()).get(&path).await?;
    Ok(HttpResponse::Ok().json(blog))
}

#[utoipa::path(
    post,
    path = "/api/blog",
    tag = "blogs",
    request_body = NewBlog,
    responses(
        (status = 201, description = "Blog created (unpublished)", body = Blog),
        (status = 400, description = "Validation failed", body = crate::error::ApiErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiErrorBody),
        (status = 403, description = "Role not permitted", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn create_blog(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewBlog>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::User, Role::Admin);
    let blog = BlogService::new(data.repo.as_ref()).create(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(blog))
}

#[utoipa::path(
    put,
    path = "/api/blog/{id}",
    tag = "blogs",
    request_body = UpdateBlog,
    params(("id" = String, Path, description = "Blog id")),
    responses(
        (status = 200, description = "Blog updated", body = Blog),
        (status = 400, description = "Malformed id or validation failed", body = crate::error::ApiErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiErrorBody),
        (status = 403, description = "Neither owner nor admin", body = crate::error::ApiErrorBody),
        (status = 404, description = "Blog not found", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn update_blog(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateBlog>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::User, Role::Admin);
    let blog = BlogService::new(data.repo.as_ref()).update(&path, &auth, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(blog))
}

#[utoipa::path(
    delete,
    path = "/api/blog/{id}",
    tag = "blogs",
    params(("id" = String, Path, description = "Blog id")),
    responses(
        (status = 204, description = "Blog and its interactions removed"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiErrorBody),
        (status = 403, description = "Neither owner nor admin", body = crate::error::ApiErrorBody),
        (status = 404, description = "Blog not found", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn delete_blog(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    BlogService::new(data.repo.as_ref()).delete(&path, &auth).await?;
    Ok(HttpResponse::NoContent().finish())
}

// --------------------------------------------------------- interactions

#[utoipa::path(
    get,
    path = "/api/interaction/user/blog/{blog_id}",
    tag = "interactions",
    params(("blog_id" = String, Path, description = "Blog id")),
    responses(
        (status = 200, description = "Whether the caller hearted the blog", body = InteractionState),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn interaction_state(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::User);
    let state = InteractionService::new(data.repo.as_ref()).state(auth.user_id(), &path).await?;
    Ok(HttpResponse::Ok().json(state))
}

#[utoipa::path(
    post,
    path = "/api/interaction/blog/{blog_id}/heart",
    tag = "interactions",
    params(("blog_id" = String, Path, description = "Blog id")),
    responses(
        (status = 201, description = "Heart recorded", body = crate::interaction::HeartChange),
        (status = 200, description = "Already hearted, nothing changed", body = crate::interaction::HeartChange),
        (status = 404, description = "Blog not found", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn add_heart(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let change = InteractionService::new(data.repo.as_ref()).record_heart(auth.user_id(), &path).await?;
    if change.changed {
        Ok(HttpResponse::Created().json(change))
    } else {
        Ok(HttpResponse::Ok().json(change))
    }
}

#[utoipa::path(
    delete,
    path = "/api/interaction/blog/{blog_id}/heart",
    tag = "interactions",
    params(("blog_id" = String, Path, description = "Blog id")),
    responses(
        (status = 200, description = "Heart removed (or was absent)", body = crate::interaction::HeartChange),
        (status = 404, description = "Blog not found", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn remove_heart(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let change = InteractionService::new(data.repo.as_ref()).remove_heart(auth.user_id(), &path).await?;
    Ok(HttpResponse::Ok().json(change))
}

// -------------------------------------------------------- notifications

#[utoipa::path(
    post,
    path = "/api/notification",
    tag = "notifications",
    request_body = NewNotification,
    responses(
        (status = 201, description = "Notification stored and pushed when the recipient is online", body = Notification),
        (status = 400, description = "Validation failed", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn create_notification(
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewNotification>,
) -> Result<HttpResponse, ApiError> {
    let n = NotificationService::new(data.repo.as_ref(), &data.hub).create(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(n))
}

#[utoipa::path(
    get,
    path = "/api/notification",
    tag = "notifications",
    params(ListParams),
    responses((status = 200, description = "Caller's notifications, newest first", body = crate::notification::NotificationList)),
    security(("bearer" = []))
)]
pub async fn list_notifications(
    auth: Auth,
    data: web::Data<AppState>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    let list = NotificationService::new(data.repo.as_ref(), &data.hub).list(auth.user_id(), &params).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[utoipa::path(
    patch,
    path = "/api/notification/{id}/read",
    tag = "notifications",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = crate::notification::MarkedRead),
        (status = 403, description = "Caller is not the recipient", body = crate::error::ApiErrorBody),
        (status = 404, description = "Notification not found", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn mark_notification_read(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let marked = NotificationService::new(data.repo.as_ref(), &data.hub).mark_read(auth.user_id(), &path).await?;
    Ok(HttpResponse::Ok().json(marked))
}

// ---------------------------------------------------------------- users

#[utoipa::path(
    get,
    path = "/api/user",
    tag = "users",
    responses(
        (status = 200, description = "Caller's profile", body = User),
        (status = 404, description = "No account for this identity", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn get_profile(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = UserService::new(data.repo.as_ref()).get(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    put,
    path = "/api/user",
    tag = "users",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Validation failed", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn update_profile(auth: Auth, data: web::Data<AppState>, payload: web::Json<UpdateProfile>) -> Result<HttpResponse, ApiError> {
    let user = UserService::new(data.repo.as_ref()).update_profile(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    post,
    path = "/api/user/file",
    tag = "files",
    request_body(content = crate::file::UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = File),
        (status = 400, description = "Missing, oversized or unsupported file", body = crate::error::ApiErrorBody),
        (status = 500, description = "Object storage failure", body = crate::error::ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn upload_file(_auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let upload = read_upload(payload).await?;
    let file = FileService::new(data.repo.as_ref(), data.object_store.as_ref()).upload(upload).await?;
    Ok(HttpResponse::Created().json(file))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FileLookup {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileIds {
    pub ids: Vec<Id>,
}

#[utoipa::path(
    post,
    path = "/api/user/file/ids",
    tag = "files",
    request_body = FileLookup,
    responses((status = 200, description = "Ids of registered files with these URLs", body = FileIds)),
    security(("bearer" = []))
)]
pub async fn file_ids(_auth: Auth, data: web::Data<AppState>, payload: web::Json<FileLookup>) -> Result<HttpResponse, ApiError> {
    let ids = FileService::new(data.repo.as_ref(), data.object_store.as_ref()).ids_for_urls(&payload.urls).await?;
    Ok(HttpResponse::Ok().json(FileIds { ids }))
}

// ------------------------------------------------------------- sessions

#[utoipa::path(
    post,
    path = "/api/auth/session",
    tag = "auth",
    responses((status = 201, description = "Refresh token issued for the caller", body = crate::session::TokenPair)),
    security(("bearer" = []))
)]
pub async fn open_session(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let pair = SessionService::new(data.repo.as_ref()).issue(auth.user_id(), auth.roles()).await?;
    Ok(HttpResponse::Created().json(pair))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair; the presented token is revoked", body = crate::session::TokenPair),
        (status = 401, description = "Unknown, revoked or expired refresh token", body = crate::error::ApiErrorBody)
    )
)]
pub async fn refresh_session(data: web::Data<AppState>, payload: web::Json<RefreshRequest>) -> Result<HttpResponse, ApiError> {
    let pair = SessionService::new(data.repo.as_ref()).rotate(&payload.refresh_token).await?;
    Ok(HttpResponse::Ok().json(pair))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    request_body = RefreshRequest,
    responses((status = 204, description = "Refresh token revoked"))
)]
pub async fn logout(data: web::Data<AppState>, payload: web::Json<RefreshRequest>) -> Result<HttpResponse, ApiError> {
    SessionService::new(data.repo.as_ref()).revoke(&payload.refresh_token).await?;
    Ok(HttpResponse::NoContent().finish())
}
