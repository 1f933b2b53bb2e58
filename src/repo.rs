use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::feed::FeedFilter;
use crate::models::*;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn update_user(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
}

#[async_trait]
pub trait BlogRepo: Send + Sync {
    async fn list_blogs(&self) -> RepoResult<Vec<Blog>>;
    async fn get_blog(&self, id: Id) -> RepoResult<Blog>;
    async fn create_blog(&self, author: Id, new: NewBlog) -> RepoResult<Blog>;
    /// Applies the present fields only and bumps `updated_at`.
    async fn update_blog(&self, id: Id, upd: UpdateBlog) -> RepoResult<Blog>;
    /// Removes the blog together with its interactions.
    async fn delete_blog(&self, id: Id) -> RepoResult<()>;
    async fn last_edited_blog(&self, author: Id) -> RepoResult<Blog>;
    /// Published blogs in feed order, after `filter.after`, at most `filter.fetch` rows.
    async fn list_published(&self, filter: &FeedFilter) -> RepoResult<Vec<Blog>>;
    async fn count_published(&self, text: Option<&str>) -> RepoResult<i64>;
}

#[async_trait]
pub trait InteractionRepo: Send + Sync {
    /// Returns the heart row and whether it was newly created. The blog's
    /// counter moves only when a row is created.
    async fn add_heart(&self, user: Id, blog: Id) -> RepoResult<(Interaction, bool)>;
    /// Returns whether a row was removed; the counter never drops below zero.
    async fn remove_heart(&self, user: Id, blog: Id) -> RepoResult<bool>;
    async fn has_heart(&self, user: Id, blog: Id) -> RepoResult<bool>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification>;
    async fn get_notification(&self, id: Id) -> RepoResult<Notification>;
    /// Newest first. Returns the page and the user's total count.
    async fn list_notifications(&self, user: Id, skip: Option<i64>, take: Option<i64>) -> RepoResult<(Vec<Notification>, i64)>;
    /// Returns true only for the call that flips `is_read` from false to true.
    async fn mark_notification_read(&self, id: Id) -> RepoResult<bool>;
}

#[async_trait]
pub trait FileRepo: Send + Sync {
    async fn create_file(&self, new: NewFile) -> RepoResult<File>;
    async fn file_ids_for_urls(&self, urls: &[String]) -> RepoResult<Vec<Id>>;
}

#[async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    async fn create_refresh_token(&self, user: Id, roles: crate::auth::RoleSet, token_hash: &str, expires_at: DateTime<Utc>) -> RepoResult<RefreshToken>;
    async fn find_refresh_token(&self, token_hash: &str) -> RepoResult<RefreshToken>;
    /// Returns true only for the call that revokes a live token.
    async fn revoke_refresh_token(&self, token_hash: &str) -> RepoResult<bool>;
    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> RepoResult<u64>;
}

pub trait Repo: UserRepo + BlogRepo + InteractionRepo + NotificationRepo + FileRepo + RefreshTokenRepo {}

impl<T> Repo for T where T: UserRepo + BlogRepo + InteractionRepo + NotificationRepo + FileRepo + RefreshTokenRepo {}

pub(crate) fn default_roles(roles: Option<crate::auth::RoleSet>) -> crate::auth::RoleSet {
    match roles {
        Some(r) if !r.is_empty() => r,
        _ => crate::auth::RoleSet::only(crate::auth::Role::User),
    }
}

#[cfg(feature = "inmem-store")]
pub mod inmem;

#[cfg(feature = "postgres-store")]
pub mod pg;
