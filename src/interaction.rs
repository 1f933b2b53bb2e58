use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blog::parse_blog_id;
use crate::error::{ApiError, ErrorCode};
use crate::models::{Id, InteractionState};
use crate::repo::{Repo, RepoError};

/// Outcome of a heart add or remove, with the blog's counter afterwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeartChange {
    pub hearted: bool,
    /// False when the call left the stored rows untouched.
    pub changed: bool,
    pub heart_count: i64,
}

fn store_failure(op: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::not_found("Blog not found", ErrorCode::BlogNotFound),
        RepoError::Internal(msg) => {
            tracing::error!(op, error = %msg, "interaction store failure");
            ApiError::database(format!("Failed to {op}"))
        }
        other => other.into(),
    }
}

pub struct InteractionService<'a> {
    repo: &'a dyn Repo,
}

impl<'a> InteractionService<'a> {
    pub fn new(repo: &'a dyn Repo) -> Self {
        Self { repo }
    }

    /// Idempotent: a second heart from the same user is a no-op.
    pub async fn record_heart(&self, user: Id, raw_blog_id: &str) -> Result<HeartChange, ApiError> {
        let blog_id = parse_blog_id(raw_blog_id)?;
        let (_, created) = self.repo.add_heart(user, blog_id).await.map_err(store_failure("record heart"))?;
        let blog = self.repo.get_blog(blog_id).await.map_err(store_failure("load blog"))?;
        tracing::debug!(%user, %blog_id, created, heart_count = blog.heart_count, "heart recorded");
        Ok(HeartChange { hearted: true, changed: created, heart_count: blog.heart_count })
    }

    pub async fn remove_heart(&self, user: Id, raw_blog_id: &str) -> Result<HeartChange, ApiError> {
        let blog_id = parse_blog_id(raw_blog_id)?;
        let removed = self.repo.remove_heart(user, blog_id).await.map_err(store_failure("remove heart"))?;
        let blog = self.repo.get_blog(blog_id).await.map_err(store_failure("load blog"))?;
        Ok(HeartChange { hearted: false, changed: removed, heart_count: blog.heart_count })
    }

    pub async fn state(&self, user: Id, raw_blog_id: &str) -> Result<InteractionState, ApiError> {
        let blog_id = parse_blog_id(raw_blog_id)?;
        let hearted = self.repo.has_heart(user, blog_id).await.map_err(store_failure("load interaction state"))?;
        Ok(InteractionState { hearted })
    }
}
