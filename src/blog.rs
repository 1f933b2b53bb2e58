use validator::Validate;

use crate::auth::Auth;
use crate::error::{ApiError, ErrorCode};
use crate::feed::{assemble_page, BlogFeed, FeedFilter, FeedParams};
use crate::models::{Blog, Id, NewBlog, UpdateBlog};
use crate::repo::{Repo, RepoError};

/// Parse a path segment as a blog id.
pub fn parse_blog_id(raw: &str) -> Result<Id, ApiError> {
    Id::parse_str(raw.trim()).map_err(|_| ApiError::bad_request("Invalid blog id", ErrorCode::InvalidBlogId))
}

fn store_failure(op: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::not_found("Blog not found", ErrorCode::BlogNotFound),
        RepoError::Internal(msg) => {
            tracing::error!(op, error = %msg, "blog store failure");
            ApiError::database(format!("Failed to {op}"))
        }
        other => other.into(),
    }
}

pub struct BlogService<'a> {
    repo: &'a dyn Repo,
}

impl<'a> BlogService<'a> {
    pub fn new(repo: &'a dyn Repo) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<Blog>, ApiError> {
        self.repo.list_blogs().await.map_err(store_failure("list blogs"))
    }

    pub async fn get(&self, raw_id: &str) -> Result<Blog, ApiError> {
        let id = parse_blog_id(raw_id)?;
        self.repo.get_blog(id).await.map_err(store_failure("load blog"))
    }

    /// New blogs start unpublished and owned by `author`.
    pub async fn create(&self, author: Id, payload: NewBlog) -> Result<Blog, ApiError> {
        payload
            .validate()
            .map_err(|e| ApiError::validation("Invalid blog data", ErrorCode::InvalidBlogData, &e))?;
        let blog = self.repo.create_blog(author, payload).await.map_err(store_failure("create blog"))?;
        tracing::info!(blog_id = %blog.id, author = %author, "blog created");
        Ok(blog)
    }

    pub async fn update(&self, raw_id: &str, actor: &Auth, payload: UpdateBlog) -> Result<Blog, ApiError> {
        let id = parse_blog_id(raw_id)?;
        payload
            .validate()
            .map_err(|e| ApiError::validation("Invalid blog data", ErrorCode::InvalidBlogData, &e))?;
        self.authorize(id, actor).await?;
        self.repo.update_blog(id, payload).await.map_err(store_failure("update blog"))
    }

    pub async fn delete(&self, raw_id: &str, actor: &Auth) -> Result<(), ApiError> {
        let id = parse_blog_id(raw_id)?;
        self.authorize(id, actor).await?;
        self.repo.delete_blog(id).await.map_err(store_failure("delete blog"))?;
        tracing::info!(blog_id = %id, actor = %actor.user_id(), "blog deleted");
        Ok(())
    }

    pub async fn last_edited(&self, author: Id) -> Result<Blog, ApiError> {
        self.repo.last_edited_blog(author).await.map_err(store_failure("load last edited blog"))
    }

    /// One page of the published feed plus the unpaged total.
    pub async fn feed(&self, params: &FeedParams) -> Result<BlogFeed, ApiError> {
        let after = params
            .cursor()
            .map_err(|_| ApiError::bad_request("Invalid cursor", ErrorCode::InvalidCursor))?;
        let limit = params.limit();
        let filter = FeedFilter { text: params.text(), after, fetch: limit + 1 };
        let rows = self.repo.list_published(&filter).await.map_err(store_failure("load feed"))?;
        let total = self
            .repo
            .count_published(filter.text.as_deref())
            .await
            .map_err(store_failure("count feed"))?;
        Ok(assemble_page(rows, limit, total))
    }

    /// Owner or admin may mutate.
    async fn authorize(&self, id: Id, actor: &Auth) -> Result<Blog, ApiError> {
        let blog = self.repo.get_blog(id).await.map_err(store_failure("load blog"))?;
        if blog.user_id != actor.user_id() && !actor.is_admin() {
            tracing::debug!(blog_id = %id, actor = %actor.user_id(), "mutation refused, not owner");
            return Err(ApiError::forbidden("You are not allowed to modify this blog"));
        }
        Ok(blog)
    }
}
