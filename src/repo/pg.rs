//! Postgres backend. Schema lives in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::*;
use crate::auth::{Role, RoleSet};

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
}

fn db_err(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
        _ => RepoError::Internal(e.to_string()),
    }
}

fn roles_from_db(names: &[String]) -> RoleSet {
    names
        .iter()
        .filter_map(|n| match n.as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            "artist" => Some(Role::Artist),
            _ => None,
        })
        .collect()
}

fn roles_to_db(roles: RoleSet) -> Vec<String> {
    roles
        .iter()
        .map(|r| match r {
            Role::User => "user".to_string(),
            Role::Admin => "admin".to_string(),
            Role::Artist => "artist".to_string(),
        })
        .collect()
}

/// Escape LIKE metacharacters so user text matches literally.
fn like_pattern(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

// ---------------------------------------------------------------- rows

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    provider: String,
    provider_id: Option<String>,
    phone: Option<String>,
    name: String,
    email: Option<String>,
    image: Option<String>,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepoError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let provider = Provider::parse(&r.provider)
            .ok_or_else(|| RepoError::Internal(format!("unknown provider '{}'", r.provider)))?;
        Ok(User {
            id: r.id,
            provider,
            provider_id: r.provider_id,
            phone: r.phone,
            name: r.name,
            email: r.email,
            image: r.image,
            roles: roles_from_db(&r.roles),
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const USER_COLS: &str = "id, provider, provider_id, phone, name, email, image, roles, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BlogRow {
    id: Uuid,
    title: String,
    content: String,
    image: String,
    published: bool,
    status: String,
    heart_count: i64,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BlogRow> for Blog {
    fn from(r: BlogRow) -> Self {
        Blog {
            id: r.id,
            title: r.title,
            content: r.content,
            image: r.image,
            published: r.published,
            status: BlogStatus::parse(&r.status),
            heart_count: r.heart_count,
            user_id: r.user_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const BLOG_COLS: &str = "id, title, content, image, published, status, heart_count, user_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct InteractionRow {
    id: Uuid,
    user_id: Uuid,
    blog_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<InteractionRow> for Interaction {
    fn from(r: InteractionRow) -> Self {
        Interaction { id: r.id, kind: InteractionType::Heart, user_id: r.user_id, blog_id: r.blog_id, created_at: r.created_at }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    title: String,
    content: Option<String>,
    user_id: Uuid,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(r: NotificationRow) -> Self {
        Notification { id: r.id, title: r.title, content: r.content, user_id: r.user_id, is_read: r.is_read, created_at: r.created_at }
    }
}

const NOTIFICATION_COLS: &str = "id, title, content, user_id, is_read, created_at";

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    public_id: String,
    url: String,
    ref_id: Option<String>,
    ref_type: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    roles: Vec<String>,
    token_hash: String,
    expires_at: DateTime<Utc>,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(r: RefreshTokenRow) -> Self {
        RefreshToken { id: r.id, user_id: r.user_id, roles: roles_from_db(&r.roles), token_hash: r.token_hash, expires_at: r.expires_at, revoked: r.revoked, created_at: r.created_at }
    }
}

const TOKEN_COLS: &str = "id, user_id, roles, token_hash, expires_at, revoked, created_at";

// --------------------------------------------------------------- impls

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let now = now_millis();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, provider, provider_id, phone, password_hash, name, email, image, roles, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$10) RETURNING {USER_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.provider.as_str())
        .bind(&new.provider_id)
        .bind(&new.phone)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.image)
        .bind(roles_to_db(default_roles(new.roles)))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.try_into()
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .try_into()
    }

    async fn update_user(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET name = COALESCE($2, name), image = COALESCE($3, image), updated_at = $4
             WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(upd.name.as_ref())
        .bind(upd.image.as_ref())
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?
        .try_into()
    }
}

#[async_trait]
impl BlogRepo for PgRepo {
    async fn list_blogs(&self) -> RepoResult<Vec<Blog>> {
        let rows = sqlx::query_as::<_, BlogRow>(&format!("SELECT {BLOG_COLS} FROM blogs ORDER BY created_at, id"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Blog::from).collect())
    }

    async fn get_blog(&self, id: Id) -> RepoResult<Blog> {
        let row = sqlx::query_as::<_, BlogRow>(&format!("SELECT {BLOG_COLS} FROM blogs WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }

    async fn create_blog(&self, author: Id, new: NewBlog) -> RepoResult<Blog> {
        let now = now_millis();
        let row = sqlx::query_as::<_, BlogRow>(&format!(
            "INSERT INTO blogs (id, title, content, image, published, status, heart_count, user_id, created_at, updated_at)
             VALUES ($1,$2,$3,$4,FALSE,$5,0,$6,$7,$7) RETURNING {BLOG_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.image)
        .bind(BlogStatus::default().as_str())
        .bind(author)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn update_blog(&self, id: Id, upd: UpdateBlog) -> RepoResult<Blog> {
        let row = sqlx::query_as::<_, BlogRow>(&format!(
            "UPDATE blogs SET title = COALESCE($2, title), content = COALESCE($3, content),
                image = COALESCE($4, image), published = COALESCE($5, published), updated_at = $6
             WHERE id = $1 RETURNING {BLOG_COLS}"
        ))
        .bind(id)
        .bind(upd.title.as_ref())
        .bind(upd.content.as_ref())
        .bind(upd.image.as_ref())
        .bind(upd.published)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn delete_blog(&self, id: Id) -> RepoResult<()> {
        // interactions go with the blog via ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM blogs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn last_edited_blog(&self, author: Id) -> RepoResult<Blog> {
        let row = sqlx::query_as::<_, BlogRow>(&format!(
            "SELECT {BLOG_COLS} FROM blogs WHERE user_id = $1 ORDER BY updated_at DESC, id DESC LIMIT 1"
        ))
        .bind(author)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn list_published(&self, filter: &FeedFilter) -> RepoResult<Vec<Blog>> {
        let rows = sqlx::query_as::<_, BlogRow>(&format!(
            r"SELECT {BLOG_COLS} FROM blogs
              WHERE published = TRUE
                AND ($1::text IS NULL OR title ILIKE $1 ESCAPE '\')
                AND ($2::timestamptz IS NULL OR updated_at < $2 OR (updated_at = $2 AND id < $3))
              ORDER BY updated_at DESC, id DESC
              LIMIT $4"
        ))
        .bind(filter.text.as_deref().map(like_pattern))
        .bind(filter.after.map(|c| c.updated_at()))
        .bind(filter.after.map(|c| c.id))
        .bind(filter.fetch.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Blog::from).collect())
    }

    async fn count_published(&self, text: Option<&str>) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r"SELECT COUNT(*) FROM blogs WHERE published = TRUE AND ($1::text IS NULL OR title ILIKE $1 ESCAPE '\')",
        )
        .bind(text.map(like_pattern))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[async_trait]
impl InteractionRepo for PgRepo {
    async fn add_heart(&self, user: Id, blog: Id) -> RepoResult<(Interaction, bool)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        // lock the blog row so the counter follows the interaction rows
        sqlx::query("SELECT id FROM blogs WHERE id = $1 FOR UPDATE")
            .bind(blog)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let inserted = sqlx::query_as::<_, InteractionRow>(
            "INSERT INTO interactions (id, type, user_id, blog_id, created_at) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id, blog_id, type) DO NOTHING
             RETURNING id, user_id, blog_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(InteractionType::Heart.as_str())
        .bind(user)
        .bind(blog)
        .bind(now_millis())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let result = match inserted {
            Some(row) => {
                sqlx::query("UPDATE blogs SET heart_count = heart_count + 1 WHERE id = $1")
                    .bind(blog)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                (row.into(), true)
            }
            None => {
                let row = sqlx::query_as::<_, InteractionRow>(
                    "SELECT id, user_id, blog_id, created_at FROM interactions WHERE user_id = $1 AND blog_id = $2 AND type = $3",
                )
                .bind(user)
                .bind(blog)
                .bind(InteractionType::Heart.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
                (row.into(), false)
            }
        };
        tx.commit().await.map_err(db_err)?;
        Ok(result)
    }

    async fn remove_heart(&self, user: Id, blog: Id) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let removed = sqlx::query("DELETE FROM interactions WHERE user_id = $1 AND blog_id = $2 AND type = $3")
            .bind(user)
            .bind(blog)
            .bind(InteractionType::Heart.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        if removed > 0 {
            sqlx::query("UPDATE blogs SET heart_count = GREATEST(heart_count - 1, 0) WHERE id = $1")
                .bind(blog)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(removed > 0)
    }

    async fn has_heart(&self, user: Id, blog: Id) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM interactions WHERE user_id = $1 AND blog_id = $2 AND type = $3)",
        )
        .bind(user)
        .bind(blog)
        .bind(InteractionType::Heart.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[async_trait]
impl NotificationRepo for PgRepo {
    async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (id, title, content, user_id, is_read, created_at)
             VALUES ($1,$2,$3,$4,FALSE,$5) RETURNING {NOTIFICATION_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.user_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn get_notification(&self, id: Id) -> RepoResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!("SELECT {NOTIFICATION_COLS} FROM notifications WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }

    async fn list_notifications(&self, user: Id, skip: Option<i64>, take: Option<i64>) -> RepoResult<(Vec<Notification>, i64)> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLS} FROM notifications WHERE user_id = $1
             ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3"
        ))
        .bind(user)
        .bind(skip.unwrap_or(0).max(0))
        .bind(take)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
            .bind(user)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok((rows.into_iter().map(Notification::from).collect(), total))
    }

    async fn mark_notification_read(&self, id: Id) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND is_read = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() == 1)
    }
}

#[async_trait]
impl FileRepo for PgRepo {
    async fn create_file(&self, new: NewFile) -> RepoResult<File> {
        let row = sqlx::query_as::<_, FileRow>(
            "INSERT INTO files (id, public_id, url, ref_id, ref_type, created_at) VALUES ($1,$2,$3,$4,$5,$6)
             RETURNING id, public_id, url, ref_id, ref_type, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&new.public_id)
        .bind(&new.url)
        .bind(&new.ref_id)
        .bind(&new.ref_type)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(File { id: row.id, public_id: row.public_id, url: row.url, ref_id: row.ref_id, ref_type: row.ref_type, created_at: row.created_at })
    }

    async fn file_ids_for_urls(&self, urls: &[String]) -> RepoResult<Vec<Id>> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM files WHERE url = ANY($1)")
            .bind(urls)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl RefreshTokenRepo for PgRepo {
    async fn create_refresh_token(&self, user: Id, roles: RoleSet, token_hash: &str, expires_at: DateTime<Utc>) -> RepoResult<RefreshToken> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "INSERT INTO refresh_tokens (id, user_id, roles, token_hash, expires_at, revoked, created_at)
             VALUES ($1,$2,$3,$4,$5,FALSE,$6) RETURNING {TOKEN_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(roles_to_db(roles))
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> RepoResult<RefreshToken> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!("SELECT {TOKEN_COLS} FROM refresh_tokens WHERE token_hash = $1"))
            .bind(token_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE token_hash = $1 AND revoked = FALSE")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() == 1)
    }

    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }
}
