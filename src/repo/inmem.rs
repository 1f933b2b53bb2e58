//! Lock-guarded in-memory backend, used for local runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::*;
use crate::feed::{feed_order, title_matches};

#[derive(Default)]
struct State {
    users: HashMap<Id, User>,
    password_hashes: HashMap<Id, String>,
    blogs: HashMap<Id, Blog>,
    // one heart per (user, blog)
    hearts: HashMap<(Id, Id), Interaction>,
    notifications: HashMap<Id, Notification>,
    files: HashMap<Id, File>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the store were unreachable.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> RepoResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::Internal("store unavailable".into()));
        }
        Ok(())
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.check()?;
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.check()?;
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut s = self.write()?;
        let clash = s.users.values().any(|u| {
            (new.provider_id.is_some() && u.provider_id == new.provider_id)
                || (new.phone.is_some() && u.phone == new.phone)
                || (new.email.is_some() && u.email == new.email)
        });
        if clash {
            return Err(RepoError::Conflict);
        }
        let now = now_millis();
        let user = User {
            id: Uuid::new_v4(),
            provider: new.provider,
            provider_id: new.provider_id,
            phone: new.phone,
            name: new.name,
            email: new.email,
            image: new.image,
            roles: default_roles(new.roles),
            created_at: now,
            updated_at: now,
        };
        if let Some(hash) = new.password_hash {
            s.password_hashes.insert(user.id, hash);
        }
        s.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn update_user(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let mut s = self.write()?;
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = upd.name { user.name = name; }
        if let Some(image) = upd.image { user.image = Some(image); }
        user.updated_at = now_millis();
        Ok(user.clone())
    }
}

#[async_trait]
impl BlogRepo for InMemRepo {
    async fn list_blogs(&self) -> RepoResult<Vec<Blog>> {
        let s = self.read()?;
        let mut v: Vec<Blog> = s.blogs.values().cloned().collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn get_blog(&self, id: Id) -> RepoResult<Blog> {
        self.read()?.blogs.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_blog(&self, author: Id, new: NewBlog) -> RepoResult<Blog> {
        let mut s = self.write()?;
        let now = now_millis();
        let blog = Blog {
            id: Uuid::new_v4(),
            title: new.title,
            content: new.content,
            image: new.image,
            published: false,
            status: BlogStatus::default(),
            heart_count: 0,
            user_id: author,
            created_at: now,
            updated_at: now,
        };
        s.blogs.insert(blog.id, blog.clone());
        Ok(blog)
    }

    async fn update_blog(&self, id: Id, upd: UpdateBlog) -> RepoResult<Blog> {
        let mut s = self.write()?;
        let blog = s.blogs.get_mut(&id).ok_or(RepoError::NotFound)?;
        upd.apply(blog);
        blog.updated_at = now_millis();
        Ok(blog.clone())
    }

    async fn delete_blog(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        s.blogs.remove(&id).ok_or(RepoError::NotFound)?;
        s.hearts.retain(|(_, blog), _| *blog != id);
        Ok(())
    }

    async fn last_edited_blog(&self, author: Id) -> RepoResult<Blog> {
        let s = self.read()?;
        s.blogs
            .values()
            .filter(|b| b.user_id == author)
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn list_published(&self, filter: &FeedFilter) -> RepoResult<Vec<Blog>> {
        let s = self.read()?;
        let mut v: Vec<Blog> = s
            .blogs
            .values()
            .filter(|b| b.published)
            .filter(|b| title_matches(b, filter.text.as_deref()))
            .filter(|b| filter.after.map(|c| c.admits(b)).unwrap_or(true))
            .cloned()
            .collect();
        v.sort_by(feed_order);
        v.truncate(filter.fetch.max(0) as usize);
        Ok(v)
    }

    async fn count_published(&self, text: Option<&str>) -> RepoResult<i64> {
        let s = self.read()?;
        Ok(s.blogs.values().filter(|b| b.published && title_matches(b, text)).count() as i64)
    }
}

#[async_trait]
impl InteractionRepo for InMemRepo {
    async fn add_heart(&self, user: Id, blog: Id) -> RepoResult<(Interaction, bool)> {
        let mut s = self.write()?;
        if !s.blogs.contains_key(&blog) {
            return Err(RepoError::NotFound);
        }
        if let Some(existing) = s.hearts.get(&(user, blog)) {
            return Ok((existing.clone(), false));
        }
        let row = Interaction {
            id: Uuid::new_v4(),
            kind: InteractionType::Heart,
            user_id: user,
            blog_id: blog,
            created_at: now_millis(),
        };
        s.hearts.insert((user, blog), row.clone());
        if let Some(b) = s.blogs.get_mut(&blog) {
            b.heart_count += 1;
        }
        Ok((row, true))
    }

    async fn remove_heart(&self, user: Id, blog: Id) -> RepoResult<bool> {
        let mut s = self.write()?;
        if s.hearts.remove(&(user, blog)).is_none() {
            return Ok(false);
        }
        if let Some(b) = s.blogs.get_mut(&blog) {
            b.heart_count = (b.heart_count - 1).max(0);
        }
        Ok(true)
    }

    async fn has_heart(&self, user: Id, blog: Id) -> RepoResult<bool> {
        Ok(self.read()?.hearts.contains_key(&(user, blog)))
    }
}

#[async_trait]
impl NotificationRepo for InMemRepo {
    async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification> {
        let mut s = self.write()?;
        let n = Notification {
            id: Uuid::new_v4(),
            title: new.title,
            content: new.content,
            user_id: new.user_id,
            is_read: false,
            created_at: Utc::now(),
        };
        s.notifications.insert(n.id, n.clone());
        Ok(n)
    }

    async fn get_notification(&self, id: Id) -> RepoResult<Notification> {
        self.read()?.notifications.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn list_notifications(&self, user: Id, skip: Option<i64>, take: Option<i64>) -> RepoResult<(Vec<Notification>, i64)> {
        let s = self.read()?;
        let mut v: Vec<Notification> = s.notifications.values().filter(|n| n.user_id == user).cloned().collect();
        let total = v.len() as i64;
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let page = v
            .into_iter()
            .skip(skip.unwrap_or(0).max(0) as usize)
            .take(take.map(|t| t.max(0) as usize).unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    async fn mark_notification_read(&self, id: Id) -> RepoResult<bool> {
        let mut s = self.write()?;
        let n = s.notifications.get_mut(&id).ok_or(RepoError::NotFound)?;
        if n.is_read {
            return Ok(false);
        }
        n.is_read = true;
        Ok(true)
    }
}

#[async_trait]
impl FileRepo for InMemRepo {
    async fn create_file(&self, new: NewFile) -> RepoResult<File> {
        let mut s = self.write()?;
        let f = File {
            id: Uuid::new_v4(),
            public_id: new.public_id,
            url: new.url,
            ref_id: new.ref_id,
            ref_type: new.ref_type,
            created_at: Utc::now(),
        };
        s.files.insert(f.id, f.clone());
        Ok(f)
    }

    async fn file_ids_for_urls(&self, urls: &[String]) -> RepoResult<Vec<Id>> {
        let s = self.read()?;
        Ok(s.files.values().filter(|f| urls.contains(&f.url)).map(|f| f.id).collect())
    }
}

#[async_trait]
impl RefreshTokenRepo for InMemRepo {
    async fn create_refresh_token(&self, user: Id, roles: crate::auth::RoleSet, token_hash: &str, expires_at: DateTime<Utc>) -> RepoResult<RefreshToken> {
        let mut s = self.write()?;
        if s.refresh_tokens.contains_key(token_hash) {
            return Err(RepoError::Conflict);
        }
        let t = RefreshToken {
            id: Uuid::new_v4(),
            user_id: user,
            roles,
            token_hash: token_hash.to_string(),
            expires_at,
            revoked: false,
            created_at: Utc::now(),
        };
        s.refresh_tokens.insert(t.token_hash.clone(), t.clone());
        Ok(t)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> RepoResult<RefreshToken> {
        self.read()?.refresh_tokens.get(token_hash).cloned().ok_or(RepoError::NotFound)
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> RepoResult<bool> {
        let mut s = self.write()?;
        match s.refresh_tokens.get_mut(token_hash) {
            Some(t) if !t.revoked => {
                t.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut s = self.write()?;
        let before = s.refresh_tokens.len();
        s.refresh_tokens.retain(|_, t| t.expires_at > now);
        Ok((before - s.refresh_tokens.len()) as u64)
    }
}
