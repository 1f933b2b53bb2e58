use std::borrow::Cow;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::RoleSet;

pub type Id = Uuid;

/// Current time truncated to milliseconds, the precision feed cursors carry.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// ---------------------------------------------------------------- users

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
    Phone,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
            Provider::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google" => Some(Provider::Google),
            "facebook" => Some(Provider::Facebook),
            "phone" => Some(Provider::Phone),
            _ => None,
        }
    }
}

/// Account as exposed to clients. Password material stays in the store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub provider: Provider,
    pub provider_id: Option<String>,
    pub phone: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub image: Option<String>,
    #[schema(value_type = Vec<crate::auth::Role>)]
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account creation input. Exactly one credential family is required,
/// chosen by `provider`.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_credentials"))]
pub struct NewUser {
    pub provider: Provider,
    pub provider_id: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_http_url"))]
    pub image: Option<String>,
    #[serde(default)]
    #[schema(value_type = Vec<crate::auth::Role>)]
    pub roles: Option<RoleSet>,
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut e = ValidationError::new(code);
    e.message = Some(Cow::Borrowed(message));
    e
}

fn present(v: &Option<String>) -> bool {
    v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

/// `0` then one of `3 5 7 8 9` then eight digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let b = phone.as_bytes();
    b.len() == 10
        && b[0] == b'0'
        && matches!(b[1], b'3' | b'5' | b'7' | b'8' | b'9')
        && b.iter().all(|c| c.is_ascii_digit())
}

fn validate_credentials(u: &NewUser) -> Result<(), ValidationError> {
    match u.provider {
        Provider::Phone => {
            if !present(&u.phone) || !present(&u.password_hash) {
                return Err(validation_error("credentials", "phone and password are required for phone accounts"));
            }
            if !u.phone.as_deref().map(is_valid_phone).unwrap_or(false) {
                return Err(validation_error("phone", "Please provide a valid phone number (0xxxxxxxxx)"));
            }
        }
        Provider::Google | Provider::Facebook => {
            if !present(&u.provider_id) || !present(&u.email) {
                return Err(validation_error("credentials", "providerId and email are required for social accounts"));
            }
        }
    }
    Ok(())
}

fn validate_http_url(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(validation_error("url", "Please provide a valid URL for the image"))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_http_url"))]
    pub image: Option<String>,
}

// ---------------------------------------------------------------- blogs

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlogStatus {
    Pending,
    Active,
    #[default]
    Inactive,
}

impl BlogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlogStatus::Pending => "PENDING",
            BlogStatus::Active => "ACTIVE",
            BlogStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => BlogStatus::Pending,
            "ACTIVE" => BlogStatus::Active,
            _ => BlogStatus::Inactive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub image: String,
    pub published: bool,
    pub status: BlogStatus,
    pub heart_count: i64,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewBlog {
    #[validate(length(min = 5, max = 100, message = "title must be 5-100 characters"))]
    pub title: String,
    #[validate(length(min = 10, max = 1000, message = "content must be 10-1000 characters"))]
    pub content: String,
    #[validate(url(message = "image must be a valid URL"))]
    pub image: String,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateBlog {
    #[validate(length(min = 5, max = 100, message = "title must be 5-100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 10, max = 1000, message = "content must be 10-1000 characters"))]
    pub content: Option<String>,
    #[validate(url(message = "image must be a valid URL"))]
    pub image: Option<String>,
    pub published: Option<bool>,
}

impl UpdateBlog {
    pub fn apply(self, blog: &mut Blog) {
        if let Some(title) = self.title { blog.title = title; }
        if let Some(content) = self.content { blog.content = content; }
        if let Some(image) = self.image { blog.image = image; }
        if let Some(published) = self.published { blog.published = published; }
    }
}

// ---------------------------------------------------------- interactions

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum InteractionType {
    Heart,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Heart => "HEART",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub user_id: Id,
    pub blog_id: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct InteractionState {
    pub hearted: bool,
}

// --------------------------------------------------------- notifications

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Id,
    pub title: String,
    pub content: Option<String>,
    pub user_id: Id,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "content must be at most 2000 characters"))]
    pub content: Option<String>,
    pub user_id: Id,
}

// ----------------------------------------------------------------- files

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: Id,
    pub public_id: String,
    pub url: String,
    pub ref_id: Option<String>,
    pub ref_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub public_id: String,
    pub url: String,
    pub ref_id: Option<String>,
    pub ref_type: Option<String>,
}

// -------------------------------------------------------- refresh tokens

/// Stored refresh token; `token_hash` is the SHA-256 hex of the opaque value.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Id,
    pub user_id: Id,
    /// Roles carried into access tokens minted from this session.
    pub roles: RoleSet,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}
