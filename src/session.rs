//! Refresh-token sessions.
//!
//! Clients hold an opaque random token; only its SHA-256 digest is stored.
//! Each refresh hands out a new pair and then revokes the presented token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::auth::{create_jwt, RoleSet};
use crate::error::ApiError;
use crate::models::Id;
use crate::repo::{Repo, RepoError};

pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn invalid() -> ApiError {
    ApiError::unauthorized("Invalid refresh token")
}

fn store_failure(op: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => invalid(),
        RepoError::Internal(msg) => {
            tracing::error!(op, error = %msg, "session store failure");
            ApiError::database(format!("Failed to {op}"))
        }
        other => other.into(),
    }
}

pub struct SessionService<'a> {
    repo: &'a dyn Repo,
}

impl<'a> SessionService<'a> {
    pub fn new(repo: &'a dyn Repo) -> Self {
        Self { repo }
    }

    /// Mint an access token and a fresh refresh token for `user`.
    pub async fn issue(&self, user: Id, roles: RoleSet) -> Result<TokenPair, ApiError> {
        let access_token = create_jwt(user, roles)?;
        let refresh_token = generate_token();
        let expires_at = Utc::now() + chrono::Duration::days(REFRESH_TOKEN_TTL_DAYS);
        self.repo
            .create_refresh_token(user, roles, &hash_token(&refresh_token), expires_at)
            .await
            .map_err(store_failure("store refresh token"))?;
        Ok(TokenPair { access_token, refresh_token, refresh_expires_at: expires_at })
    }

    /// Trade a live refresh token for a new pair. The old token stops working.
    pub async fn rotate(&self, raw: &str) -> Result<TokenPair, ApiError> {
        let hash = hash_token(raw.trim());
        let stored = self.repo.find_refresh_token(&hash).await.map_err(store_failure("load refresh token"))?;
        if stored.revoked || stored.expires_at <= Utc::now() {
            tracing::debug!(user = %stored.user_id, revoked = stored.revoked, "refresh refused");
            return Err(invalid());
        }
        let pair = self.issue(stored.user_id, stored.roles).await?;
        // a concurrent rotation of the same token loses here and gives back its pair
        if !self.repo.revoke_refresh_token(&hash).await.map_err(store_failure("revoke refresh token"))? {
            self.revoke(&pair.refresh_token).await?;
            return Err(invalid());
        }
        Ok(pair)
    }

    /// Idempotent; unknown tokens are ignored.
    pub async fn revoke(&self, raw: &str) -> Result<(), ApiError> {
        self.repo
            .revoke_refresh_token(&hash_token(raw.trim()))
            .await
            .map_err(store_failure("revoke refresh token"))?;
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64, ApiError> {
        self.repo
            .purge_expired_refresh_tokens(Utc::now())
            .await
            .map_err(store_failure("purge refresh tokens"))
    }
}

/// Periodically drop expired refresh tokens.
pub fn spawn_purge_task(repo: Arc<dyn Repo>, every: Duration) {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match SessionService::new(repo.as_ref()).purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(purged = n, "expired refresh tokens removed"),
                Err(e) => tracing::warn!(error = %e, "refresh token purge failed"),
            }
        }
    });
}
