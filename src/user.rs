use validator::Validate;

use crate::error::{ApiError, ErrorCode};
use crate::models::{Id, NewUser, UpdateProfile, User};
use crate::repo::{Repo, RepoError};

fn store_failure(op: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::not_found("User not found", ErrorCode::UserNotFound),
        RepoError::Conflict => ApiError::bad_request("User already exists", ErrorCode::Conflict),
        RepoError::Internal(msg) => {
            tracing::error!(op, error = %msg, "user store failure");
            ApiError::database(format!("Failed to {op}"))
        }
    }
}

pub struct UserService<'a> {
    repo: &'a dyn Repo,
}

impl<'a> UserService<'a> {
    pub fn new(repo: &'a dyn Repo) -> Self {
        Self { repo }
    }

    /// Social accounts need `providerId` and `email`; phone accounts need a
    /// phone number and a password hash.
    pub async fn create(&self, payload: NewUser) -> Result<User, ApiError> {
        payload
            .validate()
            .map_err(|e| ApiError::validation("Invalid user data", ErrorCode::InvalidUserData, &e))?;
        let user = self.repo.create_user(payload).await.map_err(store_failure("create user"))?;
        tracing::info!(user_id = %user.id, provider = user.provider.as_str(), "user created");
        Ok(user)
    }

    pub async fn get(&self, id: Id) -> Result<User, ApiError> {
        self.repo.get_user(id).await.map_err(store_failure("load user"))
    }

    pub async fn update_profile(&self, id: Id, payload: UpdateProfile) -> Result<User, ApiError> {
        payload
            .validate()
            .map_err(|e| ApiError::validation("Invalid user data", ErrorCode::InvalidUserData, &e))?;
        self.repo.update_user(id, payload).await.map_err(store_failure("update user"))
    }
}
