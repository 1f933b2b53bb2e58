use actix_web::{dev::Payload, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::future::{ready, Ready};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;

/// Access tokens live for a day; refresh tokens carry sessions beyond that.
pub const ACCESS_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Artist,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Admin, Role::Artist];

    fn bit(self) -> u8 {
        match self {
            Role::User => 0b001,
            Role::Admin => 0b010,
            Role::Artist => 0b100,
        }
    }
}

/// Fixed-size set of roles. Serialised as a JSON array of role names.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet(u8);

impl RoleSet {
    pub const fn empty() -> Self {
        RoleSet(0)
    }

    pub fn only(role: Role) -> Self {
        RoleSet(role.bit())
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn intersects(&self, other: RoleSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::empty();
        for r in iter {
            set.insert(r);
        }
        set
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(v: Vec<Role>) -> Self {
        v.into_iter().collect()
    }
}

impl From<RoleSet> for Vec<Role> {
    fn from(set: RoleSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub roles: RoleSet,
}

fn jwt_secret() -> Result<String, ApiError> {
    env::var("JWT_SECRET").map_err(|_| {
        tracing::error!("JWT_SECRET not set");
        ApiError::unauthorized("Invalid token")
    })
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, ApiError> {
    let secret = jwt_secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| {
            tracing::debug!(error = %e, "rejecting bearer token");
            ApiError::unauthorized("Invalid token")
        })?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`. Rejects with 401 before the handler
/// body (and therefore any datastore access) runs.
#[derive(Debug, Clone)]
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Uuid {
        self.0.sub
    }

    pub fn roles(&self) -> RoleSet {
        self.0.roles
    }

    pub fn is_admin(&self) -> bool {
        self.0.roles.contains(Role::Admin)
    }

    /// Fails with `Forbidden` unless the caller holds one of `required`.
    /// An empty requirement admits every authenticated caller.
    pub fn require_any(&self, required: RoleSet) -> Result<(), ApiError> {
        if required.is_empty() || self.0.roles.intersects(required) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Insufficient permissions"))
        }
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        // Delegate to BearerAuth to parse the header.
        let bearer = match BearerAuth::from_request(req, pl).into_inner() {
            Ok(b) => b,
            Err(_) => return ready(Err(ApiError::unauthorized("Authorization header missing"))),
        };
        if bearer.token().trim().is_empty() {
            return ready(Err(ApiError::unauthorized("Token missing")));
        }
        ready(decode_jwt(bearer.token()).and_then(|claims| {
            if claims.sub.is_nil() {
                return Err(ApiError::unauthorized("Invalid userId in token"));
            }
            tracing::debug!(user_id = %claims.sub, roles = ?claims.roles, "authenticated");
            Ok(Auth(claims))
        }))
    }
}

/// Role guard for handlers: `require_role!(auth, Role::User, Role::Admin);`
/// returns `Forbidden` from the enclosing function when none match.
#[macro_export]
macro_rules! require_role {
    ($auth:expr $(, $role:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut required = $crate::auth::RoleSet::empty();
        $(required.insert($role);)*
        $auth.require_any(required)?
    }};
}

/// Create an access token for a user.
pub fn create_jwt(user_id: Uuid, roles: RoleSet) -> Result<String, ApiError> {
    let secret = jwt_secret()?;
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(ACCESS_TOKEN_TTL_HOURS)).timestamp() as usize;
    let claims = Claims { sub: user_id, exp: expiration, roles };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).map_err(|e| {
        tracing::error!(error = %e, "failed to sign access token");
        ApiError::Internal { message: "Could not issue token".into(), code: crate::error::ErrorCode::InternalServerError }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_set_membership() {
        let set: RoleSet = [Role::User, Role::Artist].into_iter().collect();
        assert!(set.contains(Role::User));
        assert!(!set.contains(Role::Admin));
        assert!(set.intersects(RoleSet::only(Role::Artist)));
        assert!(!set.intersects(RoleSet::only(Role::Admin)));
    }

    #[test]
    fn role_set_serializes_as_names() {
        let set: RoleSet = [Role::Admin, Role::User].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["user","admin"]"#);
        let back: RoleSet = serde_json::from_str(r#"["artist","artist"]"#).unwrap();
        assert_eq!(back, RoleSet::only(Role::Artist));
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(serde_json::from_str::<RoleSet>(r#"["root"]"#).is_err());
    }

    #[test]
    fn empty_requirement_admits_everyone() {
        let auth = Auth(Claims { sub: Uuid::new_v4(), exp: usize::MAX, roles: RoleSet::empty() });
        assert!(auth.require_any(RoleSet::empty()).is_ok());
        assert!(auth.require_any(RoleSet::only(Role::User)).is_err());
    }
}
