use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation, decode};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    entity::sessions::{Column as SessionCol, Entity as Sessions},
    error::AppError,
    models::Role,
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub session_id: Uuid,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn ensure_role(user: &AuthUser, role: Role) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::Admin)
}

/// Gate for the member area; admins pass too.
pub fn ensure_member(user: &AuthUser) -> Result<(), AppError> {
    if !user.role.is_member() {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
    Ok(decoded.claims)
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?
        .trim();
    Ok(Some(token))
}

async fn authenticate(token: &str, state: &AppState) -> Result<AuthUser, AppError> {
    let claims = decode_claims(token, &state.config.jwt_secret)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;
    let session_id = Uuid::parse_str(&claims.sid)
        .map_err(|_| AppError::Unauthorized("Invalid session in token".into()))?;
    let role = claims
        .role
        .parse::<Role>()
        .map_err(|_| AppError::Unauthorized("Invalid role in token".into()))?;

    let live = Sessions::find()
        .filter(
            Condition::all()
                .add(SessionCol::Id.eq(session_id))
                .add(SessionCol::UserId.eq(user_id))
                .add(SessionCol::RevokedAt.is_null())
                .add(SessionCol::ExpiresAt.gt(Utc::now())),
        )
        .one(&state.orm)
        .await?;
    if live.is_none() {
        return Err(AppError::Unauthorized("Session expired or revoked".into()));
    }

    Ok(AuthUser {
        user_id,
        role,
        session_id,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
        authenticate(token, state).await
    }
}

/// Lets public endpoints accept an optional caller. A present but invalid
/// token is still rejected.
impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => authenticate(token, state).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn admin_guard_only_admits_admins() {
        assert!(ensure_admin(&user(Role::Admin)).is_ok());
        assert!(matches!(
            ensure_admin(&user(Role::Member)),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn member_guard_admits_members_and_admins() {
        assert!(ensure_member(&user(Role::Member)).is_ok());
        assert!(ensure_member(&user(Role::Admin)).is_ok());
        assert!(ensure_member(&user(Role::User)).is_err());
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        use jsonwebtoken::{EncodingKey, Header, encode};
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: "admin".into(),
            sid: Uuid::new_v4().to_string(),
            iat: Utc::now().timestamp() as usize,
            exp: (Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"one"),
        )
        .unwrap();
        assert!(decode_claims(&token, "one").is_ok());
        assert!(matches!(
            decode_claims(&token, "two"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
