use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{ChangePasswordRequest, Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::{
        profiles::{ActiveModel as ProfileActive, Entity as Profiles, Model as ProfileModel},
        sessions::{ActiveModel as SessionActive, Column as SessionCol, Entity as Sessions},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Profile, Role, UserStatus},
    response::{ApiResponse, Meta},
    services::user_service::profile_from_entity,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    Ok(email)
}

pub fn issue_token(
    config: &AppConfig,
    user_id: Uuid,
    role: Role,
    session_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> AppResult<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        sid: session_id.to_string(),
        iat: issued_at.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

/// Inserts an identity and its profile, the way sign-up does.
pub async fn create_identity<C>(
    conn: &C,
    email: String,
    password_hash: String,
    name: String,
    phone: Option<String>,
    role: Role,
) -> AppResult<ProfileModel>
where
    C: ConnectionTrait,
{
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        email: Set(email.clone()),
        password_hash: Set(password_hash),
        created_at: NotSet,
    }
    .insert(conn)
    .await?;

    let profile = ProfileActive {
        id: Set(id),
        name: Set(name),
        email: Set(email),
        phone: Set(phone),
        role: Set(role.as_str().to_string()),
        status: Set(UserStatus::Active.as_str().to_string()),
        last_login: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;

    Ok(profile)
}

pub async fn email_taken<C>(conn: &C, email: &str) -> AppResult<bool>
where
    C: ConnectionTrait,
{
    let exist = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(conn)
        .await?;
    Ok(exist.is_some())
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<Profile>> {
    let RegisterRequest {
        email,
        password,
        name,
        phone,
    } = payload;
    let email = normalize_email(&email)?;
    validate_password(&password)?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    if email_taken(&state.orm, &email).await? {
        return Err(AppError::BadRequest("Email is already taken".to_string()));
    }

    let password_hash = hash_password(&password)?;
    let txn = state.orm.begin().await?;
    let profile = create_identity(&txn, email, password_hash, name, phone, Role::User).await?;
    txn.commit().await?;

    tracing::info!(user_id = %profile.id, "user registered");
    audit::record(
        &state.pool,
        Some(profile.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": profile.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        profile_from_entity(profile)?,
        None,
    ))
}

/// Returns the profile for `user`, creating one if the identity has none yet.
pub async fn ensure_profile<C>(conn: &C, user: &UserModel) -> AppResult<ProfileModel>
where
    C: ConnectionTrait,
{
    if let Some(profile) = Profiles::find_by_id(user.id).one(conn).await? {
        return Ok(profile);
    }

    tracing::info!(user_id = %user.id, "creating missing profile on first login");
    let name = user
        .email
        .split('@')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("Guest")
        .to_string();
    let profile = ProfileActive {
        id: Set(user.id),
        name: Set(name),
        email: Set(user.email.clone()),
        phone: Set(None),
        role: Set(Role::User.as_str().to_string()),
        status: Set(UserStatus::Active.as_str().to_string()),
        last_login: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(profile)
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let email = email.trim().to_lowercase();
    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let txn = state.orm.begin().await?;
    let profile = ensure_profile(&txn, &user).await?;
    if profile.status.parse::<UserStatus>()? == UserStatus::Inactive {
        return Err(AppError::Forbidden);
    }
    let role = profile.role.parse::<Role>()?;

    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(Duration::hours(state.config.jwt_ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let session = SessionActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        expires_at: Set(expires_at.into()),
        revoked_at: Set(None),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut active: ProfileActive = profile.into();
    active.last_login = Set(Some(now.into()));
    let profile = active.update(&txn).await?;
    txn.commit().await?;

    let token = issue_token(&state.config, user.id, role, session.id, now, expires_at)?;

    audit::record(
        &state.pool,
        Some(user.id),
        "user_login",
        "sessions",
        serde_json::json!({ "user_id": user.id, "session_id": session.id }),
    )
    .await;

    let resp = LoginResponse {
        token: format!("Bearer {}", token),
        expires_at,
        profile: profile_from_entity(profile)?,
    };

    Ok(ApiResponse::success("Logged in", resp, Some(Meta::empty())))
}

pub async fn logout_user(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    Sessions::update_many()
        .col_expr(SessionCol::RevokedAt, Expr::value(Utc::now()))
        .filter(SessionCol::Id.eq(user.session_id))
        .exec(&state.orm)
        .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_logout",
        "sessions",
        serde_json::json!({ "session_id": user.session_id }),
    )
    .await;

    Ok(ApiResponse::ok("Logged out", serde_json::json!({})))
}

/// Revokes every live session of `user_id`, optionally sparing one.
pub async fn revoke_sessions<C>(conn: &C, user_id: Uuid, keep: Option<Uuid>) -> AppResult<u64>
where
    C: ConnectionTrait,
{
    let mut condition = Condition::all()
        .add(SessionCol::UserId.eq(user_id))
        .add(SessionCol::RevokedAt.is_null());
    if let Some(keep) = keep {
        condition = condition.add(SessionCol::Id.ne(keep));
    }
    let result = Sessions::update_many()
        .col_expr(SessionCol::RevokedAt, Expr::value(Utc::now()))
        .filter(condition)
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    validate_password(&payload.new_password)?;
    if payload.new_password == payload.current_password {
        return Err(AppError::BadRequest(
            "New password must differ from the current one".into(),
        ));
    }

    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if !verify_password(&payload.current_password, &existing.password_hash)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let password_hash = hash_password(&payload.new_password)?;
    let txn = state.orm.begin().await?;
    let mut active: UserActive = existing.into();
    active.password_hash = Set(password_hash);
    active.update(&txn).await?;
    let revoked = revoke_sessions(&txn, user.user_id, Some(user.session_id)).await?;
    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, revoked, "password changed");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "password_change",
        "users",
        serde_json::json!({ "revoked_sessions": revoked }),
    )
    .await;

    Ok(ApiResponse::ok(
        "Password changed",
        serde_json::json!({ "revoked_sessions": revoked }),
    ))
}

pub async fn current_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Profile>> {
    let profile = Profiles::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::ok("Session", profile_from_entity(profile)?))
}
