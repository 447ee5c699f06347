use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::users::{CreateUserRequest, ProfileList, UpdateProfileRequest, UpdateUserRequest},
    entity::{
        profiles::{ActiveModel as ProfileActive, Column as ProfileCol, Entity as Profiles, Model as ProfileModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Profile, Role, UserStatus},
    response::{ApiResponse, Meta},
    routes::params::UserListQuery,
    services::auth_service::{
        create_identity, email_taken, hash_password, normalize_email, revoke_sessions,
        validate_password,
    },
    state::AppState,
};

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<ProfileList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(role) = query.role {
        condition = condition.add(ProfileCol::Role.eq(role.as_str()));
    }
    if let Some(status) = query.status {
        condition = condition.add(ProfileCol::Status.eq(status.as_str()));
    }
    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(ProfileCol::Name).ilike(pattern.clone()))
                .add(Expr::col(ProfileCol::Email).ilike(pattern)),
        );
    }

    let finder = Profiles::find()
        .filter(condition)
        .order_by_desc(ProfileCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(profile_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Users",
        ProfileList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_user(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Profile>> {
    ensure_admin(user)?;
    let profile = find_profile(state, id).await?;
    Ok(ApiResponse::ok("User", profile_from_entity(profile)?))
}

pub async fn create_user(
    state: &AppState,
    user: &AuthUser,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<Profile>> {
    ensure_admin(user)?;
    let email = normalize_email(&payload.email)?;
    validate_password(&payload.password)?;
    let name = required_name(&payload.name)?;

    if email_taken(&state.orm, &email).await? {
        return Err(AppError::BadRequest("Email is already taken".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let role = payload.role.unwrap_or(Role::User);
    let txn = state.orm.begin().await?;
    let profile = create_identity(&txn, email, password_hash, name, clean(payload.phone), role).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_create",
        "profiles",
        serde_json::json!({ "user_id": profile.id, "role": profile.role }),
    )
    .await;

    Ok(ApiResponse::ok("User created", profile_from_entity(profile)?))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<Profile>> {
    ensure_admin(user)?;
    let existing = find_profile(state, id).await?;
    let current_role = existing.role.parse::<Role>()?;
    let current_status = existing.status.parse::<UserStatus>()?;

    if id == user.user_id {
        let demoting = payload.role.is_some_and(|r| r != Role::Admin);
        let deactivating = payload.status == Some(UserStatus::Inactive);
        if demoting || deactivating {
            return Err(AppError::BadRequest(
                "Admins cannot demote or deactivate themselves".into(),
            ));
        }
    }

    let role_changed = payload.role.is_some_and(|r| r != current_role);
    let deactivated = payload.status == Some(UserStatus::Inactive) && current_status == UserStatus::Active;

    let mut active: ProfileActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(required_name(&name)?);
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(clean(Some(phone)));
    }
    if let Some(role) = payload.role {
        active.role = Set(role.as_str().to_string());
    }
    if let Some(status) = payload.status {
        active.status = Set(status.as_str().to_string());
    }
    active.updated_at = Set(Utc::now().into());

    let txn = state.orm.begin().await?;
    let profile = active.update(&txn).await?;
    // Tokens carry the role, so a role change or deactivation forces a fresh login.
    if role_changed || deactivated {
        let revoked = revoke_sessions(&txn, id, None).await?;
        tracing::info!(user_id = %id, revoked, "sessions revoked after profile change");
    }
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_update",
        "profiles",
        serde_json::json!({ "user_id": id, "role": profile.role, "status": profile.status }),
    )
    .await;

    Ok(ApiResponse::ok("User updated", profile_from_entity(profile)?))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("Admins cannot delete themselves".into()));
    }

    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_delete",
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::ok("Deleted", serde_json::json!({})))
}

pub async fn get_my_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Profile>> {
    let profile = find_profile(state, user.user_id).await?;
    Ok(ApiResponse::ok("Profile", profile_from_entity(profile)?))
}

pub async fn update_my_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<Profile>> {
    let existing = find_profile(state, user.user_id).await?;

    let mut active: ProfileActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(required_name(&name)?);
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(clean(Some(phone)));
    }
    active.updated_at = Set(Utc::now().into());
    let profile = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "profile_update",
        "profiles",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::ok("Profile updated", profile_from_entity(profile)?))
}

async fn find_profile(state: &AppState, id: Uuid) -> AppResult<ProfileModel> {
    Profiles::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

fn required_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    Ok(name.to_string())
}

/// Empty strings clear optional contact fields.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn profile_from_entity(model: ProfileModel) -> AppResult<Profile> {
    Ok(Profile {
        id: model.id,
        name: model.name,
        email: model.email,
        phone: model.phone,
        role: model.role.parse()?,
        status: model.status.parse()?,
        last_login: model.last_login.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_contact_fields_become_none() {
        assert_eq!(clean(Some("   ".into())), None);
        assert_eq!(clean(Some(" 555-0101 ".into())).as_deref(), Some("555-0101"));
        assert_eq!(clean(None), None);
    }

    #[test]
    fn names_must_not_be_blank() {
        assert!(required_name("  ").is_err());
        assert_eq!(required_name(" Ada ").unwrap(), "Ada");
    }
}
