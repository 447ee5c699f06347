use axum::{
    Json, Router,
    extract::State,
    routing::get,
};

use crate::{
    dto::{dashboard::MemberDashboard, users::UpdateProfileRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Profile,
    response::ApiResponse,
    services::{dashboard_service, user_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/dashboard", get(dashboard))
}

#[utoipa::path(
    get,
    path = "/api/me/profile",
    responses(
        (status = 200, description = "Own profile", body = ApiResponse<Profile>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Me"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let resp = user_service::get_my_profile(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/me/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Own profile updated", body = ApiResponse<Profile>),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Me"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let resp = user_service::update_my_profile(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/me/dashboard",
    responses(
        (status = 200, description = "Member dashboard", body = ApiResponse<MemberDashboard>),
        (status = 403, description = "Members only")
    ),
    security(("bearer_auth" = [])),
    tag = "Me"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<MemberDashboard>>> {
    let resp = dashboard_service::member_dashboard(&state, &user).await?;
    Ok(Json(resp))
}
