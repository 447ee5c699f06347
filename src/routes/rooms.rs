use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::rooms::{AvailabilityResponse, CreateRoomRequest, RoomImageRequest, RoomList, UpdateRoomRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Room,
    response::ApiResponse,
    routes::params::{AvailabilityQuery, RoomQuery},
    services::{booking_service, room_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/{id}", get(get_room).put(update_room).delete(delete_room))
        .route("/{id}/availability", get(room_availability))
        .route("/{id}/images", post(upload_image).delete(remove_image))
        .route("/{id}/images/url", post(add_image_url))
}

#[utoipa::path(
    get,
    path = "/api/rooms",
    params(RoomQuery),
    responses(
        (status = 200, description = "List rooms", body = ApiResponse<RoomList>),
        (status = 400, description = "Invalid filter")
    ),
    tag = "Rooms"
)]
pub async fn list_rooms(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> AppResult<Json<ApiResponse<RoomList>>> {
    let resp = room_service::list_rooms(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{id}",
    params(
        ("id" = Uuid, Path, description = "Room ID")
    ),
    responses(
        (status = 200, description = "Get room", body = ApiResponse<Room>),
        (status = 404, description = "Room not found"),
    ),
    tag = "Rooms"
)]
pub async fn get_room(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Room>>> {
    let resp = room_service::get_room(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{id}/availability",
    params(
        ("id" = Uuid, Path, description = "Room ID"),
        AvailabilityQuery
    ),
    responses(
        (status = 200, description = "Availability and price quote", body = ApiResponse<AvailabilityResponse>),
        (status = 400, description = "Invalid dates"),
        (status = 404, description = "Room not found"),
    ),
    tag = "Rooms"
)]
pub async fn room_availability(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<ApiResponse<AvailabilityResponse>>> {
    let resp = booking_service::check_availability(&state, id, query.check_in, query.check_out).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Create room", body = ApiResponse<Room>),
        (status = 400, description = "Invalid room"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Rooms"
)]
pub async fn create_room(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateRoomRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Room>>)> {
    let resp = room_service::create_room(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/rooms/{id}",
    params(
        ("id" = Uuid, Path, description = "Room ID")
    ),
    request_body = UpdateRoomRequest,
    responses(
        (status = 200, description = "Updated room", body = ApiResponse<Room>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Room not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Rooms"
)]
pub async fn update_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoomRequest>,
) -> AppResult<Json<ApiResponse<Room>>> {
    let resp = room_service::update_room(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/rooms/{id}",
    params(
        ("id" = Uuid, Path, description = "Room ID")
    ),
    responses(
        (status = 200, description = "Deleted room"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Room not found"),
        (status = 409, description = "Room has active bookings")
    ),
    security(("bearer_auth" = [])),
    tag = "Rooms"
)]
pub async fn delete_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = room_service::delete_room(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{id}/images",
    params(
        ("id" = Uuid, Path, description = "Room ID")
    ),
    request_body(content = Vec<u8>, content_type = "image/*", description = "Raw image bytes"),
    responses(
        (status = 200, description = "Image stored and attached", body = ApiResponse<Room>),
        (status = 400, description = "Unsupported image"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Rooms"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<Room>>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Content-Type header".into()))?;
    let resp = room_service::upload_room_image(&state, &user, id, content_type, &body).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{id}/images/url",
    params(
        ("id" = Uuid, Path, description = "Room ID")
    ),
    request_body = RoomImageRequest,
    responses(
        (status = 200, description = "Image URL attached", body = ApiResponse<Room>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Rooms"
)]
pub async fn add_image_url(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoomImageRequest>,
) -> AppResult<Json<ApiResponse<Room>>> {
    let resp = room_service::add_room_image_url(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/rooms/{id}/images",
    params(
        ("id" = Uuid, Path, description = "Room ID")
    ),
    request_body = RoomImageRequest,
    responses(
        (status = 200, description = "Image removed", body = ApiResponse<Room>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Image not attached to room")
    ),
    security(("bearer_auth" = [])),
    tag = "Rooms"
)]
pub async fn remove_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoomImageRequest>,
) -> AppResult<Json<ApiResponse<Room>>> {
    let resp = room_service::remove_room_image(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
