use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    audit,
    availability::{DateRange, taken_rooms},
    dto::rooms::{CreateRoomRequest, RoomImageRequest, RoomList, UpdateRoomRequest},
    entity::{
        bookings::{Column as BookingCol, Entity as Bookings},
        rooms::{ActiveModel as RoomActive, Column as RoomCol, Entity as Rooms, Model as RoomModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{BookingStatus, Room},
    response::{ApiResponse, Meta},
    routes::params::{RoomQuery, RoomSortBy, SortOrder},
    state::AppState,
};

pub async fn list_rooms(state: &AppState, query: RoomQuery) -> AppResult<ApiResponse<RoomList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(RoomCol::Name).ilike(pattern.clone()))
                .add(Expr::col(RoomCol::Description).ilike(pattern)),
        );
    }
    if let Some(room_type) = query.room_type.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(RoomCol::RoomType.eq(room_type.clone()));
    }
    if let Some(guests) = query.guests {
        condition = condition.add(RoomCol::Capacity.gte(guests));
    }
    if let Some(min_price) = query.min_price {
        condition = condition.add(RoomCol::BasePrice.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(RoomCol::BasePrice.lte(max_price));
    }

    match (query.check_in, query.check_out) {
        (Some(check_in), Some(check_out)) => {
            let range = DateRange::new(check_in, check_out)?;
            condition = condition.add(RoomCol::Id.not_in_subquery(taken_rooms(&range)));
        }
        (None, None) => {}
        _ => {
            return Err(AppError::BadRequest(
                "check_in and check_out must be given together".into(),
            ));
        }
    }

    let sort_by = query.sort_by.unwrap_or(RoomSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        RoomSortBy::CreatedAt => RoomCol::CreatedAt,
        RoomSortBy::BasePrice => RoomCol::BasePrice,
        RoomSortBy::Capacity => RoomCol::Capacity,
        RoomSortBy::Name => RoomCol::Name,
    };

    let mut finder = Rooms::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(room_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Rooms",
        RoomList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_room(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Room>> {
    let room = find_room(state, id).await?;
    Ok(ApiResponse::success("Room", room_from_entity(room), None))
}

pub async fn create_room(
    state: &AppState,
    user: &AuthUser,
    payload: CreateRoomRequest,
) -> AppResult<ApiResponse<Room>> {
    ensure_admin(user)?;
    let name = required(&payload.name, "Room name")?;
    let room_type = required(&payload.room_type, "Room type")?;
    validate_capacity(payload.capacity)?;
    validate_price(payload.base_price)?;
    ensure_unique_name(state, &name, None).await?;

    let room = RoomActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        room_type: Set(room_type),
        description: Set(payload.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())),
        capacity: Set(payload.capacity),
        base_price: Set(payload.base_price),
        images: Set(string_list_json(payload.images)),
        amenities: Set(string_list_json(payload.amenities)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "room_create",
        "rooms",
        serde_json::json!({ "room_id": room.id }),
    )
    .await;

    Ok(ApiResponse::ok("Room created", room_from_entity(room)))
}

pub async fn update_room(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateRoomRequest,
) -> AppResult<ApiResponse<Room>> {
    ensure_admin(user)?;
    let existing = find_room(state, id).await?;

    let mut active: RoomActive = existing.into();
    if let Some(name) = payload.name {
        let name = required(&name, "Room name")?;
        ensure_unique_name(state, &name, Some(id)).await?;
        active.name = Set(name);
    }
    if let Some(room_type) = payload.room_type {
        active.room_type = Set(required(&room_type, "Room type")?);
    }
    if let Some(description) = payload.description {
        let description = description.trim().to_string();
        active.description = Set((!description.is_empty()).then_some(description));
    }
    if let Some(capacity) = payload.capacity {
        validate_capacity(capacity)?;
        active.capacity = Set(capacity);
    }
    if let Some(base_price) = payload.base_price {
        validate_price(base_price)?;
        active.base_price = Set(base_price);
    }
    if let Some(images) = payload.images {
        active.images = Set(string_list_json(images));
    }
    if let Some(amenities) = payload.amenities {
        active.amenities = Set(string_list_json(amenities));
    }
    active.updated_at = Set(Utc::now().into());

    let room = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "room_update",
        "rooms",
        serde_json::json!({ "room_id": room.id }),
    )
    .await;

    Ok(ApiResponse::ok("Updated", room_from_entity(room)))
}

pub async fn delete_room(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let room = find_room(state, id).await?;

    let active_bookings = Bookings::find()
        .filter(
            Condition::all()
                .add(BookingCol::RoomId.eq(id))
                .add(BookingCol::Status.is_in(BookingStatus::occupying()))
                .add(BookingCol::CheckOut.gt(Utc::now().date_naive())),
        )
        .count(&state.orm)
        .await?;
    if active_bookings > 0 {
        return Err(AppError::Conflict(format!(
            "Room has {active_bookings} active booking(s)"
        )));
    }

    let images = string_list(&room.images);
    Rooms::delete_by_id(id).exec(&state.orm).await?;

    for url in images {
        if let Err(err) = state.images.delete(&url).await {
            tracing::warn!(error = %err, url = %url, "failed to remove room image");
        }
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "room_delete",
        "rooms",
        serde_json::json!({ "room_id": id }),
    )
    .await;

    Ok(ApiResponse::ok("Deleted", serde_json::json!({})))
}

pub async fn upload_room_image(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    content_type: &str,
    bytes: &[u8],
) -> AppResult<ApiResponse<Room>> {
    ensure_admin(user)?;
    let room = find_room(state, id).await?;

    let url = state.images.put(bytes, content_type).await?;
    let room = match append_image(state, room, url.clone()).await {
        Ok(room) => room,
        Err(err) => {
            if let Err(cleanup) = state.images.delete(&url).await {
                tracing::warn!(error = %cleanup, url = %url, "failed to remove orphaned image");
            }
            return Err(err);
        }
    };

    audit::record(
        &state.pool,
        Some(user.user_id),
        "room_image_upload",
        "rooms",
        serde_json::json!({ "room_id": id, "url": url }),
    )
    .await;

    Ok(ApiResponse::ok("Image uploaded", room_from_entity(room)))
}

/// Attaches an externally hosted image by URL.
pub async fn add_room_image_url(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: RoomImageRequest,
) -> AppResult<ApiResponse<Room>> {
    ensure_admin(user)?;
    let url = payload.url.trim().to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AppError::BadRequest("Image URL must be http(s)".into()));
    }
    let room = find_room(state, id).await?;
    let room = append_image(state, room, url).await?;
    Ok(ApiResponse::ok("Image added", room_from_entity(room)))
}

pub async fn remove_room_image(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: RoomImageRequest,
) -> AppResult<ApiResponse<Room>> {
    ensure_admin(user)?;
    let room = find_room(state, id).await?;
    let mut images = string_list(&room.images);
    let before = images.len();
    images.retain(|u| u != &payload.url);
    if images.len() == before {
        return Err(AppError::NotFound);
    }

    let mut active: RoomActive = room.into();
    active.images = Set(string_list_json(images));
    active.updated_at = Set(Utc::now().into());
    let room = active.update(&state.orm).await?;

    if let Err(err) = state.images.delete(&payload.url).await {
        tracing::warn!(error = %err, url = %payload.url, "failed to remove room image");
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "room_image_remove",
        "rooms",
        serde_json::json!({ "room_id": id, "url": payload.url }),
    )
    .await;

    Ok(ApiResponse::ok("Image removed", room_from_entity(room)))
}

async fn append_image(state: &AppState, room: RoomModel, url: String) -> AppResult<RoomModel> {
    let mut images = string_list(&room.images);
    images.push(url);
    let mut active: RoomActive = room.into();
    active.images = Set(string_list_json(images));
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(&state.orm).await?)
}

pub(crate) async fn find_room(state: &AppState, id: Uuid) -> AppResult<RoomModel> {
    Rooms::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

async fn ensure_unique_name(state: &AppState, name: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut condition = Condition::all().add(RoomCol::Name.eq(name));
    if let Some(id) = except {
        condition = condition.add(RoomCol::Id.ne(id));
    }
    if Rooms::find().filter(condition).count(&state.orm).await? > 0 {
        return Err(AppError::BadRequest(format!("Room name {name} is already used")));
    }
    Ok(())
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn validate_capacity(capacity: i32) -> AppResult<()> {
    if capacity < 1 {
        return Err(AppError::BadRequest("Capacity must be at least 1".into()));
    }
    Ok(())
}

fn validate_price(price: i64) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::BadRequest("Base price cannot be negative".into()));
    }
    Ok(())
}

/// Trimmed, non-empty, first occurrence wins.
fn normalize_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn string_list_json(values: Vec<String>) -> Value {
    Value::from(normalize_list(values))
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn room_from_entity(model: RoomModel) -> Room {
    Room {
        id: model.id,
        images: string_list(&model.images),
        amenities: string_list(&model.amenities),
        name: model.name,
        room_type: model.room_type,
        description: model.description,
        capacity: model.capacity,
        base_price: model.base_price,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_trimmed_and_deduplicated() {
        let list = normalize_list(vec![
            " Wi-Fi ".into(),
            "".into(),
            "Minibar".into(),
            "Wi-Fi".into(),
        ]);
        assert_eq!(list, vec!["Wi-Fi".to_string(), "Minibar".to_string()]);
    }

    #[test]
    fn json_lists_skip_non_strings() {
        let value = serde_json::json!(["a.jpg", 3, null, "b.jpg"]);
        assert_eq!(string_list(&value), vec!["a.jpg", "b.jpg"]);
        assert!(string_list(&serde_json::json!({})).is_empty());
    }

    #[test]
    fn rejects_invalid_room_numbers() {
        assert!(validate_capacity(0).is_err());
        assert!(validate_capacity(2).is_ok());
        assert!(validate_price(-1).is_err());
        assert!(validate_price(0).is_ok());
    }
}
