use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    availability::{DateRange, check_room_availability},
    dto::{
        bookings::{BookingDetail, BookingList, BookingLookupQuery, CreateBookingRequest, UpdateBookingRequest},
        rooms::AvailabilityResponse,
    },
    entity::{
        bookings::{ActiveModel as BookingActive, Column as BookingCol, Entity as Bookings, Model as BookingModel},
        profiles::Entity as Profiles,
        rooms::{Entity as Rooms, Model as RoomModel},
    },
    error::{AppError, AppResult},
    format::{format_currency, format_date_range},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Booking, BookingStatus},
    pricing::StayQuote,
    response::{ApiResponse, Meta},
    routes::params::{BookingListQuery, BookingSortBy, SortOrder},
    services::{
        room_service::{find_room, room_from_entity},
        settings_service::load_settings,
    },
    state::AppState,
};

const MAX_NIGHTS: i64 = 365;

/// Availability and price for a prospective stay.
pub async fn check_availability(
    state: &AppState,
    room_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> AppResult<ApiResponse<AvailabilityResponse>> {
    let range = DateRange::new(check_in, check_out)?;
    let room = find_room(state, room_id).await?;
    let availability = check_room_availability(&state.orm, room_id, &range, None).await?;
    let quote = StayQuote::new(range.check_in, range.check_out, room.base_price);
    let currency = load_settings(state).await?.currency;

    let data = AvailabilityResponse {
        room_id,
        check_in,
        check_out,
        available: availability.available,
        total_price_display: format_currency(quote.total_price, &currency),
        quote,
        conflicts: availability.conflicts,
    };
    let message = if data.available { "Available" } else { "Unavailable" };
    Ok(ApiResponse::ok(message, data))
}

pub async fn create_booking(
    state: &AppState,
    caller: Option<&AuthUser>,
    payload: CreateBookingRequest,
) -> AppResult<ApiResponse<Booking>> {
    let range = DateRange::new(payload.check_in, payload.check_out)?;
    ensure_not_in_past(&range, caller)?;
    validate_guest_count(payload.guests)?;

    let (guest_name, guest_email) = match caller {
        Some(user) => {
            let profile = Profiles::find_by_id(user.user_id).one(&state.orm).await?;
            (
                payload
                    .guest_name
                    .or_else(|| profile.as_ref().map(|p| p.name.clone())),
                payload
                    .guest_email
                    .or_else(|| profile.as_ref().map(|p| p.email.clone())),
            )
        }
        None => (payload.guest_name, payload.guest_email),
    };
    let guest_name = required_text(guest_name, "Guest name")?;
    let guest_email = guest_email_address(guest_email)?;

    let txn = state.orm.begin().await?;

    // Lock the room row so concurrent bookings of the same room serialize here.
    let room = Rooms::find_by_id(payload.room_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_capacity(&room, payload.guests)?;

    let availability = check_room_availability(&txn, room.id, &range, None).await?;
    if !availability.available {
        return Err(AppError::Conflict(
            "Room is already booked for the selected dates".into(),
        ));
    }

    let quote = quote_for(&room, &range)?;
    let id = Uuid::new_v4();
    let booking = BookingActive {
        id: Set(id),
        reference: Set(build_booking_reference(id, Utc::now().date_naive())),
        room_id: Set(room.id),
        guest_name: Set(guest_name),
        guest_email: Set(guest_email),
        guest_phone: Set(optional_text(payload.guest_phone)),
        check_in: Set(range.check_in),
        check_out: Set(range.check_out),
        guests: Set(payload.guests),
        nights: Set(quote.nights as i32),
        total_price: Set(quote.total_price),
        status: Set(BookingStatus::Pending.as_str().to_string()),
        created_by: Set(caller.map(|u| u.user_id)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        room_id = %booking.room_id,
        nights = booking.nights,
        "booking created"
    );
    audit::record(
        &state.pool,
        caller.map(|u| u.user_id),
        "booking_create",
        "bookings",
        serde_json::json!({ "booking_id": booking.id, "reference": booking.reference }),
    )
    .await;

    let currency = load_settings(state).await?.currency;
    Ok(ApiResponse::success(
        "Booking created",
        booking_from_entity(booking, &currency)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_bookings(
    state: &AppState,
    user: &AuthUser,
    query: BookingListQuery,
) -> AppResult<ApiResponse<BookingList>> {
    ensure_admin(user)?;
    page_bookings(state, Condition::all(), query).await
}

/// Bookings the caller made, newest first unless asked otherwise.
pub async fn list_my_bookings(
    state: &AppState,
    user: &AuthUser,
    query: BookingListQuery,
) -> AppResult<ApiResponse<BookingList>> {
    let scope = Condition::all().add(BookingCol::CreatedBy.eq(user.user_id));
    page_bookings(state, scope, query).await
}

async fn page_bookings(
    state: &AppState,
    scope: Condition,
    query: BookingListQuery,
) -> AppResult<ApiResponse<BookingList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = scope;

    if let Some(status) = query.status {
        condition = condition.add(BookingCol::Status.eq(status.as_str()));
    }
    if let Some(room_id) = query.room_id {
        condition = condition.add(BookingCol::RoomId.eq(room_id));
    }
    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(BookingCol::GuestName).ilike(pattern.clone()))
                .add(Expr::col(BookingCol::GuestEmail).ilike(pattern.clone()))
                .add(Expr::col(BookingCol::Reference).ilike(pattern)),
        );
    }
    if let Some(from) = query.from {
        condition = condition.add(BookingCol::CheckOut.gt(from));
    }
    if let Some(to) = query.to {
        condition = condition.add(BookingCol::CheckIn.lt(to));
    }

    let sort_col = match query.sort_by.unwrap_or(BookingSortBy::CreatedAt) {
        BookingSortBy::CreatedAt => BookingCol::CreatedAt,
        BookingSortBy::CheckIn => BookingCol::CheckIn,
    };
    let mut finder = Bookings::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let currency = load_settings(state).await?.currency;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|b| booking_from_entity(b, &currency))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Bookings",
        BookingList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<BookingDetail>> {
    let booking = find_booking(state, id).await?;
    ensure_can_view(user, &booking)?;
    detail(state, booking, "Booking").await
}

/// Lets anonymous guests find their booking by reference and email.
pub async fn lookup_booking(
    state: &AppState,
    query: BookingLookupQuery,
) -> AppResult<ApiResponse<BookingDetail>> {
    let booking = Bookings::find()
        .filter(lookup_condition(&query))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    detail(state, booking, "Booking").await
}

pub async fn update_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateBookingRequest,
) -> AppResult<ApiResponse<Booking>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let existing = Bookings::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if existing.status.parse::<BookingStatus>()? == BookingStatus::Cancelled {
        return Err(AppError::BadRequest("Cancelled bookings cannot be edited".into()));
    }

    let room_id = payload.room_id.unwrap_or(existing.room_id);
    let range = DateRange::new(
        payload.check_in.unwrap_or(existing.check_in),
        payload.check_out.unwrap_or(existing.check_out),
    )?;
    let guests = payload.guests.unwrap_or(existing.guests);
    validate_guest_count(guests)?;

    let stay_changed = room_id != existing.room_id
        || range.check_in != existing.check_in
        || range.check_out != existing.check_out
        || guests != existing.guests;

    let mut active: BookingActive = existing.into();
    if stay_changed {
        let room = Rooms::find_by_id(room_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        ensure_capacity(&room, guests)?;

        let availability = check_room_availability(&txn, room.id, &range, Some(id)).await?;
        if !availability.available {
            return Err(AppError::Conflict(
                "Room is already booked for the selected dates".into(),
            ));
        }

        let quote = quote_for(&room, &range)?;
        active.room_id = Set(room.id);
        active.check_in = Set(range.check_in);
        active.check_out = Set(range.check_out);
        active.guests = Set(guests);
        active.nights = Set(quote.nights as i32);
        active.total_price = Set(quote.total_price);
    }
    if let Some(name) = payload.guest_name {
        active.guest_name = Set(required_text(Some(name), "Guest name")?);
    }
    if let Some(email) = payload.guest_email {
        active.guest_email = Set(guest_email_address(Some(email))?);
    }
    if let Some(phone) = payload.guest_phone {
        active.guest_phone = Set(optional_text(Some(phone)));
    }
    active.updated_at = Set(Utc::now().into());

    let booking = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "booking_update",
        "bookings",
        serde_json::json!({ "booking_id": id, "repriced": stay_changed }),
    )
    .await;

    let currency = load_settings(state).await?.currency;
    Ok(ApiResponse::ok("Booking updated", booking_from_entity(booking, &currency)?))
}

pub async fn confirm_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Booking>> {
    ensure_admin(user)?;
    transition(state, user, id, BookingStatus::Confirmed).await
}

/// Admins cancel any booking; other callers only their own.
pub async fn cancel_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Booking>> {
    transition(state, user, id, BookingStatus::Cancelled).await
}

async fn transition(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    next: BookingStatus,
) -> AppResult<ApiResponse<Booking>> {
    let txn = state.orm.begin().await?;
    let existing = Bookings::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_can_view(user, &existing)?;

    let current = existing.status.parse::<BookingStatus>()?;
    if !current.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "Cannot change booking from {current} to {next}"
        )));
    }

    let mut active: BookingActive = existing.into();
    active.status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let booking = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(booking_id = %id, from = %current, to = %next, "booking status changed");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "booking_status_update",
        "bookings",
        serde_json::json!({ "booking_id": id, "from": current.as_str(), "to": next.as_str() }),
    )
    .await;

    let currency = load_settings(state).await?.currency;
    let message = match next {
        BookingStatus::Confirmed => "Booking confirmed",
        BookingStatus::Cancelled => "Booking cancelled",
        BookingStatus::Pending => "Booking updated",
    };
    Ok(ApiResponse::ok(message, booking_from_entity(booking, &currency)?))
}

pub async fn delete_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Bookings::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "booking_delete",
        "bookings",
        serde_json::json!({ "booking_id": id }),
    )
    .await;

    Ok(ApiResponse::ok("Deleted", serde_json::json!({})))
}

async fn detail(
    state: &AppState,
    booking: BookingModel,
    message: &str,
) -> AppResult<ApiResponse<BookingDetail>> {
    let room = find_room(state, booking.room_id).await?;
    let currency = load_settings(state).await?.currency;
    Ok(ApiResponse::ok(
        message,
        BookingDetail {
            booking: booking_from_entity(booking, &currency)?,
            room: room_from_entity(room),
        },
    ))
}

async fn find_booking(state: &AppState, id: Uuid) -> AppResult<BookingModel> {
    Bookings::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

/// Non-admins only see their own bookings; others look like they do not exist.
fn ensure_can_view(user: &AuthUser, booking: &BookingModel) -> AppResult<()> {
    if user.is_admin() || booking.created_by == Some(user.user_id) {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

/// Admins may record stays that already started; everyone else books from today.
fn ensure_not_in_past(range: &DateRange, caller: Option<&AuthUser>) -> AppResult<()> {
    if caller.is_some_and(AuthUser::is_admin) {
        return Ok(());
    }
    if range.check_in < Utc::now().date_naive() {
        return Err(AppError::BadRequest("Check-in cannot be in the past".into()));
    }
    Ok(())
}

fn validate_guest_count(guests: i32) -> AppResult<()> {
    if guests < 1 {
        return Err(AppError::BadRequest("At least one guest is required".into()));
    }
    Ok(())
}

fn ensure_capacity(room: &RoomModel, guests: i32) -> AppResult<()> {
    if guests > room.capacity {
        return Err(AppError::BadRequest(format!(
            "Room {} sleeps at most {} guests",
            room.name, room.capacity
        )));
    }
    Ok(())
}

fn quote_for(room: &RoomModel, range: &DateRange) -> AppResult<StayQuote> {
    let quote = StayQuote::new(range.check_in, range.check_out, room.base_price);
    if quote.nights > MAX_NIGHTS {
        return Err(AppError::BadRequest(format!(
            "Stays are limited to {MAX_NIGHTS} nights"
        )));
    }
    Ok(quote)
}

fn required_text(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{field} is required")))
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn guest_email_address(value: Option<String>) -> AppResult<String> {
    let email = required_text(value, "Guest email")?.to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::BadRequest("Invalid guest email".into())),
    }
}

/// Exact match on both fields; emails are stored lowercased.
fn lookup_condition(query: &BookingLookupQuery) -> Condition {
    Condition::all()
        .add(BookingCol::Reference.eq(query.reference.trim().to_uppercase()))
        .add(BookingCol::GuestEmail.eq(query.email.trim().to_lowercase()))
}

fn build_booking_reference(id: Uuid, day: NaiveDate) -> String {
    let suffix = id.simple().to_string().to_uppercase();
    format!("BK-{}-{}", day.format("%Y%m%d"), &suffix[..8])
}

pub(crate) fn booking_from_entity(model: BookingModel, currency: &str) -> AppResult<Booking> {
    Ok(Booking {
        id: model.id,
        total_price_display: format_currency(model.total_price, currency),
        stay_display: format_date_range(model.check_in, model.check_out),
        reference: model.reference,
        room_id: model.room_id,
        guest_name: model.guest_name,
        guest_email: model.guest_email,
        guest_phone: model.guest_phone,
        check_in: model.check_in,
        check_out: model.check_out,
        guests: model.guests,
        nights: model.nights,
        total_price: model.total_price,
        status: model.status.parse()?,
        created_by: model.created_by,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn room(capacity: i32, base_price: i64) -> RoomModel {
        let now = Utc::now().into();
        RoomModel {
            id: Uuid::new_v4(),
            name: "Garden Suite".into(),
            room_type: "suite".into(),
            description: None,
            capacity,
            base_price,
            images: serde_json::json!([]),
            amenities: serde_json::json!([]),
            created_at: now,
            updated_at: now,
        }
    }

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn reference_is_dated_and_uppercase() {
        let id = Uuid::parse_str("0f8e2a4c-1111-4222-8333-444455556666").unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(build_booking_reference(id, day), "BK-20261018-0F8E2A4C");
    }

    #[test]
    fn lookup_matches_email_exactly() {
        use sea_orm::{DbBackend, QueryTrait};

        let query = BookingLookupQuery {
            reference: " bk-20261018-0f8e2a4c ".into(),
            email: "%".into(),
        };
        let sql = Bookings::find()
            .filter(lookup_condition(&query))
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains(r#""reference" = 'BK-20261018-0F8E2A4C'"#), "{sql}");
        assert!(sql.contains(r#""guest_email" = '%'"#), "{sql}");
        assert!(!sql.to_uppercase().contains("LIKE"), "{sql}");
    }

    #[test]
    fn capacity_bounds_guest_count() {
        let room = room(2, 10_000);
        assert!(ensure_capacity(&room, 2).is_ok());
        assert!(ensure_capacity(&room, 3).is_err());
        assert!(validate_guest_count(0).is_err());
    }

    #[test]
    fn quote_caps_stay_length() {
        let room = room(2, 10_000);
        let start = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        let short = DateRange::new(start, start + chrono::Duration::days(3)).unwrap();
        assert_eq!(quote_for(&room, &short).unwrap().total_price, 30_000);

        let long = DateRange::new(start, start + chrono::Duration::days(400)).unwrap();
        assert!(quote_for(&room, &long).is_err());
    }

    #[test]
    fn past_check_in_is_only_allowed_for_admins() {
        let today = Utc::now().date_naive();
        let past = DateRange::new(today - chrono::Duration::days(2), today).unwrap();
        assert!(ensure_not_in_past(&past, None).is_err());
        assert!(ensure_not_in_past(&past, Some(&caller(Role::Member))).is_err());
        assert!(ensure_not_in_past(&past, Some(&caller(Role::Admin))).is_ok());

        let upcoming = DateRange::new(today, today + chrono::Duration::days(1)).unwrap();
        assert!(ensure_not_in_past(&upcoming, None).is_ok());
    }

    #[test]
    fn guest_email_is_required_and_checked() {
        assert!(guest_email_address(None).is_err());
        assert!(guest_email_address(Some("nobody".into())).is_err());
        assert_eq!(
            guest_email_address(Some(" Guest@Mail.com ".into())).unwrap(),
            "guest@mail.com"
        );
    }

    #[test]
    fn api_booking_carries_display_strings() {
        let now = Utc::now();
        let model = BookingModel {
            id: Uuid::new_v4(),
            reference: "BK-20261001-ABCDEF12".into(),
            room_id: Uuid::new_v4(),
            guest_name: "Ada".into(),
            guest_email: "ada@example.com".into(),
            guest_phone: None,
            check_in: NaiveDate::from_ymd_opt(2026, 10, 8).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 10, 11).unwrap(),
            guests: 2,
            nights: 3,
            total_price: 123_450,
            status: "confirmed".into(),
            created_by: None,
            created_at: now.into(),
            updated_at: now.into(),
        };
        let booking = booking_from_entity(model, "EUR").unwrap();
        assert_eq!(booking.total_price_display, "EUR 1,234.50");
        assert_eq!(booking.stay_display, "8 Oct 2026 - 11 Oct 2026");
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[test]
    fn only_owners_and_admins_see_a_booking() {
        let owner = caller(Role::Member);
        let now = Utc::now();
        let booking = BookingModel {
            id: Uuid::new_v4(),
            reference: "BK-20270101-ABCDEF12".into(),
            room_id: Uuid::new_v4(),
            guest_name: "Ada".into(),
            guest_email: "ada@example.com".into(),
            guest_phone: None,
            check_in: now.date_naive(),
            check_out: now.date_naive() + chrono::Duration::days(1),
            guests: 1,
            nights: 1,
            total_price: 10_000,
            status: "pending".into(),
            created_by: Some(owner.user_id),
            created_at: now.into(),
            updated_at: now.into(),
        };
        assert!(ensure_can_view(&owner, &booking).is_ok());
        assert!(ensure_can_view(&caller(Role::Admin), &booking).is_ok());
        assert!(matches!(
            ensure_can_view(&caller(Role::Member), &booking),
            Err(AppError::NotFound)
        ));
    }
}
