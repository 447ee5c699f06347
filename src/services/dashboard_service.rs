use chrono::Utc;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::dashboard::{AdminDashboard, MemberDashboard, StatusCounts},
    entity::bookings::{Column as BookingCol, Entity as Bookings},
    error::AppResult,
    format::format_currency,
    middleware::auth::{AuthUser, ensure_admin, ensure_member},
    models::BookingStatus,
    response::ApiResponse,
    services::{booking_service::booking_from_entity, settings_service::load_settings},
    state::AppState,
};

const UPCOMING_LIMIT: u64 = 5;

/// Counts by status plus confirmed revenue, optionally scoped to one creator.
async fn booking_totals(pool: &DbPool, created_by: Option<Uuid>) -> AppResult<(StatusCounts, i64)> {
    let (pending, confirmed, cancelled, revenue): (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'pending'),
            COUNT(*) FILTER (WHERE status = 'confirmed'),
            COUNT(*) FILTER (WHERE status = 'cancelled'),
            COALESCE(SUM(total_price) FILTER (WHERE status = 'confirmed'), 0)::BIGINT
        FROM bookings
        WHERE $1::UUID IS NULL OR created_by = $1
        "#,
    )
    .bind(created_by)
    .fetch_one(pool)
    .await?;

    Ok((
        StatusCounts {
            pending,
            confirmed,
            cancelled,
        },
        revenue,
    ))
}

pub fn occupancy_rate(occupied: i64, total_rooms: i64) -> f64 {
    if total_rooms <= 0 {
        return 0.0;
    }
    occupied as f64 / total_rooms as f64
}

pub async fn admin_dashboard(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AdminDashboard>> {
    ensure_admin(user)?;
    let today = Utc::now().date_naive();

    let (total_rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
        .fetch_one(&state.pool)
        .await?;
    let (total_users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
        .fetch_one(&state.pool)
        .await?;
    let (bookings, confirmed_revenue) = booking_totals(&state.pool, None).await?;

    let (arrivals_today, departures_today, occupied_rooms_today): (i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE check_in = $1),
                COUNT(*) FILTER (WHERE check_out = $1),
                COUNT(DISTINCT room_id) FILTER (WHERE check_in <= $1 AND check_out > $1)
            FROM bookings
            WHERE status = ANY($2)
            "#,
        )
        .bind(today)
        .bind(BookingStatus::occupying())
        .fetch_one(&state.pool)
        .await?;

    let currency = load_settings(state).await?.currency;
    let upcoming = Bookings::find()
        .filter(
            Condition::all()
                .add(BookingCol::Status.is_in(BookingStatus::occupying()))
                .add(BookingCol::CheckIn.gte(today)),
        )
        .order_by_asc(BookingCol::CheckIn)
        .limit(UPCOMING_LIMIT)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|b| booking_from_entity(b, &currency))
        .collect::<AppResult<Vec<_>>>()?;

    let data = AdminDashboard {
        total_rooms,
        total_users,
        bookings,
        confirmed_revenue,
        confirmed_revenue_display: format_currency(confirmed_revenue, &currency),
        arrivals_today,
        departures_today,
        occupied_rooms_today,
        occupancy_rate: occupancy_rate(occupied_rooms_today, total_rooms),
        upcoming,
    };
    Ok(ApiResponse::ok("Dashboard", data))
}

pub async fn member_dashboard(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<MemberDashboard>> {
    ensure_member(user)?;
    let today = Utc::now().date_naive();

    let (bookings, total_spent) = booking_totals(&state.pool, Some(user.user_id)).await?;
    let currency = load_settings(state).await?.currency;

    let next_stay = Bookings::find()
        .filter(
            Condition::all()
                .add(BookingCol::CreatedBy.eq(user.user_id))
                .add(BookingCol::Status.is_in(BookingStatus::occupying()))
                .add(BookingCol::CheckOut.gt(today)),
        )
        .order_by_asc(BookingCol::CheckIn)
        .one(&state.orm)
        .await?
        .map(|b| booking_from_entity(b, &currency))
        .transpose()?;

    let data = MemberDashboard {
        bookings,
        total_spent,
        total_spent_display: format_currency(total_spent, &currency),
        next_stay,
    };
    Ok(ApiResponse::ok("Dashboard", data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupancy_rate_handles_empty_hotel() {
        assert_eq!(occupancy_rate(0, 0), 0.0);
        assert_eq!(occupancy_rate(3, 4), 0.75);
    }
}
