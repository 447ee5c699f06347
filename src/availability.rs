//! Room availability: the overlap predicate and the query built on it.
//!
//! Ranges are half-open `[check_in, check_out)`, so a guest can check in on
//! the day the previous guest checks out.

use chrono::NaiveDate;
use sea_orm::sea_query::{Query, SelectStatement};
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::bookings::{Column as BookingCol, Entity as Bookings},
    error::{AppError, AppResult},
    models::BookingStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> AppResult<Self> {
        if check_out <= check_in {
            return Err(AppError::BadRequest(
                "Check-out must be after check-in".into(),
            ));
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Conflict {
    pub booking_id: Uuid,
    pub reference: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Availability {
    pub available: bool,
    pub conflicts: Vec<Conflict>,
}

/// Occupying bookings whose stay overlaps `range`, for any room.
///
/// Two half-open stays overlap when each starts before the other ends.
pub fn occupied_during(range: &DateRange) -> Condition {
    Condition::all()
        .add(BookingCol::Status.is_in(BookingStatus::occupying()))
        .add(BookingCol::CheckIn.lt(range.check_out))
        .add(BookingCol::CheckOut.gt(range.check_in))
}

/// Row condition selecting occupying bookings of `room_id` that overlap `range`.
pub fn overlap_condition(room_id: Uuid, range: &DateRange, exclude: Option<Uuid>) -> Condition {
    let mut condition = Condition::all()
        .add(BookingCol::RoomId.eq(room_id))
        .add(occupied_during(range));
    if let Some(id) = exclude {
        condition = condition.add(BookingCol::Id.ne(id));
    }
    condition
}

/// Ids of rooms taken for some part of `range`, for `NOT IN` filters.
pub fn taken_rooms(range: &DateRange) -> SelectStatement {
    Query::select()
        .column(BookingCol::RoomId)
        .from(Bookings)
        .cond_where(occupied_during(range))
        .to_owned()
}

/// Queries the room's occupying bookings that overlap `range`.
///
/// Pass `exclude` when re-checking an existing booking's own dates. Runs on
/// any connection so callers can hold a room lock in a transaction.
pub async fn check_room_availability<C>(
    conn: &C,
    room_id: Uuid,
    range: &DateRange,
    exclude: Option<Uuid>,
) -> AppResult<Availability>
where
    C: ConnectionTrait,
{
    let conflicts: Vec<Conflict> = Bookings::find()
        .filter(overlap_condition(room_id, range, exclude))
        .order_by_asc(BookingCol::CheckIn)
        .all(conn)
        .await?
        .into_iter()
        .map(|b| Conflict {
            booking_id: b.id,
            reference: b.reference,
            check_in: b.check_in,
            check_out: b.check_out,
        })
        .collect();

    Ok(Availability {
        available: conflicts.is_empty(),
        conflicts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    use crate::entity::rooms::{Column as RoomCol, Entity as Rooms};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn range(from: u32, to: u32) -> DateRange {
        DateRange::new(day(from), day(to)).unwrap()
    }

    #[test]
    fn rejects_empty_and_reversed_ranges() {
        assert!(DateRange::new(day(3), day(3)).is_err());
        assert!(DateRange::new(day(3), day(2)).is_err());
    }

    #[test]
    fn overlap_sql_uses_strict_half_open_bounds() {
        let room_id = Uuid::new_v4();
        let editing = Uuid::new_v4();
        let sql = Bookings::find()
            .filter(overlap_condition(room_id, &range(10, 13), Some(editing)))
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains(&format!(r#""room_id" = '{room_id}'"#)), "{sql}");
        assert!(sql.contains(r#""check_in" < '2026-05-13'"#), "{sql}");
        assert!(sql.contains(r#""check_out" > '2026-05-10'"#), "{sql}");
        assert!(sql.contains(r#""status" IN ('pending', 'confirmed')"#), "{sql}");
        assert!(sql.contains(&format!(r#""id" <> '{editing}'"#)), "{sql}");
        assert!(!sql.contains("<="), "{sql}");
        assert!(!sql.contains(">="), "{sql}");
    }

    #[test]
    fn overlap_sql_without_exclusion_has_no_id_filter() {
        let sql = Bookings::find()
            .filter(overlap_condition(Uuid::new_v4(), &range(1, 2), None))
            .build(DbBackend::Postgres)
            .to_string();
        assert!(!sql.contains("<>"), "{sql}");
    }

    #[test]
    fn free_room_filter_reuses_the_overlap_bounds() {
        let sql = Rooms::find()
            .filter(RoomCol::Id.not_in_subquery(taken_rooms(&range(20, 22))))
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains("NOT IN (SELECT"), "{sql}");
        assert!(sql.contains(r#""check_in" < '2026-05-22'"#), "{sql}");
        assert!(sql.contains(r#""check_out" > '2026-05-20'"#), "{sql}");
        assert!(sql.contains(r#""status" IN ('pending', 'confirmed')"#), "{sql}");
    }
}
