use serde::Serialize;
use utoipa::ToSchema;

use crate::models::Booking;

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct StatusCounts {
    pub pending: i64,
    pub confirmed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminDashboard {
    pub total_rooms: i64,
    pub total_users: i64,
    pub bookings: StatusCounts,
    pub confirmed_revenue: i64,
    pub confirmed_revenue_display: String,
    pub arrivals_today: i64,
    pub departures_today: i64,
    pub occupied_rooms_today: i64,
    /// Occupied rooms over total rooms, `0.0` when there are no rooms.
    pub occupancy_rate: f64,
    pub upcoming: Vec<Booking>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberDashboard {
    pub bookings: StatusCounts,
    pub total_spent: i64,
    pub total_spent_display: String,
    pub next_stay: Option<Booking>,
}
