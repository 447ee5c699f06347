use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{availability::Conflict, models::Room, pricing::StayQuote};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub name: String,
    pub room_type: String,
    pub description: Option<String>,
    pub capacity: i32,
    pub base_price: i64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub room_type: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<i32>,
    pub base_price: Option<i64>,
    /// Replaces the whole list.
    pub images: Option<Vec<String>>,
    /// Replaces the whole list.
    pub amenities: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoomImageRequest {
    pub url: String,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct RoomList {
    #[schema(value_type = Vec<Room>)]
    pub items: Vec<Room>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub room_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub available: bool,
    pub quote: StayQuote,
    pub total_price_display: String,
    pub conflicts: Vec<Conflict>,
}
