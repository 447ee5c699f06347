use serde::Deserialize;
use utoipa::ToSchema;

/// Absent fields are left unchanged; empty strings clear optional fields.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub hotel_name: Option<String>,
    pub tagline: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub currency: Option<String>,
    /// `HH:MM`
    pub check_in_time: Option<String>,
    /// `HH:MM`
    pub check_out_time: Option<String>,
}
