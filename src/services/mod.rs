pub mod admin_service;
pub mod auth_service;
pub mod booking_service;
pub mod dashboard_service;
pub mod room_service;
pub mod settings_service;
pub mod user_service;
