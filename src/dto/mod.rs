pub mod auth;
pub mod bookings;
pub mod dashboard;
pub mod rooms;
pub mod settings;
pub mod users;
