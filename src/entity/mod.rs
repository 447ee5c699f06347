pub mod audit_logs;
pub mod bookings;
pub mod hotel_settings;
pub mod profiles;
pub mod rooms;
pub mod sessions;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use bookings::Entity as Bookings;
pub use hotel_settings::Entity as HotelSettings;
pub use profiles::Entity as Profiles;
pub use rooms::Entity as Rooms;
pub use sessions::Entity as Sessions;
pub use users::Entity as Users;
