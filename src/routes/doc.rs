use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    availability::{Conflict, DateRange},
    dto::{
        auth::{ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest},
        bookings::{BookingDetail, BookingList, CreateBookingRequest, UpdateBookingRequest},
        dashboard::{AdminDashboard, MemberDashboard, StatusCounts},
        rooms::{AvailabilityResponse, CreateRoomRequest, RoomImageRequest, RoomList, UpdateRoomRequest},
        settings::UpdateSettingsRequest,
        users::{CreateUserRequest, ProfileList, UpdateProfileRequest, UpdateUserRequest},
    },
    models::{Booking, BookingStatus, HotelSettings, Profile, Role, Room, UserStatus},
    pricing::StayQuote,
    response::{ApiResponse, Meta},
    routes::{admin, auth, bookings, health, me, params, rooms, settings},
    services::admin_service::{AuditLog, AuditLogList},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        auth::register,
        auth::login,
        auth::logout,
        auth::change_password,
        auth::session,
        rooms::list_rooms,
        rooms::get_room,
        rooms::room_availability,
        rooms::create_room,
        rooms::update_room,
        rooms::delete_room,
        rooms::upload_image,
        rooms::add_image_url,
        rooms::remove_image,
        bookings::create_booking,
        bookings::list_bookings,
        bookings::list_my_bookings,
        bookings::lookup_booking,
        bookings::get_booking,
        bookings::update_booking,
        bookings::confirm_booking,
        bookings::cancel_booking,
        bookings::delete_booking,
        me::get_profile,
        me::update_profile,
        me::dashboard,
        settings::get_settings,
        settings::update_settings,
        settings::invalidate_cache,
        admin::dashboard,
        admin::list_users,
        admin::create_user,
        admin::get_user,
        admin::update_user,
        admin::delete_user,
        admin::list_audit_logs
    ),
    components(
        schemas(
            Profile,
            Role,
            UserStatus,
            Room,
            Booking,
            BookingStatus,
            HotelSettings,
            StayQuote,
            DateRange,
            Conflict,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            ChangePasswordRequest,
            CreateRoomRequest,
            UpdateRoomRequest,
            RoomImageRequest,
            RoomList,
            AvailabilityResponse,
            CreateBookingRequest,
            UpdateBookingRequest,
            BookingDetail,
            BookingList,
            CreateUserRequest,
            UpdateUserRequest,
            UpdateProfileRequest,
            ProfileList,
            UpdateSettingsRequest,
            StatusCounts,
            AdminDashboard,
            MemberDashboard,
            AuditLog,
            AuditLogList,
            params::Pagination,
            params::SortOrder,
            params::RoomSortBy,
            params::BookingSortBy,
            Meta,
            ApiResponse<Room>,
            ApiResponse<RoomList>,
            ApiResponse<Booking>,
            ApiResponse<BookingList>,
            ApiResponse<BookingDetail>,
            ApiResponse<Profile>,
            ApiResponse<HotelSettings>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Sign-up, sessions and passwords"),
        (name = "Rooms", description = "Room catalogue, availability and images"),
        (name = "Bookings", description = "Reservations and their status"),
        (name = "Me", description = "Member area"),
        (name = "Settings", description = "Hotel contact and display settings"),
        (name = "Admin", description = "Admin dashboard, users and audit trail"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
