use hotel_booking_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        auth::{ChangePasswordRequest, LoginRequest, RegisterRequest},
        users::UpdateUserRequest,
    },
    entity::sessions::{Column as SessionCol, Entity as Sessions},
    error::AppError,
    middleware::auth::{AuthUser, decode_claims},
    models::{Role, UserStatus},
    services::{
        auth_service::{self, create_identity, hash_password},
        user_service,
    },
    state::AppState,
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Statement};
use uuid::Uuid;

// Integration flow: sign up, log in, change password, get deactivated by an admin.
#[tokio::test]
async fn sessions_follow_login_logout_and_deactivation() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let registered = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "  Guest@Example.com ".into(),
            password: "password123".into(),
            name: "Guest".into(),
            phone: None,
        },
    )
    .await?
    .data
    .expect("profile");
    assert_eq!(registered.email, "guest@example.com");
    assert_eq!(registered.role, Role::User);

    let duplicate = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "guest@example.com".into(),
            password: "password123".into(),
            name: "Again".into(),
            phone: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

    // Skipping the pre-insert check still hits the unique index as a 409.
    let raced = create_identity(
        &state.orm,
        "guest@example.com".into(),
        hash_password("password123")?,
        "Twin".into(),
        None,
        Role::User,
    )
    .await;
    assert!(matches!(raced, Err(AppError::Conflict(_))));

    let (a, b) = tokio::join!(
        auth_service::register_user(&state, signup("twin@example.com")),
        auth_service::register_user(&state, signup("twin@example.com")),
    );
    assert!(a.is_ok() != b.is_ok(), "exactly one sign-up should win");
    for result in [&a, &b] {
        if let Err(err) = result {
            assert!(
                matches!(err, AppError::BadRequest(_) | AppError::Conflict(_)),
                "unexpected error {err:?}"
            );
        }
    }

    let wrong = auth_service::login_user(&state, login("guest@example.com", "nope-nope")).await;
    assert!(matches!(wrong, Err(AppError::BadRequest(_))));

    let first = login_as(&state, "guest@example.com", "password123").await?;
    let _second = login_as(&state, "guest@example.com", "password123").await?;
    assert_eq!(live_sessions(&state, registered.id).await?, 2);

    // Logging out revokes only the current session.
    auth_service::logout_user(&state, &first).await?;
    assert_eq!(live_sessions(&state, registered.id).await?, 1);

    // Changing the password keeps the caller's session and ends the others.
    let third = login_as(&state, "guest@example.com", "password123").await?;
    auth_service::change_password(
        &state,
        &third,
        ChangePasswordRequest {
            current_password: "password123".into(),
            new_password: "new-password456".into(),
        },
    )
    .await?;
    assert_eq!(live_sessions(&state, registered.id).await?, 1);
    let old = auth_service::login_user(&state, login("guest@example.com", "password123")).await;
    assert!(matches!(old, Err(AppError::BadRequest(_))));

    // Admin deactivates the user; sessions end and login is refused.
    let admin_profile = create_identity(
        &state.orm,
        "admin@example.com".into(),
        hash_password("admin12345")?,
        "Admin".into(),
        None,
        Role::Admin,
    )
    .await?;
    let admin = AuthUser {
        user_id: admin_profile.id,
        role: Role::Admin,
        session_id: Uuid::new_v4(),
    };

    let self_demotion = user_service::update_user(
        &state,
        &admin,
        admin.user_id,
        UpdateUserRequest {
            role: Some(Role::User),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(self_demotion, Err(AppError::BadRequest(_))));

    let deactivated = user_service::update_user(
        &state,
        &admin,
        registered.id,
        UpdateUserRequest {
            status: Some(UserStatus::Inactive),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("profile");
    assert_eq!(deactivated.status, UserStatus::Inactive);
    assert_eq!(live_sessions(&state, registered.id).await?, 0);

    let refused =
        auth_service::login_user(&state, login("guest@example.com", "new-password456")).await;
    assert!(matches!(refused, Err(AppError::Forbidden)));

    Ok(())
}

fn signup(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: "password123".into(),
        name: "Twin".into(),
        phone: None,
    }
}

fn login(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

async fn login_as(state: &AppState, email: &str, password: &str) -> anyhow::Result<AuthUser> {
    let resp = auth_service::login_user(state, login(email, password))
        .await?
        .data
        .expect("login");
    let token = resp.token.trim_start_matches("Bearer ");
    let claims = decode_claims(token, &state.config.jwt_secret)?;

    Ok(AuthUser {
        user_id: claims.sub.parse()?,
        role: claims.role.parse()?,
        session_id: claims.sid.parse()?,
    })
}

async fn live_sessions(state: &AppState, user_id: Uuid) -> anyhow::Result<usize> {
    let sessions = Sessions::find()
        .filter(SessionCol::UserId.eq(user_id))
        .filter(SessionCol::RevokedAt.is_null())
        .all(&state.orm)
        .await?;
    Ok(sessions.len())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE audit_logs, bookings, sessions, profiles, users, rooms CASCADE",
    ))
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 3000,
        jwt_secret: "test-secret".into(),
        jwt_ttl_hours: 1,
        storage_dir: std::env::temp_dir()
            .join(format!("hotel-auth-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned(),
        public_base_url: "http://127.0.0.1:3000".into(),
        max_upload_bytes: 1024 * 1024,
    };

    Ok(AppState::new(pool, orm, config))
}
