use hotel_booking_api::{
    db::{create_orm_conn, run_migrations},
    entity::{
        rooms::{ActiveModel as RoomActive, Column as RoomCol, Entity as Rooms},
        users::{Column as UserCol, Entity as Users},
    },
    models::Role,
    services::auth_service::{create_identity, hash_password},
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")?;

    let orm = create_orm_conn(&database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@example.com", "admin12345", "Hotel Admin", Role::Admin).await?;
    let member_id = ensure_user(&orm, "member@example.com", "member12345", "Regular Member", Role::Member).await?;
    seed_rooms(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, Member ID: {member_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    email: &str,
    password: &str,
    name: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        println!("User {email} already exists");
        return Ok(existing.id);
    }

    let password_hash = hash_password(password)?;
    let txn = orm.begin().await?;
    let profile = create_identity(
        &txn,
        email.to_string(),
        password_hash,
        name.to_string(),
        None,
        role,
    )
    .await?;
    txn.commit().await?;

    println!("Ensured user {email} (role={role})");
    Ok(profile.id)
}

async fn seed_rooms(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let rooms = vec![
        (
            "Garden Standard 101",
            "standard",
            "Quiet room facing the inner garden",
            2,
            85_00,
            vec!["wifi", "air conditioning", "shower"],
        ),
        (
            "Deluxe Sea View 204",
            "deluxe",
            "Balcony with a view over the bay",
            2,
            140_00,
            vec!["wifi", "balcony", "minibar", "bathtub"],
        ),
        (
            "Family Suite 301",
            "suite",
            "Two bedrooms and a lounge for families",
            5,
            260_00,
            vec!["wifi", "kitchenette", "sofa bed", "bathtub"],
        ),
        (
            "Single Economy 012",
            "single",
            "Compact room for solo travellers",
            1,
            55_00,
            vec!["wifi", "desk"],
        ),
    ];

    for (name, room_type, desc, capacity, price, amenities) in rooms {
        let exists = Rooms::find()
            .filter(RoomCol::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        RoomActive {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            room_type: Set(room_type.to_string()),
            description: Set(Some(desc.to_string())),
            capacity: Set(capacity),
            base_price: Set(price),
            images: Set(serde_json::json!([])),
            amenities: Set(serde_json::json!(amenities)),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded rooms");
    Ok(())
}
