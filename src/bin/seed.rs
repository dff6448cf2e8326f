use dental_store_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{carts, products, users},
    services::auth_service,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter, Set,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(
        &orm,
        "admin@dentalstore.test",
        "9000000001",
        "admin123",
        users::UserRole::Admin,
    )
    .await?;
    let customer_id = ensure_user(
        &orm,
        "customer@dentalstore.test",
        "9000000002",
        "customer123",
        users::UserRole::Customer,
    )
    .await?;
    seed_products(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, Customer ID: {customer_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    email: &str,
    phone: &str,
    password: &str,
    role: users::UserRole,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(orm)
        .await?
    {
        println!("User {email} already present");
        return Ok(existing.id);
    }

    let password_hash = auth_service::hash_password(password)?;
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(email.split('@').next().unwrap_or("user").to_string()),
        email: Set(email.to_string()),
        phone: Set(phone.to_string()),
        password_hash: Set(password_hash),
        role: Set(role.clone()),
        dental_coins: Set(0),
        ..Default::default()
    }
    .insert(orm)
    .await?;

    carts::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        total_items: Set(0),
        total_price: Set(Decimal::ZERO),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(orm)
    .await?;

    println!("Created user {email} (role={role:?})");
    Ok(user.id)
}

async fn seed_products(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let catalog: Vec<(&str, &str, products::Category, &str, i64, i64, i32)> = vec![
        (
            "Extraction Forceps #150",
            "MedDent",
            products::Category::Instruments,
            "Upper universal extraction forceps, stainless steel",
            1250,
            1500,
            40,
        ),
        (
            "Light Cure Composite Kit",
            "DentAll",
            products::Category::Consumables,
            "Nano-hybrid composite, shades A1-A3.5",
            3200,
            3800,
            25,
        ),
        (
            "Autoclave Class B 18L",
            "SteriMax",
            products::Category::Sterilization,
            "Vacuum autoclave with drying cycle",
            58000,
            65000,
            5,
        ),
        (
            "NiTi Rotary Files 25/.06",
            "EndoPro",
            products::Category::Endodontics,
            "Pack of 6, 21mm",
            950,
            1100,
            120,
        ),
        (
            "Orthodontic Bracket Kit MBT",
            "OrthoLine",
            products::Category::Orthodontics,
            "0.022 slot, 20 brackets with hooks",
            1800,
            2200,
            60,
        ),
    ];

    for (name, brand, category, description, price, mrp, stock) in catalog {
        let exists = products::Entity::find()
            .filter(products::Column::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        products::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            brand: Set(brand.to_string()),
            category: Set(category),
            description: Set(Some(description.to_string())),
            price: Set(Decimal::new(price, 0)),
            mrp: Set(Decimal::new(mrp, 0)),
            stock: Set(stock),
            in_stock: Set(stock > 0),
            rating: Set(Decimal::ZERO),
            num_reviews: Set(0),
            image: Set(None),
            created_at: NotSet,
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
