use dental_store_api::{
    db::{create_orm_conn, run_migrations},
    dto::{
        auth::{ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest},
        cart::{AddCartItemRequest, UpdateCartItemRequest},
        orders::{CreateOrderRequest, OrderItemRequest, UpdateOrderStatusRequest},
    },
    entity::{
        orders::{OrderStatus, PaymentMethod, PaymentStatus},
        products::{ActiveModel as ProductActive, Category, Entity as Products},
        users::UserRole,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::ShippingAddress,
    services::{admin_service, auth_service, cart_service, order_service},
    state::AppState,
    token::TokenSigner,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, EntityTrait, Set};
use uuid::Uuid;

// Integration flows against a live Postgres. Each test seeds its own users
// and products with unique identifiers so the tests can share a database.
async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    Ok(Some(AppState {
        orm,
        tokens: TokenSigner::new("integration-test-secret"),
    }))
}

async fn register_customer(state: &AppState, tag: &str) -> anyhow::Result<AuthUser> {
    let suffix = Uuid::new_v4().simple().to_string();
    let response = auth_service::register(
        state,
        RegisterRequest {
            name: format!("{tag} tester"),
            email: format!("{tag}-{suffix}@example.com"),
            phone: format!("9{}", &suffix[..9]),
            password: "secret123".into(),
            role: None,
            address: Some("12 Clinic Road".into()),
            city: Some("Pune".into()),
            state: Some("MH".into()),
            pincode: Some("411001".into()),
        },
    )
    .await?;
    let user = response.data.expect("auth response").user;
    assert_eq!(user.role, UserRole::Customer);
    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

async fn seed_product(
    state: &AppState,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{name} {}", Uuid::new_v4().simple())),
        brand: Set("TestBrand".into()),
        category: Set(Category::Instruments),
        description: Set(Some("Integration test product".into())),
        price: Set(Decimal::from(price)),
        mrp: Set(Decimal::from(price + 200)),
        stock: Set(stock),
        in_stock: Set(stock > 0),
        rating: Set(Decimal::ZERO),
        num_reviews: Set(0),
        image: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

fn test_address() -> ShippingAddress {
    ShippingAddress {
        name: "Dr. Tester".into(),
        address: "12 Clinic Road".into(),
        city: "Pune".into(),
        state: "MH".into(),
        pincode: "411001".into(),
        phone: "9876543210".into(),
    }
}

#[tokio::test]
async fn cart_and_checkout_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = register_customer(&state, "checkout").await?;

    // Registration created an empty cart.
    let cart = cart_service::get_cart(&state, &customer)
        .await?
        .data
        .expect("cart");
    assert_eq!(cart.total_items, 0);
    assert!(cart.items.is_empty());

    let product_id = seed_product(&state, "Scaler", 3000, 10).await?;

    // Adding the same product twice merges into one line.
    cart_service::add_item(
        &state,
        &customer,
        AddCartItemRequest {
            product_id,
            quantity: Some(1),
        },
    )
    .await?;
    let cart = cart_service::add_item(
        &state,
        &customer,
        AddCartItemRequest {
            product_id,
            quantity: None,
        },
    )
    .await?
    .data
    .expect("cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.total_items, 2);
    assert_eq!(cart.total_price, Decimal::from(6000));

    let order = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            items: vec![OrderItemRequest {
                product_id,
                quantity: 2,
            }],
            shipping_address: test_address(),
            payment_method: PaymentMethod::Cod,
        },
    )
    .await?
    .data
    .expect("order");

    // 6000 subtotal clears the free shipping threshold; 18% tax applies.
    assert_eq!(order.order.items_price, Decimal::from(6000));
    assert_eq!(order.order.shipping_price, Decimal::ZERO);
    assert_eq!(order.order.tax_price, Decimal::from(1080));
    assert_eq!(order.order.total_price, Decimal::from(7080));
    assert_eq!(order.order.status, OrderStatus::Pending);
    assert_eq!(order.order.payment_status, PaymentStatus::Pending);
    assert!(order.order.order_number.starts_with("ORD-"));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 2);

    // Checkout decremented stock and emptied the cart.
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(product.stock, 8);
    assert!(product.in_stock);

    let cart = cart_service::get_cart(&state, &customer)
        .await?
        .data
        .expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_price, Decimal::ZERO);

    Ok(())
}

#[tokio::test]
async fn cart_totals_follow_updates_and_removals() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = register_customer(&state, "totals").await?;
    let probe_id = seed_product(&state, "Burs", 100, 50).await?;
    let tray_id = seed_product(&state, "Tray", 250, 50).await?;

    cart_service::add_item(
        &state,
        &customer,
        AddCartItemRequest {
            product_id: probe_id,
            quantity: Some(2),
        },
    )
    .await?;
    let cart = cart_service::add_item(
        &state,
        &customer,
        AddCartItemRequest {
            product_id: tray_id,
            quantity: Some(1),
        },
    )
    .await?
    .data
    .expect("cart");
    assert_eq!(cart.total_items, 3);
    assert_eq!(cart.total_price, Decimal::from(450));

    let burs_line = cart
        .items
        .iter()
        .find(|item| item.product.id == probe_id)
        .expect("burs line");
    let tray_line = cart
        .items
        .iter()
        .find(|item| item.product.id == tray_id)
        .expect("tray line");

    let cart = cart_service::update_item(
        &state,
        &customer,
        burs_line.id,
        UpdateCartItemRequest { quantity: 5 },
    )
    .await?
    .data
    .expect("cart");
    assert_eq!(cart.total_items, 6);
    assert_eq!(cart.total_price, Decimal::from(750));

    let cart = cart_service::remove_item(&state, &customer, tray_line.id)
        .await?
        .data
        .expect("cart");
    assert_eq!(cart.total_items, 5);
    assert_eq!(cart.total_price, Decimal::from(500));

    let cart = cart_service::clear_cart(&state, &customer)
        .await?
        .data
        .expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_items, 0);
    assert_eq!(cart.total_price, Decimal::ZERO);

    Ok(())
}

#[tokio::test]
async fn cart_line_resnapshots_price_on_readd_and_update() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = register_customer(&state, "reprice").await?;
    let product_id = seed_product(&state, "Composite", 100, 50).await?;

    let cart = cart_service::add_item(
        &state,
        &customer,
        AddCartItemRequest {
            product_id,
            quantity: Some(1),
        },
    )
    .await?
    .data
    .expect("cart");
    assert_eq!(cart.items[0].price, Decimal::from(100));

    set_product_price(&state, product_id, 150).await?;

    // Re-adding refreshes the snapshot to the current price.
    let cart = cart_service::add_item(
        &state,
        &customer,
        AddCartItemRequest {
            product_id,
            quantity: Some(1),
        },
    )
    .await?
    .data
    .expect("cart");
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.items[0].price, Decimal::from(150));
    assert_eq!(cart.total_price, Decimal::from(300));

    set_product_price(&state, product_id, 200).await?;

    // So does a quantity update.
    let cart = cart_service::update_item(
        &state,
        &customer,
        cart.items[0].id,
        UpdateCartItemRequest { quantity: 2 },
    )
    .await?
    .data
    .expect("cart");
    assert_eq!(cart.items[0].price, Decimal::from(200));
    assert_eq!(cart.total_price, Decimal::from(400));

    Ok(())
}

async fn set_product_price(state: &AppState, id: Uuid, price: i64) -> anyhow::Result<()> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product");
    let mut active: ProductActive = product.into();
    active.price = Set(Decimal::from(price));
    active.update(&state.orm).await?;
    Ok(())
}

#[tokio::test]
async fn checkout_rejects_insufficient_stock_atomically() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = register_customer(&state, "oversell").await?;
    let scarce_id = seed_product(&state, "Autoclave", 60000, 1).await?;
    let plenty_id = seed_product(&state, "Gloves", 500, 50).await?;

    let err = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            items: vec![
                OrderItemRequest {
                    product_id: plenty_id,
                    quantity: 5,
                },
                OrderItemRequest {
                    product_id: scarce_id,
                    quantity: 2,
                },
            ],
            shipping_address: test_address(),
            payment_method: PaymentMethod::Upi,
        },
    )
    .await
    .expect_err("oversell must fail");
    assert!(matches!(err, AppError::InsufficientStock(_)));

    // The earlier line's decrement rolled back with the transaction.
    let plenty = Products::find_by_id(plenty_id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(plenty.stock, 50);
    let scarce = Products::find_by_id(scarce_id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(scarce.stock, 1);

    Ok(())
}

#[tokio::test]
async fn cancel_restores_stock_and_guards_late_states() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = register_customer(&state, "cancel").await?;
    let product_id = seed_product(&state, "Curette", 800, 10).await?;

    let order = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            items: vec![OrderItemRequest {
                product_id,
                quantity: 3,
            }],
            shipping_address: test_address(),
            payment_method: PaymentMethod::Card,
        },
    )
    .await?
    .data
    .expect("order");

    let cancelled = order_service::cancel_order(&state, &customer, order.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert!(cancelled.order.cancelled_at.is_some());

    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(product.stock, 10);

    // A cancelled order cannot be cancelled again.
    let err = order_service::cancel_order(&state, &customer, order.order.id)
        .await
        .expect_err("second cancel must fail");
    assert!(matches!(err, AppError::InvalidTransition(_)));

    Ok(())
}

#[tokio::test]
async fn admin_delivery_marks_cod_order_paid() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = register_customer(&state, "deliver").await?;
    let admin = AuthUser {
        user_id: customer.user_id,
        role: UserRole::Admin,
    };
    let product_id = seed_product(&state, "Mirror", 250, 20).await?;

    let order = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            items: vec![OrderItemRequest {
                product_id,
                quantity: 1,
            }],
            shipping_address: test_address(),
            payment_method: PaymentMethod::Cod,
        },
    )
    .await?
    .data
    .expect("order");

    // Non-admins cannot touch order status.
    let err = admin_service::update_order_status(
        &state,
        &customer,
        order.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
        },
    )
    .await
    .expect_err("customer must be rejected");
    assert!(matches!(err, AppError::Forbidden));

    let delivered = admin_service::update_order_status(
        &state,
        &admin,
        order.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Delivered,
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert_eq!(delivered.payment_status, PaymentStatus::Paid);
    assert!(delivered.delivered_at.is_some());

    Ok(())
}

#[tokio::test]
async fn role_filtered_login_rejects_other_roles() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let suffix = Uuid::new_v4().simple().to_string();
    let email = format!("rolegate-{suffix}@example.com");
    auth_service::register(
        &state,
        RegisterRequest {
            name: "Role tester".into(),
            email: email.clone(),
            phone: format!("7{}", &suffix[..9]),
            password: "secret123".into(),
            role: None,
            address: None,
            city: None,
            state: None,
            pincode: None,
        },
    )
    .await?;

    // Valid credentials through the wrong role's login are forbidden, not
    // unauthorized.
    let err = auth_service::login(
        &state,
        LoginRequest {
            email: email.clone(),
            password: "secret123".into(),
        },
        Some(UserRole::Admin),
    )
    .await
    .expect_err("customer must not pass the admin gate");
    assert!(matches!(err, AppError::Forbidden));

    let response = auth_service::login(
        &state,
        LoginRequest {
            email,
            password: "secret123".into(),
        },
        Some(UserRole::Customer),
    )
    .await?
    .data
    .expect("auth response");
    assert_eq!(response.user.role, UserRole::Customer);

    Ok(())
}

#[tokio::test]
async fn admin_cancel_round_trip_restores_stock_once() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = register_customer(&state, "roundtrip").await?;
    let admin = AuthUser {
        user_id: customer.user_id,
        role: UserRole::Admin,
    };
    let product_id = seed_product(&state, "Articulator", 4000, 10).await?;

    let order = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            items: vec![OrderItemRequest {
                product_id,
                quantity: 3,
            }],
            shipping_address: test_address(),
            payment_method: PaymentMethod::Upi,
        },
    )
    .await?
    .data
    .expect("order");

    for status in [
        OrderStatus::Cancelled,
        OrderStatus::Processing,
        OrderStatus::Cancelled,
    ] {
        admin_service::update_order_status(
            &state,
            &admin,
            order.order.id,
            UpdateOrderStatusRequest { status },
        )
        .await?;
    }

    // One checkout decrement, one restore, regardless of the round trip.
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .expect("product");
    assert_eq!(product.stock, 10);

    Ok(())
}

#[tokio::test]
async fn password_reset_token_is_single_use() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let suffix = Uuid::new_v4().simple().to_string();
    let email = format!("reset-{suffix}@example.com");
    auth_service::register(
        &state,
        RegisterRequest {
            name: "Reset tester".into(),
            email: email.clone(),
            phone: format!("8{}", &suffix[..9]),
            password: "oldpassword".into(),
            role: None,
            address: None,
            city: None,
            state: None,
            pincode: None,
        },
    )
    .await?;

    let token = auth_service::forgot_password(
        &state,
        ForgotPasswordRequest {
            email: email.clone(),
        },
    )
    .await?
    .data
    .expect("token response")
    .token;

    auth_service::reset_password(
        &state,
        &token,
        ResetPasswordRequest {
            password: "newpassword".into(),
        },
    )
    .await?;

    // Second use of the same token is rejected.
    let err = auth_service::reset_password(
        &state,
        &token,
        ResetPasswordRequest {
            password: "another".into(),
        },
    )
    .await
    .expect_err("reused token must fail");
    assert!(matches!(err, AppError::InvalidToken));

    // The old password no longer works, the new one does.
    let err = auth_service::login(
        &state,
        LoginRequest {
            email: email.clone(),
            password: "oldpassword".into(),
        },
        None,
    )
    .await
    .expect_err("old password must fail");
    assert!(matches!(err, AppError::Unauthorized(_)));

    auth_service::login(
        &state,
        LoginRequest {
            email,
            password: "newpassword".into(),
        },
        None,
    )
    .await?;

    Ok(())
}
