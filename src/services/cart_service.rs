use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    ActiveValue::NotSet,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddCartItemRequest, CartDto, CartItemDto, UpdateCartItemRequest},
    entity::{
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    state::AppState,
};

/// Fetch the user's cart inside a transaction, locked for the duration of the
/// mutate-then-recompute sequence; create it if the user has none yet.
async fn cart_for_update(txn: &DatabaseTransaction, user_id: Uuid) -> AppResult<CartModel> {
    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(txn)
        .await?
    {
        return Ok(cart);
    }

    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total_items: Set(0),
        total_price: Set(Decimal::ZERO),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;
    Ok(cart)
}

#[derive(Debug, FromQueryResult)]
struct CartTotals {
    total_items: Option<i64>,
    total_price: Option<Decimal>,
}

/// The cart's `total_items`/`total_price` columns are caches; the item rows
/// are the source of truth. One aggregate query inside the mutating
/// transaction keeps them from ever diverging.
async fn recompute_totals(txn: &DatabaseTransaction, cart_id: Uuid) -> AppResult<()> {
    let totals = CartItems::find()
        .select_only()
        .column_as(Expr::col(CartItemCol::Quantity).sum(), "total_items")
        .column_as(
            Expr::expr(Expr::col(CartItemCol::Price).mul(Expr::col(CartItemCol::Quantity))).sum(),
            "total_price",
        )
        .filter(CartItemCol::CartId.eq(cart_id))
        .into_model::<CartTotals>()
        .one(txn)
        .await?
        .unwrap_or(CartTotals {
            total_items: None,
            total_price: None,
        });

    let cart = Carts::find_by_id(cart_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart".into()))?;
    let mut active: CartActive = cart.into();
    active.total_items = Set(totals.total_items.unwrap_or(0) as i32);
    active.total_price = Set(totals.total_price.unwrap_or(Decimal::ZERO));
    active.updated_at = Set(Utc::now().into());
    active.update(txn).await?;

    Ok(())
}

/// Authoritative post-mutation read-back: the cart row plus every line joined
/// with its product.
async fn load_cart_dto<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> AppResult<CartDto> {
    let cart = Carts::find_by_id(cart_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart".into()))?;

    let rows = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart_id))
        .find_also_related(Products)
        .order_by_desc(CartItemCol::CreatedAt)
        .all(conn)
        .await?;

    let items = rows
        .into_iter()
        .filter_map(|(item, product)| {
            product.map(|p| CartItemDto {
                id: item.id,
                product: p.into(),
                quantity: item.quantity,
                price: item.price,
            })
        })
        .collect();

    Ok(CartDto {
        id: cart.id,
        total_items: cart.total_items,
        total_price: cart.total_price,
        items,
    })
}

/// Fetch-or-create: an empty cart is a valid state and this never errors for
/// a missing cart.
pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let cart = match Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
    {
        Some(cart) => cart,
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                total_items: Set(0),
                total_price: Set(Decimal::ZERO),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(&state.orm)
            .await?
        }
    };

    let dto = load_cart_dto(&state.orm, cart.id).await?;
    Ok(ApiResponse::success("OK", dto, None))
}

pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddCartItemRequest,
) -> AppResult<ApiResponse<CartDto>> {
    let quantity = payload.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(AppError::Validation(
            "quantity must be greater than 0".into(),
        ));
    }

    let txn = state.orm.begin().await?;
    let cart = cart_for_update(&txn, user.user_id).await?;

    let product = Products::find_by_id(payload.product_id).one(&txn).await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound("Product".into())),
    };

    if product.stock < quantity {
        return Err(AppError::InsufficientStock(product.name));
    }

    let exist = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::CartId.eq(cart.id))
                .add(CartItemCol::ProductId.eq(product.id)),
        )
        .one(&txn)
        .await?;

    match exist {
        // Re-adding increments the existing line and refreshes the price
        // snapshot; only the requested delta is checked against stock, not
        // the incremented total.
        Some(item) => {
            let new_quantity = item.quantity + quantity;
            let mut active: CartItemActive = item.into();
            active.quantity = Set(new_quantity);
            active.price = Set(product.price);
            active.update(&txn).await?;
        }
        None => {
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(quantity),
                // Price snapshot at add time.
                price: Set(product.price),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;
        }
    }

    recompute_totals(&txn, cart.id).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let dto = load_cart_dto(&state.orm, cart.id).await?;
    Ok(ApiResponse::success("Added to cart", dto, None))
}

pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartDto>> {
    if payload.quantity < 1 {
        return Err(AppError::Validation(
            "quantity must be greater than 0".into(),
        ));
    }

    let txn = state.orm.begin().await?;
    let cart = cart_for_update(&txn, user.user_id).await?;

    let item = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::Id.eq(item_id))
                .add(CartItemCol::CartId.eq(cart.id)),
        )
        .one(&txn)
        .await?;
    let item = match item {
        Some(i) => i,
        None => return Err(AppError::NotFound("Cart item".into())),
    };

    let product = Products::find_by_id(item.product_id).one(&txn).await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound("Product".into())),
    };

    // Checked against current stock, not reserved stock.
    if payload.quantity > product.stock {
        return Err(AppError::InsufficientStock(product.name));
    }

    // Updating a line re-snapshots the price along with the quantity.
    let mut active: CartItemActive = item.into();
    active.quantity = Set(payload.quantity);
    active.price = Set(product.price);
    active.update(&txn).await?;

    recompute_totals(&txn, cart.id).await?;
    txn.commit().await?;

    let dto = load_cart_dto(&state.orm, cart.id).await?;
    Ok(ApiResponse::success("Cart updated", dto, None))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartDto>> {
    let txn = state.orm.begin().await?;
    let cart = cart_for_update(&txn, user.user_id).await?;

    let result = CartItems::delete_many()
        .filter(
            Condition::all()
                .add(CartItemCol::Id.eq(item_id))
                .add(CartItemCol::CartId.eq(cart.id)),
        )
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Cart item".into()));
    }

    recompute_totals(&txn, cart.id).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let dto = load_cart_dto(&state.orm, cart.id).await?;
    Ok(ApiResponse::success("Removed from cart", dto, None))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let txn = state.orm.begin().await?;
    let cart = cart_for_update(&txn, user.user_id).await?;

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    let mut active: CartActive = cart.clone().into();
    active.total_items = Set(0);
    active.total_price = Set(Decimal::ZERO);
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    txn.commit().await?;

    let dto = load_cart_dto(&state.orm, cart.id).await?;
    Ok(ApiResponse::success("Cart cleared", dto, None))
}
