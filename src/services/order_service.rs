use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
    ActiveValue::NotSet,
    sea_query::{Expr, ExprTrait, LockType},
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems},
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus,
            PaymentStatus,
        },
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    response::{ApiResponse, Pagination},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Orders above this items subtotal ship free; below it a flat fee applies.
const FREE_SHIPPING_THRESHOLD: u32 = 5000;
const FLAT_SHIPPING_FEE: u32 = 100;
/// GST applied to the items subtotal.
const TAX_RATE_PERCENT: u32 = 18;

pub(crate) fn shipping_for(items_price: Decimal) -> Decimal {
    if items_price > Decimal::from(FREE_SHIPPING_THRESHOLD) {
        Decimal::ZERO
    } else {
        Decimal::from(FLAT_SHIPPING_FEE)
    }
}

pub(crate) fn tax_for(items_price: Decimal) -> Decimal {
    (items_price * Decimal::from(TAX_RATE_PERCENT) / Decimal::from(100)).round_dp(2)
}

pub(crate) fn format_order_number(seq: i64, now: DateTime<Utc>) -> String {
    format!("ORD-{}-{:05}", now.format("%Y%m"), seq)
}

/// Draw the next order number from a database sequence inside the creation
/// transaction; the unique index on order_number is the backstop.
async fn next_order_number(txn: &DatabaseTransaction) -> AppResult<String> {
    let row = txn
        .query_one(Statement::from_string(
            txn.get_database_backend(),
            "SELECT nextval('order_number_seq') AS seq".to_string(),
        ))
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order number sequence returned no row")))?;
    let seq: i64 = row.try_get("", "seq")?;
    Ok(format_order_number(seq, Utc::now()))
}

/// Inverse of the checkout-time decrement, driven by the order items'
/// snapshot quantities. Products deleted since the order simply match no row.
pub(crate) async fn restore_stock(txn: &DatabaseTransaction, order_id: Uuid) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(txn)
        .await?;

    for item in items {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .col_expr(
                ProdCol::InStock,
                Expr::col(ProdCol::Stock).add(item.quantity).gt(0),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(txn)
            .await?;
    }

    Ok(())
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.items.is_empty() {
        return Err(AppError::Validation("Order items are required".into()));
    }

    let txn = state.orm.begin().await?;

    let order_id = Uuid::new_v4();
    let mut items_price = Decimal::ZERO;
    let mut snapshots: Vec<OrderItemActive> = Vec::with_capacity(payload.items.len());

    for line in &payload.items {
        if line.quantity < 1 {
            return Err(AppError::Validation(
                "quantity must be greater than 0".into(),
            ));
        }

        let product = Products::find_by_id(line.product_id).one(&txn).await?;
        let product = match product {
            Some(p) => p,
            None => return Err(AppError::NotFound(format!("Product {}", line.product_id))),
        };

        // Check-and-decrement as one conditional statement: zero rows
        // affected means another checkout took the stock first, and the
        // whole transaction rolls back with it.
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
            .col_expr(
                ProdCol::InStock,
                Expr::col(ProdCol::Stock).sub(line.quantity).gt(0),
            )
            .filter(ProdCol::Id.eq(line.product_id))
            .filter(ProdCol::Stock.gte(line.quantity))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::InsufficientStock(product.name));
        }

        items_price += product.price * Decimal::from(line.quantity);

        snapshots.push(OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product.id),
            name: Set(product.name),
            price: Set(product.price),
            image: Set(product.image),
            quantity: Set(line.quantity),
            created_at: NotSet,
        });
    }

    let shipping_price = shipping_for(items_price);
    let tax_price = tax_for(items_price);
    let total_price = items_price + shipping_price + tax_price;

    let order_number = next_order_number(&txn).await?;

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        order_number: Set(order_number),
        status: Set(OrderStatus::Pending),
        payment_method: Set(payload.payment_method),
        payment_status: Set(PaymentStatus::Pending),
        shipping_name: Set(payload.shipping_address.name),
        shipping_address: Set(payload.shipping_address.address),
        shipping_city: Set(payload.shipping_address.city),
        shipping_state: Set(payload.shipping_address.state),
        shipping_pincode: Set(payload.shipping_address.pincode),
        shipping_phone: Set(payload.shipping_address.phone),
        items_price: Set(items_price),
        shipping_price: Set(shipping_price),
        tax_price: Set(tax_price),
        total_price: Set(total_price),
        delivered_at: Set(None),
        cancelled_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let item = snapshot.insert(&txn).await?;
        order_items.push(item.into());
    }

    // Checkout empties the purchaser's cart.
    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
    {
        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        let mut active: CartActive = cart.into();
        active.total_items = Set(0);
        active.total_price = Set(Decimal::ZERO);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "order_number": order.order_number })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order placed",
        OrderWithItems {
            order: order.into(),
            items: order_items,
        },
        None,
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Pagination::new(total, page, limit);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order".into())),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    Ok(ApiResponse::success(
        "Order",
        OrderWithItems {
            order: order.into(),
            items,
        },
        None,
    ))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order".into())),
    };

    if !order.status.customer_can_cancel() {
        return Err(AppError::InvalidTransition(format!(
            "Cannot cancel an order in {:?} status",
            order.status
        )));
    }

    // cancelled_at marks the stock as already restored; an order an admin
    // has moved out of Cancelled and back does not restore twice.
    if order.cancelled_at.is_none() {
        restore_stock(&txn, order.id).await?;
    }

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled);
    active.cancelled_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        OrderWithItems {
            order: order.into(),
            items,
        },
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn shipping_is_free_only_above_threshold() {
        assert_eq!(shipping_for(Decimal::from(6000)), Decimal::ZERO);
        assert_eq!(shipping_for(Decimal::from(5000)), Decimal::from(100));
        assert_eq!(shipping_for(Decimal::from(4000)), Decimal::from(100));
    }

    #[test]
    fn tax_is_18_percent_rounded_to_paise() {
        assert_eq!(tax_for(Decimal::from(6000)), Decimal::from(1080));
        assert_eq!(
            tax_for(Decimal::new(99999, 2)), // 999.99
            Decimal::new(18000, 2)           // 180.00
        );
    }

    #[test]
    fn order_totals_are_deterministic() {
        let items_price = Decimal::from(6000);
        let shipping = shipping_for(items_price);
        let tax = tax_for(items_price);
        assert_eq!(items_price + shipping + tax, Decimal::from(7080));
    }

    #[test]
    fn order_number_embeds_year_month_and_padded_sequence() {
        let now = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        assert_eq!(format_order_number(42, now), "ORD-202608-00042");
        assert_eq!(format_order_number(123_456, now), "ORD-202608-123456");
    }
}
