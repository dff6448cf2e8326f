use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::{
        admin::{DashboardStats, StatusCount, UpdateUserRoleRequest, UserList},
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
    },
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus,
            PaymentStatus,
        },
        products::{Column as ProdCol, Entity as Products},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, User},
    response::{ApiResponse, Pagination},
    routes::params::{OrderListQuery, Pagination as PaginationQuery, SortOrder},
    services::order_service::restore_stock,
    state::AppState,
};

/// Products at or below this stock level count as low stock on the dashboard.
const LOW_STOCK_THRESHOLD: i32 = 5;

#[derive(Debug, FromQueryResult)]
struct RevenueRow {
    revenue: Option<Decimal>,
}

#[derive(Debug, FromQueryResult)]
struct StatusCountRow {
    status: OrderStatus,
    count: i64,
}

pub async fn dashboard_stats(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_admin(user)?;

    let total_users = Users::find().count(&state.orm).await? as i64;
    let total_products = Products::find().count(&state.orm).await? as i64;
    let total_orders = Orders::find().count(&state.orm).await? as i64;

    let revenue = Orders::find()
        .select_only()
        .column_as(Expr::col(OrderCol::TotalPrice).sum(), "revenue")
        .filter(OrderCol::Status.ne(OrderStatus::Cancelled))
        .into_model::<RevenueRow>()
        .one(&state.orm)
        .await?
        .and_then(|row| row.revenue)
        .unwrap_or(Decimal::ZERO);

    let orders_by_status = Orders::find()
        .select_only()
        .column(OrderCol::Status)
        .column_as(Expr::col(OrderCol::Id).count(), "count")
        .group_by(OrderCol::Status)
        .into_model::<StatusCountRow>()
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|row| StatusCount {
            status: row.status,
            count: row.count,
        })
        .collect();

    let low_stock_products = Products::find()
        .filter(ProdCol::Stock.lte(LOW_STOCK_THRESHOLD))
        .count(&state.orm)
        .await? as i64;

    Ok(ApiResponse::success(
        "Stats",
        DashboardStats {
            total_users,
            total_products,
            total_orders,
            revenue,
            orders_by_status,
            low_stock_products,
        },
        None,
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: PaginationQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find().order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    let meta = Pagination::new(total, page, limit);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

/// Role is fixed at registration; only an admin may change it afterwards.
pub async fn update_user_role(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRoleRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let existing = Users::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(u) => u,
        None => return Err(AppError::NotFound("User".into())),
    };

    let mut active: UserActive = existing.into();
    active.role = Set(payload.role);
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "user_role_update",
        Some("users"),
        Some(serde_json::json!({ "user_id": updated.id, "role": updated.role })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Role updated", updated.into(), None))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
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

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id).one(&state.orm).await?;
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

/// Admin transitions are not restricted to a forward-only progression;
/// only the side effects are guarded.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order".into())),
    };

    // cancelled_at doubles as the stock-restored marker. It survives a
    // Cancelled -> Processing -> Cancelled round trip, so one checkout
    // decrement is never restored twice.
    let stock_restored = order.cancelled_at.is_some();
    let now = Utc::now();

    let mut active: OrderActive = order.into();
    active.status = Set(payload.status);
    active.updated_at = Set(now.into());

    match payload.status {
        OrderStatus::Delivered => {
            active.delivered_at = Set(Some(now.into()));
            // COD orders are marked paid on delivery as well.
            active.payment_status = Set(PaymentStatus::Paid);
        }
        OrderStatus::Cancelled if !stock_restored => {
            active.cancelled_at = Set(Some(now.into()));
            restore_stock(&txn, id).await?;
        }
        _ => {}
    }

    let order = active.update(&txn).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Order updated", order.into(), None))
}
