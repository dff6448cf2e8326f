use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    cart_items, carts, order_items, orders,
    orders::{OrderStatus, PaymentMethod, PaymentStatus},
    products,
    products::Category,
    reviews, users,
    users::UserRole,
};

/// Public view of a user; the password hash never leaves the entity layer.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: UserRole,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub dental_coins: i32,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            role: model.role,
            address: model.address,
            city: model.city,
            state: model.state,
            pincode: model.pincode,
            dental_coins: model.dental_coins,
            profile_image: model.profile_image,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub category: Category,
    pub description: Option<String>,
    pub price: Decimal,
    pub mrp: Decimal,
    /// Derived from price vs MRP; never stored.
    pub discount_percent: Decimal,
    pub stock: i32,
    pub in_stock: bool,
    pub rating: Decimal,
    pub num_reviews: i32,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn discount_percent(price: Decimal, mrp: Decimal) -> Decimal {
    if mrp <= Decimal::ZERO || price >= mrp {
        return Decimal::ZERO;
    }
    ((mrp - price) / mrp * Decimal::from(100)).round_dp(0)
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            brand: model.brand,
            category: model.category,
            description: model.description,
            discount_percent: discount_percent(model.price, model.mrp),
            price: model.price,
            mrp: model.mrp,
            stock: model.stock,
            in_stock: model.in_stock,
            rating: model.rating,
            num_reviews: model.num_reviews,
            image: model.image,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<reviews::Model> for Review {
    fn from(model: reviews::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            product_id: model.product_id,
            rating: model.rating,
            comment: model.comment,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_items: i32,
    pub total_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<carts::Model> for Cart {
    fn from(model: carts::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            total_items: model.total_items,
            total_price: model.total_price,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

impl From<cart_items::Model> for CartItem {
    fn from(model: cart_items::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            quantity: model.quantity,
            price: model.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub shipping_address: ShippingAddress,
    pub items_price: Decimal,
    pub shipping_price: Decimal,
    pub tax_price: Decimal,
    pub total_price: Decimal,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            order_number: model.order_number,
            status: model.status,
            payment_method: model.payment_method,
            payment_status: model.payment_status,
            shipping_address: ShippingAddress {
                name: model.shipping_name,
                address: model.shipping_address,
                city: model.shipping_city,
                state: model.shipping_state,
                pincode: model.shipping_pincode,
                phone: model.shipping_phone,
            },
            items_price: model.items_price,
            shipping_price: model.shipping_price,
            tax_price: model.tax_price,
            total_price: model.total_price,
            delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
            cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub quantity: i32,
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            name: model.name,
            price: model.price,
            image: model.image,
            quantity: model.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_derives_from_mrp_gap() {
        assert_eq!(
            discount_percent(Decimal::from(750), Decimal::from(1000)),
            Decimal::from(25)
        );
    }

    #[test]
    fn discount_is_zero_without_a_markdown() {
        assert_eq!(
            discount_percent(Decimal::from(1000), Decimal::from(1000)),
            Decimal::ZERO
        );
        assert_eq!(
            discount_percent(Decimal::from(1200), Decimal::from(1000)),
            Decimal::ZERO
        );
        assert_eq!(
            discount_percent(Decimal::from(10), Decimal::ZERO),
            Decimal::ZERO
        );
    }
}
