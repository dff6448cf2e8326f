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
    dto::{
        admin::{DashboardStats, StatusCount, UpdateUserRoleRequest, UserList},
        auth::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest,
            ResetPasswordRequest, ResetTokenResponse,
        },
        cart::{AddCartItemRequest, CartDto, CartItemDto, UpdateCartItemRequest},
        orders::{
            CreateOrderRequest, OrderItemRequest, OrderList, OrderWithItems,
            UpdateOrderStatusRequest,
        },
        products::{
            AddReviewRequest, CreateProductRequest, ProductDetail, ProductList,
            UpdateProductRequest,
        },
    },
    models::{Order, OrderItem, Product, Review, ShippingAddress, User},
    response::{ApiResponse, Pagination},
    routes::{admin, auth, cart, health, orders, products as product_routes},
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
        auth::register,
        auth::login,
        auth::login_as,
        auth::forgot_password,
        auth::reset_password,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        product_routes::add_review,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        orders::update_order_status,
        admin::dashboard_stats,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::list_users,
        admin::update_user_role
    ),
    components(
        schemas(
            User,
            Product,
            Review,
            Order,
            OrderItem,
            ShippingAddress,
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            ForgotPasswordRequest,
            ResetTokenResponse,
            ResetPasswordRequest,
            AddCartItemRequest,
            UpdateCartItemRequest,
            CartDto,
            CartItemDto,
            CreateOrderRequest,
            OrderItemRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            CreateProductRequest,
            UpdateProductRequest,
            AddReviewRequest,
            ProductList,
            ProductDetail,
            DashboardStats,
            StatusCount,
            UpdateUserRoleRequest,
            UserList,
            Pagination,
            ApiResponse<AuthResponse>,
            ApiResponse<ResetTokenResponse>,
            ApiResponse<User>,
            ApiResponse<UserList>,
            ApiResponse<Review>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartDto>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<DashboardStats>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Catalog and review endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Admin dashboard endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
