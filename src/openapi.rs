//! OpenAPI document and the Swagger UI mount.

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{entities, errors, handlers, services, sessions};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Online supermarket backend: catalog, session carts, transactional checkout, orders, and admin panel",
        version = env!("CARGO_PKG_VERSION"),
    ),
    paths(
        handlers::products::list_products,
        handlers::products::get_product,
        handlers::products::list_categories,
        handlers::cart::view_cart,
        handlers::cart::add_item,
        handlers::cart::update_item,
        handlers::cart::remove_item,
        handlers::cart::clear_cart,
        handlers::checkout::place_order,
        handlers::checkout::last_purchase,
        handlers::orders::order_history,
        handlers::orders::get_order,
        handlers::users::register,
        handlers::users::login,
        handlers::users::logout,
        handlers::users::profile,
        handlers::users::update_profile,
        handlers::admin::create_product,
        handlers::admin::update_product,
        handlers::admin::delete_product,
        handlers::admin::list_orders,
        handlers::admin::delete_order,
        handlers::admin::list_users,
        handlers::admin::update_user,
        handlers::admin::delete_user,
    ),
    components(schemas(
        entities::product::Model,
        entities::order::Model,
        entities::order_item::Model,
        entities::user::Model,
        errors::ErrorResponse,
        sessions::CartLine,
        sessions::SessionUser,
        services::cart::CartMutation,
        services::catalog::CreateProductInput,
        services::catalog::UpdateProductInput,
        services::checkout::PlacedItem,
        services::checkout::PlacedOrder,
        services::orders::OrderWithItems,
        services::users::RegisterInput,
        services::users::LoginInput,
        services::users::UpdateProfileInput,
        services::users::AdminUpdateUserInput,
        handlers::products::ProductPage,
        handlers::cart::AddToCartRequest,
        handlers::cart::UpdateCartLineRequest,
        handlers::cart::CartView,
    )),
    tags(
        (name = "catalog", description = "Public product browsing"),
        (name = "cart", description = "Session shopping cart"),
        (name = "checkout", description = "Transactional checkout"),
        (name = "orders", description = "Customer order history"),
        (name = "auth", description = "Accounts and sessions"),
        (name = "admin", description = "Administration panel"),
    )
)]
pub struct ApiDoc;

/// Swagger UI serving the generated document at `/docs`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
