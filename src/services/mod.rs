pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod users;

pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use users::UserService;
