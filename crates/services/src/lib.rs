//! Saga participants of the mall: a product service that reserves stock and
//! an order service that records orders, plus the checkout saga tying them
//! together.
//!
//! Each participant runs its business mutation under a
//! [`barrier::BranchBarrier`] on storage that implements both its repository
//! trait and [`barrier::BarrierStore`], so a branch call and its barrier
//! record commit in one transaction.

pub mod checkout;
pub mod error;
pub mod order;
pub mod product;

pub use checkout::{
    CheckoutEndpoints, CheckoutRequest, checkout, checkout_saga, register_participants,
};
pub use error::{Result, ServiceError};
pub use order::{
    AllowAllUsers, CreateOrderRequest, KnownUsers, Order, OrderRepository, OrderService,
    OrderStatus, OrderTable, UserDirectory,
};
pub use product::{
    DecrStockRequest, NewProduct, Product, ProductRepository, ProductService, ProductTable,
};
