//! Order participant.

mod model;
mod repository;
mod service;
mod users;

pub use model::{CreateOrderRequest, Order, OrderStatus, OrderTable};
pub use repository::OrderRepository;
pub use service::OrderService;
pub use users::{AllowAllUsers, KnownUsers, UserDirectory};
