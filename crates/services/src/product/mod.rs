//! Stock participant.

mod model;
mod repository;
mod service;

pub use model::{DecrStockRequest, NewProduct, Product, ProductTable};
pub use repository::ProductRepository;
pub use service::ProductService;
