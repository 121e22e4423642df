use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub stock: i64,
    /// Unit price in cents.
    pub amount: i64,
    pub status: i16,
}

/// Fields of a product to seed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stock: i64,
    pub amount: i64,
}

/// Payload of the decrease-stock branch and its compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecrStockRequest {
    pub id: i64,
    pub num: i64,
}

/// Product rows of the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct ProductTable {
    pub(crate) products: BTreeMap<i64, Product>,
    pub(crate) next_id: i64,
}

impl ProductTable {
    pub fn insert(&mut self, product: NewProduct) -> Product {
        self.next_id += 1;
        let row = Product {
            id: self.next_id,
            name: product.name,
            description: product.description,
            stock: product.stock,
            amount: product.amount,
            status: 0,
        };
        self.products.insert(row.id, row.clone());
        row
    }

    pub fn get(&self, id: i64) -> Option<&Product> {
        self.products.get(&id)
    }

    /// Applies `delta` to the stock unless that would make it negative.
    /// Returns the number of rows changed.
    pub fn adjust_stock(&mut self, id: i64, delta: i64) -> u64 {
        let Some(product) = self.products.get_mut(&id) else {
            return 0;
        };
        match product.stock.checked_add(delta) {
            Some(stock) if stock >= 0 => {
                product.stock = stock;
                1
            }
            _ => 0,
        }
    }
}
