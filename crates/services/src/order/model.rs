use std::collections::HashMap;

use common::Gid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Cancelled,
}

impl OrderStatus {
    /// Stored status code.
    pub fn code(self) -> i16 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::Cancelled => 9,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(OrderStatus::Created),
            9 => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// An order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Saga that created the order.
    pub gid: Gid,
    pub uid: i64,
    pub pid: i64,
    pub amount: i64,
    pub status: OrderStatus,
}

/// Payload of the create-order branch and its compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub uid: i64,
    pub pid: i64,
    pub amount: i64,
}

/// Order rows of the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct OrderTable {
    pub(crate) orders: HashMap<Uuid, Order>,
}

impl OrderTable {
    pub fn insert(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn get(&self, id: Uuid) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Orders created by `gid`, oldest id first.
    pub fn find_by_gid(&self, gid: &Gid) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|order| &order.gid == gid)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id);
        orders
    }

    /// Cancels every live order of `gid`. Returns the number changed.
    pub fn cancel_by_gid(&mut self, gid: &Gid) -> u64 {
        let mut changed = 0;
        for order in self.orders.values_mut() {
            if &order.gid == gid && order.status == OrderStatus::Created {
                order.status = OrderStatus::Cancelled;
                changed += 1;
            }
        }
        changed
    }
}
