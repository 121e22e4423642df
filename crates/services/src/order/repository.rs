use async_trait::async_trait;
use barrier::{BarrierError, BarrierStore, Gid, MemoryDb, MemoryTx, PgStore, PgTx};
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use super::model::{Order, OrderStatus, OrderTable};

/// Order storage sharing its transactions with the barrier.
#[async_trait]
pub trait OrderRepository: BarrierStore {
    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> barrier::Result<()>;

    /// Cancels the live orders created by `gid`. Returns the number changed.
    async fn cancel_by_gid(&self, tx: &mut Self::Tx, gid: &Gid) -> barrier::Result<u64>;

    async fn get_order(&self, id: Uuid) -> barrier::Result<Option<Order>>;

    async fn find_by_gid(&self, gid: &Gid) -> barrier::Result<Vec<Order>>;
}

#[async_trait]
impl OrderRepository for MemoryDb<OrderTable> {
    async fn insert_order(&self, tx: &mut MemoryTx<OrderTable>, order: &Order) -> barrier::Result<()> {
        tx.state_mut().insert(order.clone());
        Ok(())
    }

    async fn cancel_by_gid(&self, tx: &mut MemoryTx<OrderTable>, gid: &Gid) -> barrier::Result<u64> {
        Ok(tx.state_mut().cancel_by_gid(gid))
    }

    async fn get_order(&self, id: Uuid) -> barrier::Result<Option<Order>> {
        Ok(self.read(|table| table.get(id).cloned()).await)
    }

    async fn find_by_gid(&self, gid: &Gid) -> barrier::Result<Vec<Order>> {
        Ok(self.read(|table| table.find_by_gid(gid)).await)
    }
}

fn row_to_order(row: PgRow) -> barrier::Result<Order> {
    let code: i16 = row.try_get("status")?;
    let status = OrderStatus::from_code(code)
        .ok_or_else(|| BarrierError::Storage(format!("unknown order status {code}")))?;

    Ok(Order {
        id: row.try_get("id")?,
        gid: Gid::from_string(row.try_get::<String, _>("gid")?),
        uid: row.try_get("uid")?,
        pid: row.try_get("pid")?,
        amount: row.try_get("amount")?,
        status,
    })
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, tx: &mut PgTx, order: &Order) -> barrier::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, gid, uid, pid, amount, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id)
        .bind(order.gid.as_str())
        .bind(order.uid)
        .bind(order.pid)
        .bind(order.amount)
        .bind(order.status.code())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn cancel_by_gid(&self, tx: &mut PgTx, gid: &Gid) -> barrier::Result<u64> {
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE gid = $1 AND status = $3")
            .bind(gid.as_str())
            .bind(OrderStatus::Cancelled.code())
            .bind(OrderStatus::Created.code())
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn get_order(&self, id: Uuid) -> barrier::Result<Option<Order>> {
        let row = sqlx::query("SELECT id, gid, uid, pid, amount, status FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn find_by_gid(&self, gid: &Gid) -> barrier::Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT id, gid, uid, pid, amount, status FROM orders WHERE gid = $1 ORDER BY id",
        )
        .bind(gid.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }
}
