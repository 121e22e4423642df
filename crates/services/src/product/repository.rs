use async_trait::async_trait;
use barrier::{BarrierStore, MemoryDb, MemoryTx, PgStore, PgTx};
use sqlx::{Row, postgres::PgRow};

use super::model::{NewProduct, Product, ProductTable};

/// Product storage sharing its transactions with the barrier.
#[async_trait]
pub trait ProductRepository: BarrierStore {
    /// Adds `delta` to the stock of `id` unless the result would be negative.
    /// Returns the number of rows changed.
    async fn adjust_stock(&self, tx: &mut Self::Tx, id: i64, delta: i64) -> barrier::Result<u64>;

    async fn get_product(&self, id: i64) -> barrier::Result<Option<Product>>;

    async fn insert_product(&self, product: NewProduct) -> barrier::Result<Product>;
}

#[async_trait]
impl ProductRepository for MemoryDb<ProductTable> {
    async fn adjust_stock(
        &self,
        tx: &mut MemoryTx<ProductTable>,
        id: i64,
        delta: i64,
    ) -> barrier::Result<u64> {
        Ok(tx.state_mut().adjust_stock(id, delta))
    }

    async fn get_product(&self, id: i64) -> barrier::Result<Option<Product>> {
        Ok(self.read(|table| table.get(id).cloned()).await)
    }

    async fn insert_product(&self, product: NewProduct) -> barrier::Result<Product> {
        Ok(self.update(|table| table.insert(product)).await)
    }
}

fn row_to_product(row: PgRow) -> barrier::Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        stock: row.try_get("stock")?,
        amount: row.try_get("amount")?,
        status: row.try_get("status")?,
    })
}

#[async_trait]
impl ProductRepository for PgStore {
    async fn adjust_stock(&self, tx: &mut PgTx, id: i64, delta: i64) -> barrier::Result<u64> {
        let result = sqlx::query(
            "UPDATE product SET stock = stock + $2 WHERE id = $1 AND stock + $2 >= 0",
        )
        .bind(id)
        .bind(delta)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_product(&self, id: i64) -> barrier::Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, description, stock, amount, status FROM product WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn insert_product(&self, product: NewProduct) -> barrier::Result<Product> {
        let row = sqlx::query(
            r#"
            INSERT INTO product (name, description, stock, amount)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, description, stock, amount, status
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.stock)
        .bind(product.amount)
        .fetch_one(self.pool())
        .await?;

        row_to_product(row)
    }
}
