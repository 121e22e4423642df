use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Branch, BranchId, Gid, OperationType};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    BarrierError, BarrierRecord, Result,
    record::TRANS_TYPE_SAGA,
    store::BarrierStore,
};

/// An open PostgreSQL transaction.
pub type PgTx = Transaction<'static, Postgres>;

/// PostgreSQL-backed barrier store.
///
/// Business repositories of a participant run their statements on the
/// [`PgTx`] handed to them by the barrier so that barrier rows and business
/// rows share one transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new PostgreSQL barrier store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<BarrierRecord> {
        Ok(BarrierRecord {
            trans_type: row.try_get("trans_type")?,
            gid: Gid::from_string(row.try_get::<String, _>("gid")?),
            branch_id: BranchId::from(row.try_get::<String, _>("branch_id")?),
            op: parse_op(row.try_get("op")?)?,
            reason: parse_op(row.try_get("reason")?)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

fn parse_op(value: String) -> Result<OperationType> {
    value
        .parse()
        .map_err(|e| BarrierError::Storage(format!("corrupt barrier row: {e}")))
}

#[async_trait]
impl BarrierStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn insert_barrier(&self, tx: &mut Self::Tx, record: &BarrierRecord) -> Result<bool> {
        // A concurrent insert of the same key blocks on the unique index
        // until the other transaction finishes, then affects zero rows.
        let result = sqlx::query(
            r#"
            INSERT INTO barrier (trans_type, gid, branch_id, op, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (trans_type, gid, branch_id, op) DO NOTHING
            "#,
        )
        .bind(&record.trans_type)
        .bind(record.gid.as_str())
        .bind(record.branch_id.as_str())
        .bind(record.op.as_str())
        .bind(record.reason.as_str())
        .bind(record.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch_barrier(
        &self,
        tx: &mut Self::Tx,
        branch: &Branch,
    ) -> Result<Option<BarrierRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT trans_type, gid, branch_id, op, reason, created_at
            FROM barrier
            WHERE trans_type = $1 AND gid = $2 AND branch_id = $3 AND op = $4
            "#,
        )
        .bind(TRANS_TYPE_SAGA)
        .bind(branch.gid.as_str())
        .bind(branch.branch_id.as_str())
        .bind(branch.op.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        tx.rollback().await?;
        Ok(())
    }

    async fn find_records(&self, gid: &Gid) -> Result<Vec<BarrierRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT trans_type, gid, branch_id, op, reason, created_at
            FROM barrier
            WHERE gid = $1
            ORDER BY branch_id ASC, id ASC
            "#,
        )
        .bind(gid.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM barrier WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
