use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, FromRow};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::model::ResultRow;
use crate::domain::repository::ResultStore;
use crate::error::{RelayError, RelayResult};

/// PostgreSQL 结果存储
///
/// 独占一个连接；连接由互斥锁保护，多个调用方共享同一实例时写入被串行化。
/// `close` 之后连接被取走，后续操作返回持久化错误。
pub struct PostgresResultStore {
    conn: Mutex<Option<PgConnection>>,
    address: String,
}

#[derive(FromRow)]
struct ResultRowRecord {
    id: i32,
    round: Option<String>,
    air_date_group: Option<String>,
    question: Option<String>,
    value: Option<i32>,
}

impl From<ResultRowRecord> for ResultRow {
    fn from(row: ResultRowRecord) -> Self {
        Self {
            id: i64::from(row.id),
            round: row.round.unwrap_or_default(),
            air_date_group: row.air_date_group.unwrap_or_default(),
            question: row.question.unwrap_or_default(),
            value: row.value.unwrap_or_default(),
        }
    }
}

impl PostgresResultStore {
    /// 建立连接，失败即为启动期致命错误
    pub async fn connect(options: &PgConnectOptions, address: impl Into<String>) -> RelayResult<Self> {
        let address = address.into();
        let conn = PgConnection::connect_with(options)
            .await
            .map_err(|err| RelayError::connection(address.clone(), err.to_string()))?;

        info!(address = %address, "Connected to PostgreSQL");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            address,
        })
    }

    /// 通过 URL 连接，主要用于测试
    pub async fn connect_url(url: &str) -> RelayResult<Self> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|err: sqlx::Error| RelayError::config(err.to_string()))?;
        Self::connect(&options, "postgres").await
    }
}

#[async_trait]
impl ResultStore for PostgresResultStore {
    async fn ensure_schema(&self) -> RelayResult<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(RelayError::store_closed)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                id SERIAL PRIMARY KEY,
                round TEXT,
                air_date_group TEXT,
                question TEXT,
                value INT
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        debug!(address = %self.address, "results table ensured");
        Ok(())
    }

    async fn insert(
        &self,
        round: &str,
        air_date_group: &str,
        question: &str,
        value: i32,
    ) -> RelayResult<i64> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(RelayError::store_closed)?;

        // 单条语句在自动提交模式下执行，返回即已提交
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO results (round, air_date_group, question, value)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(round)
        .bind(air_date_group)
        .bind(question)
        .bind(value)
        .fetch_one(&mut *conn)
        .await?;

        Ok(i64::from(id))
    }

    async fn drop_schema(&self) -> RelayResult<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(RelayError::store_closed)?;

        sqlx::query("DROP TABLE IF EXISTS results")
            .execute(&mut *conn)
            .await?;

        info!(address = %self.address, "results table dropped");
        Ok(())
    }

    async fn fetch_all(&self) -> RelayResult<Vec<ResultRow>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(RelayError::store_closed)?;

        let rows: Vec<ResultRowRecord> = sqlx::query_as(
            "SELECT id, round, air_date_group, question, value FROM results ORDER BY id",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(ResultRow::from).collect())
    }

    async fn close(&self) -> RelayResult<()> {
        let conn = self
            .conn
            .lock()
            .await
            .take()
            .ok_or_else(|| RelayError::persistence("result store already closed"))?;

        conn.close().await?;
        info!(address = %self.address, "PostgreSQL connection closed");
        Ok(())
    }
}
