use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::{MemoryRecord, NewMemoryRecord};
use crate::error::EngineError;
use crate::persistence::MemoryStore;

#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(connection_string: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        // Run Migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn record_from_row(row: &PgRow) -> Result<MemoryRecord, EngineError> {
    let seq: i64 = row.try_get("seq")?;
    let embedding: Vector = row.try_get("embedding")?;
    let status: String = row.try_get("status")?;

    Ok(MemoryRecord {
        id: row.try_get("id")?,
        seq: u64::try_from(seq).unwrap_or_default(),
        subject_id: row.try_get("subject_id")?,
        target_id: row.try_get("target_id")?,
        text: row.try_get("text")?,
        embedding: embedding.to_vec(),
        created_at: row.try_get("created_at")?,
        status: status
            .parse()
            .map_err(EngineError::StoreUnavailable)?,
    })
}

#[async_trait]
impl MemoryStore for PostgresStore {
    async fn insert(&self, record: NewMemoryRecord) -> Result<MemoryRecord, EngineError> {
        let id = Uuid::new_v4();
        let embedding_vector = Vector::from(record.embedding.clone());

        let row = sqlx::query(
            r#"
            INSERT INTO memory_records (id, subject_id, target_id, text, embedding, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING seq
            "#,
        )
        .bind(id)
        .bind(&record.subject_id)
        .bind(&record.target_id)
        .bind(&record.text)
        .bind(embedding_vector)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;

        let seq: i64 = row.try_get("seq")?;
        Ok(MemoryRecord {
            id,
            seq: u64::try_from(seq).unwrap_or_default(),
            subject_id: record.subject_id,
            target_id: record.target_id,
            text: record.text,
            embedding: record.embedding,
            created_at: record.created_at,
            status: record.status,
        })
    }

    async fn history(
        &self,
        subject_id: &str,
        target_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, EngineError> {
        // LIMIT NULL means no limit
        let rows = sqlx::query(
            r#"
            SELECT seq, id, subject_id, target_id, text, embedding, status, created_at
            FROM memory_records
            WHERE subject_id = $1 AND ($2::TEXT IS NULL OR target_id = $2)
            ORDER BY created_at DESC, seq DESC
            LIMIT $3
            "#,
        )
        .bind(subject_id)
        .bind(target_id)
        .bind(limit.map(to_i64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn count_recent_by_target(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT target_id, COUNT(*) AS recent
            FROM memory_records
            WHERE subject_id = $1 AND created_at > $2
            GROUP BY target_id
            "#,
        )
        .bind(subject_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let target_id: String = row.try_get("target_id")?;
            let recent: i64 = row.try_get("recent")?;
            counts.insert(target_id, usize::try_from(recent).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn delete_oldest(&self, subject_id: &str, count: usize) -> Result<usize, EngineError> {
        let result = sqlx::query(
            r#"
            DELETE FROM memory_records
            WHERE seq IN (
                SELECT seq FROM memory_records
                WHERE subject_id = $1
                ORDER BY created_at ASC, seq ASC
                LIMIT $2
            )
            "#,
        )
        .bind(subject_id)
        .bind(to_i64(count))
        .execute(&self.pool)
        .await?;

        Ok(usize::try_from(result.rows_affected()).unwrap_or_default())
    }

    async fn delete_all(&self, subject_id: &str) -> Result<usize, EngineError> {
        let result = sqlx::query("DELETE FROM memory_records WHERE subject_id = $1")
            .bind(subject_id)
            .execute(&self.pool)
            .await?;

        Ok(usize::try_from(result.rows_affected()).unwrap_or_default())
    }
}
