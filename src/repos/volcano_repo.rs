/*
 * Responsibility
 * - volcano ドキュメントの保存/検索 (VolcanoStore trait)
 * - PostgreSQL (JSONB) 実装と、DATABASE_URL 未設定時/テスト用のプロセス内実装
 */
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, types::Json};
use tokio::sync::RwLock;

use crate::repos::error::RepoError;

/// One stored document. `document` is the full JSON object as written
/// by the client (plus the generated `id`).
#[derive(Debug, Clone, PartialEq)]
pub struct VolcanoRecord {
    pub id: String,
    pub volcano_name: String,
    pub document: Map<String, Value>,
}

#[async_trait]
pub trait VolcanoStore: Send + Sync + 'static {
    async fn list_all(&self) -> Result<Vec<VolcanoRecord>, RepoError>;

    /// Exact, case-sensitive match on `VolcanoName`.
    async fn find_by_name(&self, name: &str) -> Result<Vec<VolcanoRecord>, RepoError>;

    /// Insert, or replace the document with the same id.
    async fn upsert(&self, record: VolcanoRecord) -> Result<VolcanoRecord, RepoError>;

    fn backend(&self) -> &'static str;
}

#[derive(Debug, sqlx::FromRow)]
struct VolcanoRow {
    id: String,
    #[sqlx(rename = "volcanoName")]
    volcano_name: String,
    document: Json<Value>,
}

impl TryFrom<VolcanoRow> for VolcanoRecord {
    type Error = RepoError;

    fn try_from(row: VolcanoRow) -> Result<Self, Self::Error> {
        match row.document.0 {
            Value::Object(document) => Ok(Self {
                id: row.id,
                volcano_name: row.volcano_name,
                document,
            }),
            _ => Err(RepoError::CorruptDocument),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgVolcanoStore {
    pool: PgPool,
}

impl PgVolcanoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS volcanoes (
                id TEXT PRIMARY KEY,
                "volcanoName" TEXT NOT NULL,
                document JSONB NOT NULL,
                "createdAt" TIMESTAMPTZ NOT NULL DEFAULT now(),
                "updatedAt" TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS volcanoes_volcano_name_idx
            ON volcanoes ("volcanoName")
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VolcanoStore for PgVolcanoStore {
    async fn list_all(&self) -> Result<Vec<VolcanoRecord>, RepoError> {
        let rows = sqlx::query_as::<_, VolcanoRow>(
            r#"
            SELECT id, "volcanoName", document
            FROM volcanoes
            ORDER BY "createdAt", id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VolcanoRecord::try_from).collect()
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<VolcanoRecord>, RepoError> {
        let rows = sqlx::query_as::<_, VolcanoRow>(
            r#"
            SELECT id, "volcanoName", document
            FROM volcanoes
            WHERE "volcanoName" = $1
            ORDER BY "createdAt", id
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VolcanoRecord::try_from).collect()
    }

    async fn upsert(&self, record: VolcanoRecord) -> Result<VolcanoRecord, RepoError> {
        let row = sqlx::query_as::<_, VolcanoRow>(
            r#"
            INSERT INTO volcanoes (id, "volcanoName", document)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET
                "volcanoName" = EXCLUDED."volcanoName",
                document = EXCLUDED.document,
                "updatedAt" = now()
            RETURNING id, "volcanoName", document
            "#,
        )
        .bind(&record.id)
        .bind(&record.volcano_name)
        .bind(Json(Value::Object(record.document)))
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Insertion-ordered store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryVolcanoStore {
    records: RwLock<Vec<VolcanoRecord>>,
}

impl InMemoryVolcanoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VolcanoStore for InMemoryVolcanoStore {
    async fn list_all(&self) -> Result<Vec<VolcanoRecord>, RepoError> {
        Ok(self.records.read().await.clone())
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<VolcanoRecord>, RepoError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.volcano_name == name)
            .cloned()
            .collect())
    }

    async fn upsert(&self, record: VolcanoRecord) -> Result<VolcanoRecord, RepoError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(record)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
