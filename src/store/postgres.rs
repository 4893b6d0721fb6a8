//! Relational backend: PostgreSQL via tokio-postgres.
//!
//! Rows carry the containment keys plus an explicit `seq` column, so block
//! order survives here without any FOLLOWS representation;
//! [`StructureStore::link_follows`] is a no-op. Each insert is a single
//! statement, so a failed insert persists nothing of itself before the error
//! is surfaced.
//!
//! The schema is created on connect with `CREATE TABLE IF NOT EXISTS`; there
//! is no migration machinery.

use crate::error::StoreError;
use crate::model::{Block, Document, Page};
use crate::store::StructureStore;
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    doc_id      UUID PRIMARY KEY,
    filename    TEXT NOT NULL,
    source_path TEXT
);
CREATE TABLE IF NOT EXISTS pages (
    page_id     UUID PRIMARY KEY,
    doc_id      UUID NOT NULL REFERENCES documents(doc_id),
    page_number INT  NOT NULL,
    width       REAL,
    height      REAL
);
CREATE TABLE IF NOT EXISTS blocks (
    block_id   UUID PRIMARY KEY,
    page_id    UUID NOT NULL REFERENCES pages(page_id),
    seq        INT  NOT NULL,
    block_type TEXT NOT NULL,
    level      INT,
    content    TEXT,
    x          REAL,
    y          REAL,
    width      REAL,
    height     REAL
);
";

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connect with a libpq-style connection string and ensure the schema
    /// exists.
    pub async fn connect(conn_str: &str) -> Result<Self, StoreError> {
        let (client, connection) =
            tokio_postgres::connect(conn_str, NoTls)
                .await
                .map_err(|e| StoreError::Connection {
                    backend: "postgres",
                    detail: e.to_string(),
                })?;

        // The connection object drives the socket; it runs until the client
        // is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {}", e);
            }
        });

        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| StoreError::Postgres(e.to_string()))?;

        info!("Connected to PostgreSQL");
        Ok(Self { client })
    }
}

#[async_trait]
impl StructureStore for PostgresStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let source_path = document
            .source_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        self.client
            .execute(
                "INSERT INTO documents (doc_id, filename, source_path) VALUES ($1, $2, $3)",
                &[&document.id, &document.filename, &source_path],
            )
            .await
            .map_err(|e| StoreError::Postgres(e.to_string()))?;
        Ok(())
    }

    async fn insert_page(&self, page: &Page) -> Result<(), StoreError> {
        self.client
            .execute(
                "INSERT INTO pages (page_id, doc_id, page_number, width, height) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &page.id,
                    &page.document_id,
                    &(page.number as i32),
                    &page.width,
                    &page.height,
                ],
            )
            .await
            .map_err(|e| StoreError::Postgres(e.to_string()))?;
        Ok(())
    }

    async fn insert_block(&self, block: &Block) -> Result<(), StoreError> {
        let level = block.kind.level().map(|l| l as i32);
        let content = block.kind.content();
        let (x, y, w, h) = match block.bbox {
            Some(b) => (Some(b.x), Some(b.y), Some(b.width), Some(b.height)),
            None => (None, None, None, None),
        };
        self.client
            .execute(
                "INSERT INTO blocks \
                 (block_id, page_id, seq, block_type, level, content, x, y, width, height) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &block.id,
                    &block.page_id,
                    &(block.seq as i32),
                    &block.kind.type_tag(),
                    &level,
                    &content,
                    &x,
                    &y,
                    &w,
                    &h,
                ],
            )
            .await
            .map_err(|e| StoreError::Postgres(e.to_string()))?;
        Ok(())
    }

    async fn link_follows(&self, _prev: Uuid, _next: Uuid) -> Result<(), StoreError> {
        // Order lives in the seq column here.
        Ok(())
    }

    async fn fetch_page_ids(&self, document_id: Uuid) -> Result<Vec<(Uuid, usize)>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT page_id, page_number FROM pages WHERE doc_id = $1 ORDER BY page_number",
                &[&document_id],
            )
            .await
            .map_err(|e| StoreError::Postgres(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|row| {
                let id: Uuid = row.get(0);
                let number: i32 = row.get(1);
                (id, number as usize)
            })
            .collect())
    }

    async fn fetch_block_order(&self, page_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT block_id FROM blocks WHERE page_id = $1 ORDER BY seq",
                &[&page_id],
            )
            .await
            .map_err(|e| StoreError::Postgres(e.to_string()))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        // Dropping the client terminates the spawned connection task.
        debug!("Closing PostgreSQL connection");
        Ok(())
    }
}
