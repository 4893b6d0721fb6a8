//! Graph backend: Neo4j via neo4rs.
//!
//! Nodes carry their ids as string properties; containment is a CONTAINS
//! edge (Document→Page, Page→Block) and block order is a FOLLOWS edge chain.
//! Reading block order means finding the chain head (the one block with no
//! incoming FOLLOWS) and walking successors; a fork, split or cycle in the
//! chain is reported as [`StoreError::BrokenChain`] rather than silently
//! returning a partial order.

use crate::error::StoreError;
use crate::model::{Block, Document, Page};
use crate::store::{walk_follows_chain, StructureStore};
use async_trait::async_trait;
use neo4rs::{query, Graph};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub async fn connect(uri: &str, username: &str, password: &str) -> Result<Self, StoreError> {
        let graph = Graph::new(uri, username, password)
            .await
            .map_err(|e| StoreError::Connection {
                backend: "neo4j",
                detail: e.to_string(),
            })?;
        info!("Connected to Neo4j at {}", uri);
        Ok(Self { graph })
    }

    fn parse_id(raw: &str) -> Result<Uuid, StoreError> {
        Uuid::parse_str(raw).map_err(|e| StoreError::Graph(format!("bad id '{raw}': {e}")))
    }
}

#[async_trait]
impl StructureStore for Neo4jStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        self.graph
            .run(
                query("CREATE (:Document {doc_id: $doc_id, filename: $filename})")
                    .param("doc_id", document.id.to_string())
                    .param("filename", document.filename.clone()),
            )
            .await
            .map_err(|e| StoreError::Graph(e.to_string()))?;
        Ok(())
    }

    async fn insert_page(&self, page: &Page) -> Result<(), StoreError> {
        self.graph
            .run(
                query(
                    "MATCH (d:Document {doc_id: $doc_id}) \
                     CREATE (d)-[:CONTAINS]->(:Page {page_id: $page_id, doc_id: $doc_id, \
                     page_number: $page_number, width: $width, height: $height})",
                )
                .param("doc_id", page.document_id.to_string())
                .param("page_id", page.id.to_string())
                .param("page_number", page.number as i64)
                .param("width", page.width.map(f64::from))
                .param("height", page.height.map(f64::from)),
            )
            .await
            .map_err(|e| StoreError::Graph(e.to_string()))?;
        Ok(())
    }

    async fn insert_block(&self, block: &Block) -> Result<(), StoreError> {
        self.graph
            .run(
                query(
                    "MATCH (p:Page {page_id: $page_id}) \
                     CREATE (p)-[:CONTAINS]->(:Block {block_id: $block_id, page_id: $page_id, \
                     seq: $seq, block_type: $block_type, level: $level, content: $content})",
                )
                .param("page_id", block.page_id.to_string())
                .param("block_id", block.id.to_string())
                .param("seq", block.seq as i64)
                .param("block_type", block.kind.type_tag())
                .param("level", block.kind.level().map(|l| l as i64))
                .param("content", block.kind.content()),
            )
            .await
            .map_err(|e| StoreError::Graph(e.to_string()))?;
        Ok(())
    }

    async fn link_follows(&self, prev: Uuid, next: Uuid) -> Result<(), StoreError> {
        self.graph
            .run(
                query(
                    "MATCH (a:Block {block_id: $prev}), (b:Block {block_id: $next}) \
                     CREATE (a)-[:FOLLOWS]->(b)",
                )
                .param("prev", prev.to_string())
                .param("next", next.to_string()),
            )
            .await
            .map_err(|e| StoreError::Graph(e.to_string()))?;
        Ok(())
    }

    async fn fetch_page_ids(&self, document_id: Uuid) -> Result<Vec<(Uuid, usize)>, StoreError> {
        let mut stream = self
            .graph
            .execute(
                query(
                    "MATCH (d:Document {doc_id: $doc_id})-[:CONTAINS]->(p:Page) \
                     RETURN p.page_id AS page_id, p.page_number AS page_number \
                     ORDER BY page_number",
                )
                .param("doc_id", document_id.to_string()),
            )
            .await
            .map_err(|e| StoreError::Graph(e.to_string()))?;

        let mut pages = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| StoreError::Graph(e.to_string()))?
        {
            let raw_id: String = row
                .get("page_id")
                .map_err(|e| StoreError::Graph(e.to_string()))?;
            let number: i64 = row
                .get("page_number")
                .map_err(|e| StoreError::Graph(e.to_string()))?;
            pages.push((Self::parse_id(&raw_id)?, number as usize));
        }
        Ok(pages)
    }

    async fn fetch_block_order(&self, page_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        // Contained blocks plus their FOLLOWS successor, one pass.
        let mut stream = self
            .graph
            .execute(
                query(
                    "MATCH (p:Page {page_id: $page_id})-[:CONTAINS]->(b:Block) \
                     OPTIONAL MATCH (b)-[:FOLLOWS]->(n:Block) \
                     RETURN b.block_id AS block_id, n.block_id AS next_id",
                )
                .param("page_id", page_id.to_string()),
            )
            .await
            .map_err(|e| StoreError::Graph(e.to_string()))?;

        let mut blocks = HashSet::new();
        let mut next_of = HashMap::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| StoreError::Graph(e.to_string()))?
        {
            let raw_id: String = row
                .get("block_id")
                .map_err(|e| StoreError::Graph(e.to_string()))?;
            let id = Self::parse_id(&raw_id)?;
            blocks.insert(id);
            if let Ok(raw_next) = row.get::<String>("next_id") {
                next_of.insert(id, Self::parse_id(&raw_next)?);
            }
        }

        debug!(
            "Reconstructing order for page {} ({} blocks)",
            page_id,
            blocks.len()
        );
        walk_follows_chain(page_id, &blocks, &next_of)
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        // neo4rs pools connections internally; dropping the Graph releases them.
        debug!("Closing Neo4j connection");
        Ok(())
    }
}
