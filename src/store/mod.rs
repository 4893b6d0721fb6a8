//! Persistence: record the Document → Page → Block tree in two backends.
//!
//! One trait, [`StructureStore`], abstracts over both backends so every fact
//! is written through the same contract. The relational store keeps rows for
//! structured queries; the graph store keeps CONTAINS edges for containment
//! and a FOLLOWS chain for block order. Block order has a single source of
//! truth, the `seq` field assigned at analysis time: the gateway derives the
//! FOLLOWS pairs from it, callers never hand-construct adjacency.
//!
//! There is no transaction spanning the two backends. The gateway writes
//! relational first; a graph failure after a relational success is surfaced
//! as [`StoreError::Divergence`] naming the document, so an operator can
//! compensate. Writes are not idempotent: persisting the same document twice
//! creates two independent trees.

pub mod graph;
pub mod memory;
pub mod postgres;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::model::{Block, Document, Page};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

/// One storage backend for the structural document tree.
///
/// Implementations must accept inserts in containment order: document before
/// its pages, page before its blocks, blocks before their FOLLOWS links.
#[async_trait]
pub trait StructureStore: Send + Sync {
    /// Insert the document entity itself (not its pages).
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError>;

    /// Insert a page and attach it to its document.
    async fn insert_page(&self, page: &Page) -> Result<(), StoreError>;

    /// Insert a block and attach it to its page.
    async fn insert_block(&self, block: &Block) -> Result<(), StoreError>;

    /// Record that `next` directly follows `prev` in reading order.
    ///
    /// Backends that already carry order another way (the relational store
    /// keeps `seq` on the row) may make this a no-op.
    async fn link_follows(&self, prev: Uuid, next: Uuid) -> Result<(), StoreError>;

    /// Page ids of a document with their page numbers, in page order.
    async fn fetch_page_ids(&self, document_id: Uuid) -> Result<Vec<(Uuid, usize)>, StoreError>;

    /// Block ids of a page in reading order, reconstructed from whatever
    /// order representation the backend holds.
    async fn fetch_block_order(&self, page_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    /// Release held connections. Called exactly once at end of run.
    async fn close(self: Box<Self>) -> Result<(), StoreError>;
}

/// Dual-write facade over the relational and graph backends.
///
/// Owns both connections for the lifetime of a run; consume with
/// [`PersistenceGateway::close`] on every exit path.
pub struct PersistenceGateway {
    relational: Box<dyn StructureStore>,
    graph: Box<dyn StructureStore>,
}

impl PersistenceGateway {
    /// Connect both backends from the given settings.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let relational = postgres::PostgresStore::connect(&config.pg_conn_str).await?;
        let graph = graph::Neo4jStore::connect(
            &config.neo4j_uri,
            &config.neo4j_username,
            &config.neo4j_password,
        )
        .await?;
        info!("Persistence gateway connected (postgres + neo4j)");
        Ok(Self::new(Box::new(relational), Box::new(graph)))
    }

    /// Build a gateway over arbitrary backends.
    pub fn new(relational: Box<dyn StructureStore>, graph: Box<dyn StructureStore>) -> Self {
        Self { relational, graph }
    }

    /// Persist a whole document tree to both backends.
    ///
    /// Relational first, then graph. FOLLOWS pairs are derived from each
    /// page's `seq` order. Graph failures after the first relational write
    /// surface as [`StoreError::Divergence`].
    pub async fn persist(&self, document: &Document) -> Result<(), StoreError> {
        let diverged = |e: StoreError| StoreError::Divergence {
            document_id: document.id,
            detail: e.to_string(),
        };

        self.relational.insert_document(document).await?;
        self.graph.insert_document(document).await.map_err(diverged)?;

        for page in &document.pages {
            self.relational.insert_page(page).await?;
            self.graph.insert_page(page).await.map_err(diverged)?;

            for block in &page.blocks {
                self.relational.insert_block(block).await?;
                self.graph.insert_block(block).await.map_err(diverged)?;
            }

            for pair in page.blocks.windows(2) {
                self.relational
                    .link_follows(pair[0].id, pair[1].id)
                    .await?;
                self.graph
                    .link_follows(pair[0].id, pair[1].id)
                    .await
                    .map_err(diverged)?;
            }
            debug!(
                "Persisted page {} ({} blocks)",
                page.number,
                page.blocks.len()
            );
        }

        info!(
            "Persisted document {} ({} pages)",
            document.id,
            document.pages.len()
        );
        Ok(())
    }

    /// Page ids in page order, read from the graph backend.
    pub async fn fetch_page_ids(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<(Uuid, usize)>, StoreError> {
        self.graph.fetch_page_ids(document_id).await
    }

    /// Block order for a page, reconstructed from the graph FOLLOWS chain.
    pub async fn fetch_block_order(&self, page_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        self.graph.fetch_block_order(page_id).await
    }

    /// Close both backends. Both are closed even if the first fails; the
    /// first error wins.
    pub async fn close(self) -> Result<(), StoreError> {
        let first = self.relational.close().await;
        let second = self.graph.close().await;
        first.and(second)
    }
}

/// Walk a FOLLOWS successor map into a linear order.
///
/// Shared by backends that reconstruct order from edges. `blocks` is the set
/// of block ids contained by the page; `next_of` maps a block to its direct
/// successor. Returns [`StoreError::BrokenChain`] when the chain forks, has
/// no unique head, cycles, or fails to cover every block.
pub(crate) fn walk_follows_chain(
    page_id: Uuid,
    blocks: &std::collections::HashSet<Uuid>,
    next_of: &std::collections::HashMap<Uuid, Uuid>,
) -> Result<Vec<Uuid>, StoreError> {
    if blocks.is_empty() {
        return Ok(Vec::new());
    }

    let successors: std::collections::HashSet<Uuid> = next_of.values().copied().collect();
    let mut heads = blocks.iter().filter(|id| !successors.contains(id));
    let head = match (heads.next(), heads.next()) {
        (Some(h), None) => *h,
        (None, _) => {
            return Err(StoreError::BrokenChain {
                page_id,
                detail: "no head block (cycle in FOLLOWS chain)".into(),
            })
        }
        (Some(_), Some(_)) => {
            return Err(StoreError::BrokenChain {
                page_id,
                detail: "multiple head blocks (chain is split)".into(),
            })
        }
    };

    let mut order = Vec::with_capacity(blocks.len());
    let mut seen = std::collections::HashSet::new();
    let mut current = Some(head);
    while let Some(id) = current {
        if !seen.insert(id) {
            return Err(StoreError::BrokenChain {
                page_id,
                detail: format!("cycle at block {id}"),
            });
        }
        order.push(id);
        current = next_of.get(&id).copied();
    }

    if order.len() != blocks.len() {
        return Err(StoreError::BrokenChain {
            page_id,
            detail: format!(
                "chain covers {} of {} blocks",
                order.len(),
                blocks.len()
            ),
        });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn chain_walk_reconstructs_order() {
        let v = ids(3);
        let blocks: HashSet<Uuid> = v.iter().copied().collect();
        let mut next_of = HashMap::new();
        next_of.insert(v[0], v[1]);
        next_of.insert(v[1], v[2]);
        let order = walk_follows_chain(Uuid::new_v4(), &blocks, &next_of).unwrap();
        assert_eq!(order, v);
    }

    #[test]
    fn cycle_is_detected() {
        let v = ids(2);
        let blocks: HashSet<Uuid> = v.iter().copied().collect();
        let mut next_of = HashMap::new();
        next_of.insert(v[0], v[1]);
        next_of.insert(v[1], v[0]);
        let err = walk_follows_chain(Uuid::new_v4(), &blocks, &next_of).unwrap_err();
        assert!(matches!(err, StoreError::BrokenChain { .. }));
    }

    #[test]
    fn split_chain_is_detected() {
        let v = ids(4);
        let blocks: HashSet<Uuid> = v.iter().copied().collect();
        let mut next_of = HashMap::new();
        next_of.insert(v[0], v[1]);
        // v[2] -> v[3] is a second, disconnected chain.
        next_of.insert(v[2], v[3]);
        let err = walk_follows_chain(Uuid::new_v4(), &blocks, &next_of).unwrap_err();
        assert!(matches!(err, StoreError::BrokenChain { .. }));
    }

    #[test]
    fn empty_page_has_empty_order() {
        let order =
            walk_follows_chain(Uuid::new_v4(), &HashSet::new(), &HashMap::new()).unwrap();
        assert!(order.is_empty());
    }
}
