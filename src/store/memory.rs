//! In-memory backend for tests and dry runs.
//!
//! Keeps the same contract as the real backends, including order
//! reconstruction from the FOLLOWS map rather than insertion order, so
//! round-trip tests exercise the chain walk and not a vector copy.

use crate::error::StoreError;
use crate::model::{Block, Document, Page};
use crate::store::{walk_follows_chain, StructureStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    documents: Vec<(Uuid, String)>,
    // page id -> (document id, page number)
    pages: HashMap<Uuid, (Uuid, usize)>,
    // page id -> contained block ids
    blocks: HashMap<Uuid, HashSet<Uuid>>,
    // block id -> owning page id
    block_pages: HashMap<Uuid, Uuid>,
    follows: HashMap<Uuid, Uuid>,
    closed: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored document entities. Duplicates count twice; writes
    /// are not idempotent.
    pub fn document_count(&self) -> usize {
        self.state.lock().unwrap().documents.len()
    }

    pub fn block_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .blocks
            .values()
            .map(|set| set.len())
            .sum()
    }
}

#[async_trait]
impl StructureStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.documents.push((document.id, document.filename.clone()));
        Ok(())
    }

    async fn insert_page(&self, page: &Page) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.documents.iter().any(|(id, _)| *id == page.document_id) {
            return Err(StoreError::Graph(format!(
                "page {} references unknown document {}",
                page.id, page.document_id
            )));
        }
        state.pages.insert(page.id, (page.document_id, page.number));
        state.blocks.entry(page.id).or_default();
        Ok(())
    }

    async fn insert_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.pages.contains_key(&block.page_id) {
            return Err(StoreError::Graph(format!(
                "block {} references unknown page {}",
                block.id, block.page_id
            )));
        }
        state
            .blocks
            .entry(block.page_id)
            .or_default()
            .insert(block.id);
        state.block_pages.insert(block.id, block.page_id);
        Ok(())
    }

    async fn link_follows(&self, prev: Uuid, next: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.block_pages.contains_key(&prev) || !state.block_pages.contains_key(&next) {
            return Err(StoreError::Graph(
                "FOLLOWS endpoints must be inserted first".into(),
            ));
        }
        state.follows.insert(prev, next);
        Ok(())
    }

    async fn fetch_page_ids(&self, document_id: Uuid) -> Result<Vec<(Uuid, usize)>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut pages: Vec<(Uuid, usize)> = state
            .pages
            .iter()
            .filter(|(_, (doc, _))| *doc == document_id)
            .map(|(id, (_, number))| (*id, *number))
            .collect();
        pages.sort_by_key(|(_, number)| *number);
        Ok(pages)
    }

    async fn fetch_block_order(&self, page_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().unwrap();
        let blocks = state.blocks.get(&page_id).cloned().unwrap_or_default();
        // Restrict the successor map to this page's blocks.
        let next_of: HashMap<Uuid, Uuid> = state
            .follows
            .iter()
            .filter(|(prev, _)| blocks.contains(prev))
            .map(|(prev, next)| (*prev, *next))
            .collect();
        walk_follows_chain(page_id, &blocks, &next_of)
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

// Shared-handle form: lets a caller keep a handle for inspection while a
// gateway owns the boxed store.
#[async_trait]
impl StructureStore for std::sync::Arc<MemoryStore> {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        self.as_ref().insert_document(document).await
    }

    async fn insert_page(&self, page: &Page) -> Result<(), StoreError> {
        self.as_ref().insert_page(page).await
    }

    async fn insert_block(&self, block: &Block) -> Result<(), StoreError> {
        self.as_ref().insert_block(block).await
    }

    async fn link_follows(&self, prev: Uuid, next: Uuid) -> Result<(), StoreError> {
        self.as_ref().link_follows(prev, next).await
    }

    async fn fetch_page_ids(&self, document_id: Uuid) -> Result<Vec<(Uuid, usize)>, StoreError> {
        self.as_ref().fetch_page_ids(document_id).await
    }

    async fn fetch_block_order(&self, page_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        self.as_ref().fetch_block_order(page_id).await
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockKind;

    fn sample_document(paragraphs: usize) -> Document {
        let mut doc = Document::new("sample.pdf");
        let mut page = Page::new(doc.id, 1);
        page.set_blocks(
            (0..paragraphs)
                .map(|i| BlockKind::Paragraph {
                    text: format!("para {i}"),
                })
                .collect(),
        );
        doc.pages.push(page);
        doc
    }

    #[tokio::test]
    async fn insert_requires_parents() {
        let store = MemoryStore::new();
        let orphan = Page::new(Uuid::new_v4(), 1);
        assert!(store.insert_page(&orphan).await.is_err());
    }

    #[tokio::test]
    async fn order_comes_from_follows_not_insertion() {
        let store = MemoryStore::new();
        let doc = sample_document(3);
        let page = &doc.pages[0];
        store.insert_document(&doc).await.unwrap();
        store.insert_page(page).await.unwrap();
        // Insert blocks in reverse; only FOLLOWS carries the order.
        for block in page.blocks.iter().rev() {
            store.insert_block(block).await.unwrap();
        }
        for pair in page.blocks.windows(2) {
            store.link_follows(pair[0].id, pair[1].id).await.unwrap();
        }
        let order = store.fetch_block_order(page.id).await.unwrap();
        let expected: Vec<Uuid> = page.blocks.iter().map(|b| b.id).collect();
        assert_eq!(order, expected);
    }
}
