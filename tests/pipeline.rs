//! Integration tests for the structured pipeline's pure logic: analysis,
//! rendering, and persistence semantics against in-memory stores. No
//! pdfium, Tesseract, databases, or model calls needed; the gated live
//! tests live in `tests/e2e.rs`.

use scantex::pipeline::analyze::StructureAnalyzer;
use scantex::store::memory::MemoryStore;
use scantex::{BlockKind, Document, DocumentRenderer, Page, PersistenceGateway, StoreError};
use std::sync::Arc;
use uuid::Uuid;

fn analyzed_document(page_texts: &[&str]) -> Document {
    let analyzer = StructureAnalyzer::default();
    let mut doc = Document::new("scan.pdf");
    for (i, text) in page_texts.iter().enumerate() {
        let mut page = Page::new(doc.id, i + 1);
        page.set_blocks(analyzer.analyze(text));
        doc.pages.push(page);
    }
    doc
}

// ── Analyzer ─────────────────────────────────────────────────────────────

#[test]
fn analyzer_counts_headings_and_paragraphs() {
    let analyzer = StructureAnalyzer::default();
    let text = "# One\n\n## Two\n\n### Three\n\nalpha\n\nbeta";
    let blocks = analyzer.analyze(text);
    let headings = blocks
        .iter()
        .filter(|b| matches!(b, BlockKind::Heading { .. }))
        .count();
    let paragraphs = blocks
        .iter()
        .filter(|b| matches!(b, BlockKind::Paragraph { .. }))
        .count();
    assert_eq!(headings, 3);
    assert_eq!(paragraphs, 2);
}

#[test]
fn analyzer_example_sequence() {
    let analyzer = StructureAnalyzer::default();
    let blocks = analyzer.analyze("# Title\n\nFirst paragraph.\n\nSecond paragraph.");
    assert_eq!(
        blocks,
        vec![
            BlockKind::Heading {
                level: 1,
                text: "Title".into()
            },
            BlockKind::Paragraph {
                text: "First paragraph.".into()
            },
            BlockKind::Paragraph {
                text: "Second paragraph.".into()
            },
        ]
    );
}

// ── Renderer ─────────────────────────────────────────────────────────────

#[test]
fn renderer_example_body() {
    let renderer = DocumentRenderer::new().unwrap();
    let body = renderer
        .render_body(&[
            BlockKind::Heading {
                level: 1,
                text: "Intro".into(),
            },
            BlockKind::Paragraph {
                text: "Body text.".into(),
            },
        ])
        .unwrap();
    assert_eq!(body, "\\section*{Intro}\nBody text.\n\n");
}

#[test]
fn renderer_full_document_from_analysis() {
    let doc = analyzed_document(&["# Intro\n\nBody text.", "Second page text."]);
    let renderer = DocumentRenderer::new().unwrap();
    let tex = renderer.render_document(&doc, None).unwrap();
    assert!(tex.contains("\\section*{Intro}"));
    assert!(tex.contains("Second page text."));
    assert!(tex.starts_with("\\documentclass{article}"));
}

// ── Persistence round-trip ───────────────────────────────────────────────

fn memory_gateway() -> (PersistenceGateway, Arc<MemoryStore>, Arc<MemoryStore>) {
    let relational = Arc::new(MemoryStore::new());
    let graph = Arc::new(MemoryStore::new());
    let gateway = PersistenceGateway::new(
        Box::new(Arc::clone(&relational)),
        Box::new(Arc::clone(&graph)),
    );
    (gateway, relational, graph)
}

#[tokio::test]
async fn round_trip_reconstructs_page_and_block_order() {
    let doc = analyzed_document(&[
        "# Title\n\nFirst paragraph.\n\nSecond paragraph.",
        "Only paragraph.",
        "# A\n\n# B\n\nc\n\nd\n\ne",
    ]);
    let (gateway, _relational, _graph) = memory_gateway();
    gateway.persist(&doc).await.unwrap();

    let pages = gateway.fetch_page_ids(doc.id).await.unwrap();
    let expected_pages: Vec<(Uuid, usize)> = doc.pages.iter().map(|p| (p.id, p.number)).collect();
    assert_eq!(pages, expected_pages);

    for page in &doc.pages {
        let order = gateway.fetch_block_order(page.id).await.unwrap();
        let expected: Vec<Uuid> = page.blocks.iter().map(|b| b.id).collect();
        assert_eq!(order, expected, "page {}", page.number);
    }

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn both_backends_receive_every_block() {
    let doc = analyzed_document(&["# H\n\np1\n\np2"]);
    let (gateway, relational, graph) = memory_gateway();
    gateway.persist(&doc).await.unwrap();

    assert_eq!(relational.block_count(), 3);
    assert_eq!(graph.block_count(), 3);
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn repeated_runs_create_duplicate_documents() {
    // No upsert key: each pipeline run builds a fresh Document with fresh
    // ids, so persisting the same input twice doubles the stored entities.
    let (gateway, relational, _graph) = memory_gateway();
    let first = analyzed_document(&["text"]);
    let second = analyzed_document(&["text"]);
    gateway.persist(&first).await.unwrap();
    gateway.persist(&second).await.unwrap();

    assert_eq!(relational.document_count(), 2);
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn graph_failure_after_relational_write_is_divergence() {
    // A graph store that rejects everything after connect.
    struct FailingStore;

    #[async_trait::async_trait]
    impl scantex::StructureStore for FailingStore {
        async fn insert_document(&self, _: &Document) -> Result<(), StoreError> {
            Err(StoreError::Graph("bolt connection reset".into()))
        }
        async fn insert_page(&self, _: &Page) -> Result<(), StoreError> {
            Err(StoreError::Graph("bolt connection reset".into()))
        }
        async fn insert_block(&self, _: &scantex::Block) -> Result<(), StoreError> {
            Err(StoreError::Graph("bolt connection reset".into()))
        }
        async fn link_follows(&self, _: Uuid, _: Uuid) -> Result<(), StoreError> {
            Err(StoreError::Graph("bolt connection reset".into()))
        }
        async fn fetch_page_ids(&self, _: Uuid) -> Result<Vec<(Uuid, usize)>, StoreError> {
            Err(StoreError::Graph("bolt connection reset".into()))
        }
        async fn fetch_block_order(&self, _: Uuid) -> Result<Vec<Uuid>, StoreError> {
            Err(StoreError::Graph("bolt connection reset".into()))
        }
        async fn close(self: Box<Self>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    let relational = Arc::new(MemoryStore::new());
    let gateway =
        PersistenceGateway::new(Box::new(Arc::clone(&relational)), Box::new(FailingStore));

    let doc = analyzed_document(&["text"]);
    let err = gateway.persist(&doc).await.unwrap_err();
    match err {
        StoreError::Divergence { document_id, .. } => assert_eq!(document_id, doc.id),
        other => panic!("expected Divergence, got {other}"),
    }
    // The relational write went through before the graph failed.
    assert_eq!(relational.document_count(), 1);
    gateway.close().await.unwrap();
}

// ── Page-local failure tolerance ─────────────────────────────────────────

#[test]
fn empty_ocr_text_yields_empty_block_list() {
    // An OCR failure is downgraded to empty text; the page must still
    // exist with zero blocks and not disturb its neighbours.
    let doc = analyzed_document(&["before", "", "after"]);
    assert_eq!(doc.pages.len(), 3);
    assert_eq!(doc.pages[0].blocks.len(), 1);
    assert_eq!(doc.pages[1].blocks.len(), 0);
    assert_eq!(doc.pages[2].blocks.len(), 1);
}

#[tokio::test]
async fn empty_page_round_trips() {
    let doc = analyzed_document(&["before", "", "after"]);
    let (gateway, _relational, _graph) = memory_gateway();
    gateway.persist(&doc).await.unwrap();

    let order = gateway.fetch_block_order(doc.pages[1].id).await.unwrap();
    assert!(order.is_empty());
    gateway.close().await.unwrap();
}
