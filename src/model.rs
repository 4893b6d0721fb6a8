//! Structural document model: Document → Page → Block.
//!
//! The model is a strict containment tree built once per run and never
//! mutated afterwards. Block order within a page is carried by an explicit
//! `seq` field assigned at analysis time; the persisted FOLLOWS chain is
//! derived from it by the gateway, so the storage layer never has to infer
//! order from insertion side-effects.
//!
//! Block payloads are a tagged variant rather than an open key/value bag:
//! each kind carries exactly the fields it needs, and adding a new kind is a
//! compile-checked change to [`BlockKind`] plus a template entry in the
//! renderer — no schema drift possible.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One source document for a single pipeline run.
///
/// Owns its pages; immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Base filename of the source, e.g. `report.pdf`.
    pub filename: String,
    /// Full path to the source file, when known.
    pub source_path: Option<PathBuf>,
    pub pages: Vec<Page>,
}

impl Document {
    /// Create an empty document for the given source path.
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        let source_path: PathBuf = source_path.into();
        let filename = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.to_string_lossy().into_owned());
        Self {
            id: Uuid::new_v4(),
            filename,
            source_path: Some(source_path),
            pages: Vec::new(),
        }
    }
}

/// One page of a document.
///
/// `number` is 1-based. Physical dimensions are in PDF points and may be
/// unknown when the page came from a pre-rasterised image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub document_id: Uuid,
    pub number: usize,
    pub width: Option<f32>,
    pub height: Option<f32>,
    /// Blocks in reading order as emitted by the analyzer; `blocks[i].seq == i`.
    pub blocks: Vec<Block>,
}

impl Page {
    pub fn new(document_id: Uuid, number: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            number,
            width: None,
            height: None,
            blocks: Vec::new(),
        }
    }

    /// Attach blocks, assigning contiguous `seq` values and the page id.
    pub fn set_blocks(&mut self, kinds: Vec<BlockKind>) {
        self.blocks = kinds
            .into_iter()
            .enumerate()
            .map(|(seq, kind)| Block {
                id: Uuid::new_v4(),
                page_id: self.id,
                seq,
                bbox: None,
                kind,
            })
            .collect();
    }
}

/// Positional attributes of a block on its page, in pixels of the
/// rasterised image. Optional throughout — the text analyzer has no layout
/// information; a future layout-based analyzer would fill these in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Smallest structural unit of page content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    pub page_id: Uuid,
    /// 0-based ordinal within the page; the FOLLOWS chain is derived from it.
    pub seq: usize,
    pub bbox: Option<BoundingBox>,
    pub kind: BlockKind,
}

/// Typed block payload.
///
/// `Heading` and `Paragraph` are produced by the current analyzer. The
/// remaining kinds are declared so that list/table/figure/equation detectors
/// can be added without touching the Block contract; the renderer drops the
/// ones its template does not know (with a warning).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Heading { level: usize, text: String },
    Paragraph { text: String },
    ListItems { items: Vec<String> },
    Table { rows: Vec<Vec<String>> },
    Figure { caption: String },
    Equation { tex: String },
}

impl BlockKind {
    /// Stable type tag used as the `block_type` column / node property.
    pub fn type_tag(&self) -> &'static str {
        match self {
            BlockKind::Heading { .. } => "heading",
            BlockKind::Paragraph { .. } => "paragraph",
            BlockKind::ListItems { .. } => "list",
            BlockKind::Table { .. } => "table",
            BlockKind::Figure { .. } => "figure",
            BlockKind::Equation { .. } => "equation",
        }
    }

    /// Heading level, for heading blocks only.
    pub fn level(&self) -> Option<usize> {
        match self {
            BlockKind::Heading { level, .. } => Some(*level),
            _ => None,
        }
    }

    /// Flat text content used by the relational store's `content` column.
    pub fn content(&self) -> String {
        match self {
            BlockKind::Heading { text, .. } | BlockKind::Paragraph { text } => text.clone(),
            BlockKind::ListItems { items } => items.join("\n"),
            BlockKind::Table { rows } => rows
                .iter()
                .map(|r| r.join("\t"))
                .collect::<Vec<_>>()
                .join("\n"),
            BlockKind::Figure { caption } => caption.clone(),
            BlockKind::Equation { tex } => tex.clone(),
        }
    }
}
