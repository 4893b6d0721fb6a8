//! Document rendering: structured blocks → LaTeX source.
//!
//! The block-to-markup mapping is data, not control flow: each block type
//! has a small Tera snippet keyed by its type tag, and the traversal just
//! looks snippets up. Adding a new block type means adding one snippet; the
//! loop never changes. A block whose type has no snippet contributes nothing
//! to the output, logged at warn so dropped content is visible in the run
//! log rather than silently missing from the `.tex`.
//!
//! The rendered body is wrapped in a document template (a minimal `article`
//! wrapper by default, or a caller-supplied `.tex` Tera template receiving
//! `body`, `filename` and `title`).

use crate::error::ScanTexError;
use crate::model::{BlockKind, Document};
use tera::{Context, Tera};
use tracing::warn;

/// Per-block snippets, keyed by [`BlockKind::type_tag`].
///
/// Snippet context is the serialised block payload (`text`, `level`,
/// `items`, ...). Kinds absent here are dropped at render time.
const BLOCK_SNIPPETS: &[(&str, &str)] = &[
    (
        "heading",
        "{% if level == 1 %}\\section*{ {{- text -}} }\
         {% elif level == 2 %}\\subsection*{ {{- text -}} }\
         {% else %}\\subsubsection*{ {{- text -}} }{% endif %}\n",
    ),
    ("paragraph", "{{ text }}\n\n"),
];

/// Default document wrapper.
const DOCUMENT_TEMPLATE: &str = r#"\documentclass{article}
\begin{document}

{{ body }}
\end{document}
"#;

/// Renders block sequences to LaTeX.
pub struct DocumentRenderer {
    tera: Tera,
}

impl DocumentRenderer {
    /// Build a renderer with the built-in document template.
    pub fn new() -> Result<Self, ScanTexError> {
        Self::with_document_template(DOCUMENT_TEMPLATE)
    }

    /// Build a renderer with a caller-supplied document template source.
    ///
    /// The template receives `body` (the rendered block markup), `filename`
    /// and `title` (optional).
    pub fn with_document_template(document_template: &str) -> Result<Self, ScanTexError> {
        let mut tera = Tera::default();
        tera.add_raw_template("document.tex", document_template)
            .map_err(|e| ScanTexError::Template(e.to_string()))?;
        for (tag, snippet) in BLOCK_SNIPPETS {
            tera.add_raw_template(&format!("block/{tag}"), snippet)
                .map_err(|e| ScanTexError::Template(e.to_string()))?;
        }
        Ok(Self { tera })
    }

    /// Build a renderer loading the document template from a file.
    pub fn from_template_file(path: &std::path::Path) -> Result<Self, ScanTexError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ScanTexError::Template(format!("cannot read template '{}': {}", path.display(), e))
        })?;
        Self::with_document_template(&source)
    }

    /// Render one block sequence to its LaTeX body markup.
    ///
    /// Blocks are rendered in the given order. Unknown block types are
    /// skipped with a warning.
    pub fn render_body(&self, blocks: &[BlockKind]) -> Result<String, ScanTexError> {
        let mut body = String::new();
        for block in blocks {
            let tag = block.type_tag();
            let template = format!("block/{tag}");
            if !self.tera.get_template_names().any(|n| n == template) {
                warn!("Dropping block of unmapped type '{}'", tag);
                continue;
            }
            let context = Context::from_serialize(block)
                .map_err(|e| ScanTexError::Template(e.to_string()))?;
            let rendered = self
                .tera
                .render(&template, &context)
                .map_err(|e| ScanTexError::Template(e.to_string()))?;
            body.push_str(&rendered);
        }
        Ok(body)
    }

    /// Render a whole document: every page's blocks in page order, wrapped
    /// in the document template.
    pub fn render_document(
        &self,
        document: &Document,
        title: Option<&str>,
    ) -> Result<String, ScanTexError> {
        let mut body = String::new();
        for page in &document.pages {
            let kinds: Vec<BlockKind> = page.blocks.iter().map(|b| b.kind.clone()).collect();
            body.push_str(&self.render_body(&kinds)?);
        }

        let mut context = Context::new();
        context.insert("body", &body);
        context.insert("filename", &document.filename);
        context.insert("title", &title);
        self.tera
            .render("document.tex", &context)
            .map_err(|e| ScanTexError::Template(e.to_string()))
    }
}
