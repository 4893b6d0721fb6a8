//! Structure analysis: split raw page text into typed blocks.
//!
//! Two passes over the text:
//!
//! 1. Every line starting with a run of the marker character is a heading;
//!    the run length is the level, the trailing text (trimmed) the content.
//! 2. The text minus its heading lines is split on blank lines; each
//!    non-empty trimmed segment becomes a paragraph.
//!
//! Because the passes run to completion independently, the emitted order is
//! all headings first, then all paragraphs. When headings and paragraphs
//! interleave on a page this does NOT match top-to-bottom reading order.
//! Downstream consumers (persistence, renderer) honour the emitted order as
//! authoritative; changing it to true reading order is a deliberate future
//! semantics change, not a local cleanup.
//!
//! List, table, figure and equation detection are deferred; they slot in as
//! additional passes emitting the existing [`BlockKind`] variants.

use crate::model::BlockKind;
use regex::Regex;

/// Per-run text analyzer. Holds the heading pattern compiled for the
/// configured marker character.
pub struct StructureAnalyzer {
    marker: char,
    heading_re: Regex,
}

impl StructureAnalyzer {
    /// Build an analyzer for the given heading marker character.
    ///
    /// The marker is escaped, so regex metacharacters like `*` are safe.
    /// The pattern is applied to one line at a time, so a heading's text is
    /// always the remainder of its own line and nothing past it.
    pub fn new(marker: char) -> Self {
        let escaped = regex::escape(&marker.to_string());
        let heading_re = Regex::new(&format!(r"^({escaped}+)[ \t]*(.*)$"))
            .unwrap_or_else(|e| unreachable!("escaped marker pattern is valid: {e}"));
        Self { marker, heading_re }
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    /// Analyze one page's text into an ordered block sequence.
    ///
    /// Empty or whitespace-only input yields an empty sequence.
    pub fn analyze(&self, text: &str) -> Vec<BlockKind> {
        let mut blocks = Vec::new();

        // Pass 1: headings, in line order.
        for line in text.lines() {
            if let Some(caps) = self.heading_re.captures(line) {
                let level = caps[1].chars().count();
                let content = caps[2].trim().to_string();
                blocks.push(BlockKind::Heading {
                    level,
                    text: content,
                });
            }
        }

        // Pass 2: paragraphs from the text with heading lines blanked out,
        // split on blank-line boundaries.
        let remaining: String = text
            .lines()
            .map(|line| {
                if self.heading_re.is_match(line) {
                    ""
                } else {
                    line
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        for segment in remaining.split("\n\n") {
            let paragraph = segment.trim();
            if !paragraph.is_empty() {
                blocks.push(BlockKind::Paragraph {
                    text: paragraph.to_string(),
                });
            }
        }

        blocks
    }
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new('#')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_then_paragraphs() {
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

    #[test]
    fn marker_run_length_is_level() {
        let analyzer = StructureAnalyzer::default();
        let blocks = analyzer.analyze("### Deep heading");
        assert_eq!(
            blocks,
            vec![BlockKind::Heading {
                level: 3,
                text: "Deep heading".into()
            }]
        );
    }

    #[test]
    fn interleaved_input_emits_headings_first() {
        // Documented behaviour: two passes, so the heading that appears
        // after the first paragraph in the source still precedes it in
        // the output.
        let analyzer = StructureAnalyzer::default();
        let blocks = analyzer.analyze("Intro text.\n\n# Later heading\n\nBody.");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], BlockKind::Heading { .. }));
        assert!(matches!(blocks[1], BlockKind::Paragraph { .. }));
        assert!(matches!(blocks[2], BlockKind::Paragraph { .. }));
    }

    #[test]
    fn counts_match_input_shape() {
        let analyzer = StructureAnalyzer::default();
        let text = "# A\n\n## B\n\npara one\n\npara two\n\npara three";
        let blocks = analyzer.analyze(text);
        let headings = blocks
            .iter()
            .filter(|b| matches!(b, BlockKind::Heading { .. }))
            .count();
        let paragraphs = blocks
            .iter()
            .filter(|b| matches!(b, BlockKind::Paragraph { .. }))
            .count();
        assert_eq!(headings, 2);
        assert_eq!(paragraphs, 3);
    }

    #[test]
    fn bare_marker_line_is_an_empty_heading() {
        // A marker with no title must not absorb the text of the next
        // block; the heading ends at its own line.
        let analyzer = StructureAnalyzer::default();
        let blocks = analyzer.analyze("#\n\nNext para");
        assert_eq!(
            blocks,
            vec![
                BlockKind::Heading {
                    level: 1,
                    text: String::new()
                },
                BlockKind::Paragraph {
                    text: "Next para".into()
                },
            ]
        );
    }

    #[test]
    fn empty_and_whitespace_input() {
        let analyzer = StructureAnalyzer::default();
        assert!(analyzer.analyze("").is_empty());
        assert!(analyzer.analyze("   \n\n   \n").is_empty());
    }

    #[test]
    fn custom_marker_is_escaped() {
        let analyzer = StructureAnalyzer::new('*');
        let blocks = analyzer.analyze("** Starred\n\nplain");
        assert_eq!(
            blocks,
            vec![
                BlockKind::Heading {
                    level: 2,
                    text: "Starred".into()
                },
                BlockKind::Paragraph {
                    text: "plain".into()
                },
            ]
        );
    }

    #[test]
    fn multiline_paragraph_stays_one_block() {
        let analyzer = StructureAnalyzer::default();
        let blocks = analyzer.analyze("line one\nline two\n\nnext");
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0],
            BlockKind::Paragraph {
                text: "line one\nline two".into()
            }
        );
    }
}
