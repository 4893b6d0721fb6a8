//! Prompts and LaTeX scaffolding for the vision-model conversion path.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening a rule (e.g. how continued
//!    tables are handled) is an edit in exactly one place.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    live model call, so prompt regressions are easy to catch.
//!
//! Callers can override the conversion prompt via
//! [`crate::config::PipelineConfig::vision_prompt`]; the constants here are
//! used only when no override is provided.

/// Default conversion prompt for transcribing a scanned page image to LaTeX.
///
/// The rules are deliberately strict about *hardcoded* numbering: section,
/// equation and algorithm numbers are copied from the image rather than left
/// to LaTeX counters, because pages are converted independently and automatic
/// numbering would restart on every fragment.
pub const DEFAULT_CONVERSION_PROMPT: &str = r#"Convert the provided scanned page image to LaTeX code, adhering to the following specifications:

0. **Preserve Scanned Order:** The generated LaTeX code must maintain the exact same element order as the original scanned image.

1. **Running Headers:** If the first or second line is a running header repeated from page to page (a document title or standard identifier), ignore those lines.

2. **Restricted Packages:** Use *only* these packages if required: `inputenc`, `amsmath`, `amsfonts`, `amssymb`, `algorithm`, `algpseudocode`, `array`, `booktabs`, `float`, `graphicx`, `caption`, `subcaption`, `listings`, `hyperref`, `enumitem`, `setspace`, `xcolor`, `cite`, `mathtools`, `siunitx`, `longtable`, `multirow`, `rotating`, `wrapfig`, and `verbatim`. Do not include any `\usepackage` statements in the output.

3. **Excluded Tags:** Do not include `\title`, `\author`, `\date`, `\maketitle`, or `\begin{document}`/`\end{document}` tags.

4. **Output Format:** Output *only* the LaTeX code, without any additional text or explanations. Do not include the opening and closing ```latex markers.

5. **Paragraphs:** Separate each paragraph with a blank line.

6. **Formatting:** Accurately reproduce the text formatting from the image. Use:
    * `\textbf{...}` for bold text.
    * `\textit{...}` for italicized text.
    * `\underline{...}` for underlined text.

7. **Content Inclusion/Exclusion:** Include *all* content from the scan, from the very beginning to the end, except page numbers. This includes titles, subtitles, introductory paragraphs, as well as all numbered and unnumbered sections, formulas, algorithms, lists, and tables. Do not exclude any text elements. Do not create `\section` or `\subsection` tags if they are not present in the original document.

8. **Multi-Page Element Handling:** If any element (text, formula, table, list, figure, etc.) begins on the scanned image but is clearly a continuation from the previous page:
    * **Placement:** Insert the continuation at the **very beginning** of the LaTeX output for the current page, *before* any other content on that page.
    * **Representation:** Begin the LaTeX output for the continued element with an ellipsis (...) followed by the partial element. If the beginning of the element is unclear due to the cut-off, add a comment explaining the uncertainty AND include an ellipsis as a placeholder for the missing content (e.g., `% Table begins mid-row; unable to reconstruct previous page content.\n...`). Attempt to reconstruct missing portions of tables or formulas if possible, adding a comment to indicate the reconstruction.

9. **Special Symbols and Math:**
    * Accurately reproduce special symbols and mathematical notation.
    * Use correct LaTeX notation for mathematical sets and number systems (e.g., `\mathbb{B}` for the set of bytes, `\mathbb{Z}` for integers). Clearly define any non-standard notation.
    * Use the following LaTeX code for specific symbols:
        * `←`: `$\gets$`, `$\leftarrow$`, or `$\longleftarrow$`
        * `→`: `$\to$`, `$\rightarrow$`, or `$\longrightarrow$`
        * `∈`: `$\in$`
        * `∋`: `$\ni$`
        * `≤`: `$\leq$`
    * Convert all math symbols to their corresponding LaTeX glyph code.
    * Convert any remaining Unicode characters to their respective LaTeX glyphs.

10. **Faithful Reproduction:** Ensure all formatting (spacing, line breaks, equation placement) is faithfully reproduced in the LaTeX output.

11. **Section and Subsection Numbering:**
    * If a section or subsection is unnumbered in the image, do not include a number in the LaTeX output (e.g., use `\section*{Foo}`).
    * If numbered, hardcode the number from the image (e.g., `\section*{4. Auxiliary Algorithms}`). Do not use automatic numbering.

12. **Formula Numbering:** Hardcode formula numbers from the image using `\tag{}` within the `equation` environment (e.g., `\begin{equation}\tag{4.1} ... \end{equation}`). Do not use automatic numbering.

13. **Algorithm Numbering:** Hardcode algorithm numbers from the image. Do not use automatic numbering. Ensure that the algorithm number is explicitly present within the algorithm environment (e.g., "Algorithm 1"). Use the `algorithm` environment and related commands (`\caption`, `\label`, `\begin{algorithmic}`, etc.) correctly.

14. **Page Numbers:** Ignore page numbers at the bottom of the scanned image.

15. **Consistent Notation:** Maintain consistent notation throughout the document. Define any non-standard notation.

16. **Section Mapping:** Each scanned section will be converted into one or more LaTeX sections based on its content. Sections shall be split if they contain different content types (e.g., a paragraph followed by a formula). Retain the original order of the content. If a heading applies to a whole mixed-content section, include it only before the first sub-section in LaTeX. Specifically:
    * **Formula Only:** Use `equation` environments, with `\tag{}` for explicit numbering if present in the image.
    * **Algorithm Only:** Use `\setcounter{algorithm}{n}` (where n is the algorithm number from the image minus one) before each `algorithm` environment, then `\begin{algorithm}[H]` with `\caption`, `\begin{algorithmic}[1]`, `\Require`/`\Ensure`, `\State`, and `\Comment` as appropriate. Include all comments from the image.
    * **List Only:** Use `\begin{itemize}[noitemsep,itemsep=5pt,topsep=0pt]`, adjusting item spacing to match the image if needed.
    * **Table Only:** Use a `table` environment with `tabular`, applying booktabs rules (`\toprule`, `\midrule`, `\bottomrule`) if the table uses horizontal lines, and `\caption`/`\label` from the image if any.

17. **Final Output:** The final output should contain *only* the generated LaTeX code, as described above, without any additional text, diagrams, comments, or other elements not present in the scanned image (except for the required structural elements and formatting commands)."#;

/// Instruction prepended on the corrective second pass.
///
/// The first pass's output is attached after the conversion prompt under the
/// `ORIGINAL_LATEX` identifier (see [`review_prompt`]).
pub const REVIEW_PREFIX: &str = r#"Review the text attached to the end of this prompt,
which is denoted by the identifier `ORIGINAL_LATEX`. Then follow
the instructions:

"#;

/// Standalone document preamble wrapped around the combined page fragments.
///
/// Loads every package the conversion prompt's allow-list permits, so any
/// fragment the model can legally produce compiles without edits.
pub const LATEX_PREAMBLE: &str = r#"\documentclass{article}
\usepackage[utf8]{inputenc}
\usepackage{amsmath}
\usepackage{amsfonts}
\usepackage{amssymb}
\usepackage{algorithm}
\usepackage{algpseudocode}
\usepackage{array}
\usepackage{booktabs}
\usepackage{float}
\usepackage{graphicx}
\usepackage{caption}
\usepackage{subcaption}
\usepackage{listings}
\usepackage{hyperref}
\usepackage{enumitem}
\usepackage{setspace}
\usepackage{xcolor}
\usepackage{cite}
\usepackage{mathtools}
\usepackage{siunitx}
\usepackage{longtable}
\usepackage{multirow}
\usepackage{rotating}
\usepackage{wrapfig}
\usepackage{verbatim}

\usepackage[margin=0.5in]{geometry}
\usepackage[skip=10pt plus1pt, indent=40pt]{parskip}

\newlength\tindent
\setlength{\tindent}{\parindent}
\setlength{\parindent}{0pt}
\renewcommand{\indent}{\hspace*{\tindent}}

\begin{document}

"#;

pub const LATEX_POSTAMBLE: &str = r#"

\end{document}
"#;

/// Build the corrective-pass prompt carrying the first pass's output.
pub fn review_prompt(conversion_prompt: &str, original_latex: &str) -> String {
    format!(
        "{REVIEW_PREFIX}{conversion_prompt}\n\nORIGINAL_LATEX:\n```\n{original_latex}\n```"
    )
}

/// Wrap combined page fragments into a standalone compilable document,
/// with an optional `\title`/`\maketitle` block.
pub fn wrap_document(body: &str, title: Option<&str>) -> String {
    match title {
        Some(title) => format!(
            "{LATEX_PREAMBLE}\\title{{{title}}}\n\\author{{}}\n\\date{{}}\n\\maketitle\n\n{body}{LATEX_POSTAMBLE}"
        ),
        None => format!("{LATEX_PREAMBLE}{body}{LATEX_POSTAMBLE}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_prompt_forbids_preamble_tags() {
        assert!(DEFAULT_CONVERSION_PROMPT.contains("Do not include any `\\usepackage`"));
        assert!(DEFAULT_CONVERSION_PROMPT.contains("\\begin{document}"));
    }

    #[test]
    fn review_prompt_embeds_prior_output() {
        let p = review_prompt(DEFAULT_CONVERSION_PROMPT, "\\section*{Old}");
        assert!(p.starts_with(REVIEW_PREFIX));
        assert!(p.contains("ORIGINAL_LATEX:"));
        assert!(p.contains("\\section*{Old}"));
        assert!(p.ends_with("```"));
    }

    #[test]
    fn wrapped_document_is_balanced() {
        let doc = wrap_document("\\section*{A}\nBody.", Some("Report"));
        assert!(doc.starts_with("\\documentclass{article}"));
        assert!(doc.contains("\\title{Report}"));
        assert!(doc.trim_end().ends_with("\\end{document}"));
    }
}
