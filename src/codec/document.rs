use std::path::Path;

use crate::{
    codec::{line::LineCursor, parser::PageParser, read_source, ProgressFn},
    error::LDrawError,
    model::Document,
};

/// Parses a whole file into a [Document]: one page, or several for multi-part (`FILE`/`NOFILE`)
/// files.
pub struct DocumentParser;

impl DocumentParser {
    /// Target names must be unique within the document; a repeated one is a syntax error at the
    /// line that starts the offending page. The document's release status is the first page's.
    #[tracing::instrument(skip_all, fields(path = ?path))]
    pub fn parse(
        source: &str,
        path: Option<&Path>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Document, LDrawError> {
        let display = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string());
        let declared = path.map(|p| p.to_string_lossy().into_owned());
        let mut document = Document::new(path.map(Path::to_path_buf));
        let mut cursor = LineCursor::new(source);
        let mut first = true;

        loop {
            if !first {
                // Blank lines between pages carry nothing.
                while cursor.peek().is_some_and(|l| l.text.trim().is_empty()) {
                    cursor.advance();
                }
                if cursor.is_at_end() {
                    break;
                }
            }
            let start = cursor.peek();
            let page_declared = if first { declared.as_deref() } else { None };
            let page = PageParser::parse_next(&mut cursor, &display, page_declared, progress)?;
            document.add_page(page).map_err(|e| match (e, start) {
                (LDrawError::DuplicateTarget(target), Some(start)) => LDrawError::syntax(
                    &display,
                    start.text,
                    start.number,
                    format!("duplicate target name '{target}'"),
                ),
                (other, _) => other,
            })?;
            first = false;
            if cursor.is_at_end() {
                break;
            }
        }

        let status = document
            .main_page()
            .map(|page| page.header().status.clone())
            .unwrap_or_default();
        document.set_status(status);
        let display_name = &display;
        tracing::debug!("Parsed {display_name}: {} page(s)", document.pages().len());
        Ok(document)
    }

    /// Read (lossy UTF-8) and parse a file.
    pub fn parse_file(path: &Path, progress: &mut ProgressFn<'_>) -> Result<Document, LDrawError> {
        let source = read_source(path)?;
        Self::parse(&source, Some(path), progress)
    }
}
