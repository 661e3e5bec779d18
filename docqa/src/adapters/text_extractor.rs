use std::path::Path;

use async_trait::async_trait;
use pulldown_cmark::{Event, Parser, TagEnd};

use crate::domain::ExtractedDocument;
use crate::error::{DocQaError, Result};
use crate::ports::DocumentExtractor;

/// Share of undecodable characters above which a file is treated as binary.
const MAX_REPLACEMENT_RATIO: f64 = 0.1;

/// Plain text, reStructuredText and Markdown files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

impl TextExtractor {
    pub const fn new() -> Self {
        Self
    }
}

fn file_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    match extension.as_str() {
        "txt" | "text" => Some("txt"),
        "md" | "markdown" => Some("md"),
        "rst" => Some("rst"),
        _ => None,
    }
}

#[async_trait]
impl DocumentExtractor for TextExtractor {
    fn supports(&self, path: &Path) -> bool {
        file_type(path).is_some()
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocQaError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(file_type) = file_type(path) else {
            let extension = path
                .extension()
                .map_or_else(|| "none".to_string(), |e| e.to_string_lossy().to_string());
            return Err(DocQaError::Format(format!(
                "{}: unsupported file type ({extension}), expected .txt, .md or .rst",
                path.display()
            )));
        };

        let (text, encoding) = decode(&bytes).ok_or_else(|| {
            DocQaError::Format(format!("{}: not a text file", path.display()))
        })?;
        let text = if file_type == "md" {
            markdown_to_text(&text)
        } else {
            text
        };

        let filename = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());

        Ok(ExtractedDocument::new(filename, file_type, text)
            .with_metadata("encoding", encoding)
            .with_metadata("size_bytes", bytes.len().to_string()))
    }
}

/// UTF-8 text with the encoding label, or `None` for binary content.
fn decode(bytes: &[u8]) -> Option<(String, &'static str)> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some((text.to_string(), "utf-8"));
    }

    let text = String::from_utf8_lossy(bytes);
    let total = text.chars().count().max(1);
    let replaced = text.chars().filter(|c| *c == char::REPLACEMENT_CHARACTER).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = replaced as f64 / total as f64;
    if ratio > MAX_REPLACEMENT_RATIO || bytes.contains(&0) {
        return None;
    }
    Some((text.into_owned(), "utf-8-lossy"))
}

/// Drops Markdown syntax, keeping one blank line between blocks.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableRow,
            ) => out.push_str("\n\n"),
            Event::End(TagEnd::TableCell) => out.push(' '),
            _ => {}
        }
    }

    out.trim().to_string()
}
