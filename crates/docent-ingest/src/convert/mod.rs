//! Multi-format conversion into a flat, ordered list of labeled elements.
//!
//! Office and web formats keep their structure ([`DocElement`]s with a
//! label and an optional page). PDF and plain text only yield flat text.

#[cfg(feature = "convert")]
mod archive;
#[cfg(feature = "convert")]
mod docx;
#[cfg(feature = "convert")]
mod epub;
#[cfg(feature = "convert")]
mod html;
#[cfg(feature = "convert")]
mod markdown;
#[cfg(feature = "convert")]
mod odf;
#[cfg(feature = "convert")]
mod pptx;
#[cfg(feature = "convert")]
mod spreadsheet;

use std::collections::BTreeMap;

use crate::chunk::ChunkType;
use crate::source::FileInput;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("document conversion support is not compiled in")]
    Unavailable,

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("{0} input has no element tree")]
    NoElementTree(InputFormat),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Source formats understood by [`DocumentConverter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputFormat {
    Docx,
    Xlsx,
    Xlsm,
    Xls,
    Ods,
    Pptx,
    Odt,
    Odp,
    Pdf,
    Html,
    Markdown,
    Epub,
    Text,
    Latex,
}

impl InputFormat {
    pub const ALL: [Self; 14] = [
        Self::Docx,
        Self::Xlsx,
        Self::Xlsm,
        Self::Xls,
        Self::Ods,
        Self::Pptx,
        Self::Odt,
        Self::Odp,
        Self::Pdf,
        Self::Html,
        Self::Markdown,
        Self::Epub,
        Self::Text,
        Self::Latex,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Xlsm => "xlsm",
            Self::Xls => "xls",
            Self::Ods => "ods",
            Self::Pptx => "pptx",
            Self::Odt => "odt",
            Self::Odp => "odp",
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Markdown => "md",
            Self::Epub => "epub",
            Self::Text => "txt",
            Self::Latex => "latex",
        }
    }

    /// Accepts extensions with or without the leading dot, any case.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        let format = match ext.as_str() {
            "docx" => Self::Docx,
            "xlsx" => Self::Xlsx,
            "xlsm" => Self::Xlsm,
            "xls" => Self::Xls,
            "ods" => Self::Ods,
            "pptx" => Self::Pptx,
            "odt" => Self::Odt,
            "odp" => Self::Odp,
            "pdf" => Self::Pdf,
            "html" | "htm" | "xhtml" => Self::Html,
            "md" | "markdown" => Self::Markdown,
            "epub" => Self::Epub,
            "txt" => Self::Text,
            "tex" | "latex" => Self::Latex,
            _ => return None,
        };
        Some(format)
    }

    /// Guess the format from content alone.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }
        if bytes.starts_with(b"PK\x03\x04") {
            return sniff_package(bytes);
        }
        let text = std::str::from_utf8(bytes).ok()?;
        let head = text.trim_start().get(..15).unwrap_or(text.trim_start());
        let head = head.to_ascii_lowercase();
        if head.starts_with("<!doctype html") || head.starts_with("<html") {
            return Some(Self::Html);
        }
        Some(Self::Text)
    }

    /// Formats whose backend produces labeled elements rather than flat text.
    #[must_use]
    pub fn has_element_tree(self) -> bool {
        !matches!(self, Self::Pdf | Self::Text | Self::Latex)
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "convert")]
fn sniff_package(bytes: &[u8]) -> Option<InputFormat> {
    archive::Package::open(bytes).ok()?.sniff()
}

#[cfg(not(feature = "convert"))]
fn sniff_package(_bytes: &[u8]) -> Option<InputFormat> {
    None
}

/// Document-level properties reported by the source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentProperties {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementLabel {
    Title,
    SectionHeader,
    Paragraph,
    ListItem,
    Table,
    Figure,
    Image,
    Caption,
    Code,
    Formula,
    Footnote,
    PageHeader,
    PageFooter,
}

impl ElementLabel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.chunk_type().as_str()
    }

    #[must_use]
    pub fn chunk_type(self) -> ChunkType {
        match self {
            Self::Title => ChunkType::Title,
            Self::SectionHeader => ChunkType::SectionHeader,
            Self::Paragraph => ChunkType::Paragraph,
            Self::ListItem => ChunkType::ListItem,
            Self::Table => ChunkType::Table,
            Self::Figure => ChunkType::Figure,
            Self::Image => ChunkType::Image,
            Self::Caption => ChunkType::Caption,
            Self::Code => ChunkType::Code,
            Self::Formula => ChunkType::Formula,
            Self::Footnote => ChunkType::Footnote,
            Self::PageHeader => ChunkType::PageHeader,
            Self::PageFooter => ChunkType::PageFooter,
        }
    }

    #[must_use]
    pub fn is_heading(self) -> bool {
        matches!(self, Self::Title | Self::SectionHeader)
    }
}

/// One labeled block of a converted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocElement {
    pub label: ElementLabel,
    pub text: String,
    pub page: Option<u32>,
}

impl DocElement {
    #[must_use]
    pub fn new(label: ElementLabel, text: impl Into<String>) -> Self {
        Self {
            label,
            text: text.into(),
            page: None,
        }
    }

    #[must_use]
    pub fn on_page(mut self, page: Option<u32>) -> Self {
        self.page = page;
        self
    }
}

/// Result of converting one document.
///
/// `structure` is `Err` when the backend only produces flat text or stopped
/// partway through; `text` is always usable.
#[derive(Debug)]
pub struct ConvertedDocument {
    pub format: InputFormat,
    pub properties: DocumentProperties,
    structure: Result<Vec<DocElement>, ConvertError>,
    text: String,
}

impl ConvertedDocument {
    #[must_use]
    pub fn from_elements(
        format: InputFormat,
        properties: DocumentProperties,
        elements: Vec<DocElement>,
    ) -> Self {
        let text = join_elements(&elements);
        Self {
            format,
            properties,
            structure: Ok(elements),
            text,
        }
    }

    #[must_use]
    pub fn from_text(format: InputFormat, properties: DocumentProperties, text: String) -> Self {
        Self {
            format,
            properties,
            structure: Err(ConvertError::NoElementTree(format)),
            text,
        }
    }

    /// Elements gathered before `error` stopped the backend.
    #[must_use]
    pub fn partial(
        format: InputFormat,
        properties: DocumentProperties,
        elements: &[DocElement],
        error: ConvertError,
    ) -> Self {
        Self {
            format,
            properties,
            structure: Err(error),
            text: join_elements(elements),
        }
    }

    /// Build from a backend walk that may have failed partway.
    pub(crate) fn from_walk(
        format: InputFormat,
        properties: DocumentProperties,
        elements: Vec<DocElement>,
        walk: Result<(), ConvertError>,
    ) -> Self {
        match walk {
            Ok(()) => Self::from_elements(format, properties, elements),
            Err(e) => Self::partial(format, properties, &elements, e),
        }
    }

    /// # Errors
    ///
    /// Returns the reason no element tree is available.
    pub fn texts(&self) -> Result<&[DocElement], &ConvertError> {
        self.structure.as_deref()
    }

    #[must_use]
    pub fn export_to_text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn has_structure(&self) -> bool {
        self.structure.is_ok()
    }

    /// Element counts keyed by label name; empty without an element tree.
    #[must_use]
    pub fn element_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        if let Ok(elements) = &self.structure {
            for element in elements {
                *counts.entry(element.label.as_str()).or_insert(0) += 1;
            }
        }
        counts
    }

    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.structure.as_ref().map_or(0, Vec::len)
    }
}

fn join_elements(elements: &[DocElement]) -> String {
    elements
        .iter()
        .map(|e| e.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Entry point for multi-format conversion.
#[derive(Debug, Clone, Copy)]
pub struct DocumentConverter {
    _loaded: (),
}

impl DocumentConverter {
    /// # Errors
    ///
    /// Returns [`ConvertError::Unavailable`] when built without the
    /// `convert` feature.
    pub fn load() -> Result<Self, ConvertError> {
        if cfg!(feature = "convert") {
            tracing::debug!("document converter initialized");
            Ok(Self { _loaded: () })
        } else {
            Err(ConvertError::Unavailable)
        }
    }

    /// Extension first, then content sniffing.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::UnsupportedFormat`] when neither identifies a
    /// known format.
    pub fn detect(&self, input: &FileInput, bytes: &[u8]) -> Result<InputFormat, ConvertError> {
        if let Some(ext) = input.extension() {
            return InputFormat::from_extension(&ext)
                .ok_or(ConvertError::UnsupportedFormat(ext));
        }
        InputFormat::sniff(bytes)
            .ok_or_else(|| ConvertError::UnsupportedFormat(input.display_name()))
    }

    /// # Errors
    ///
    /// Returns an error when the input cannot be read, its format is not
    /// recognized, or its container cannot be opened at all.
    pub fn convert(&self, input: &FileInput) -> Result<ConvertedDocument, ConvertError> {
        let bytes = input.read_bytes()?;
        let format = self.detect(input, &bytes)?;
        tracing::debug!("converting {} as {format}", input.display_name());
        convert_bytes(format, &bytes)
    }
}

#[cfg(feature = "convert")]
fn convert_bytes(format: InputFormat, bytes: &[u8]) -> Result<ConvertedDocument, ConvertError> {
    match format {
        InputFormat::Docx => docx::convert(bytes),
        InputFormat::Pptx => pptx::convert(bytes),
        InputFormat::Odt | InputFormat::Odp => odf::convert(bytes, format),
        InputFormat::Xlsx | InputFormat::Xlsm | InputFormat::Xls | InputFormat::Ods => {
            spreadsheet::convert(bytes, format)
        }
        InputFormat::Html => Ok(html::convert(&decode_utf8(bytes), format)),
        InputFormat::Markdown => Ok(markdown::convert(&decode_utf8(bytes))),
        InputFormat::Epub => epub::convert(bytes),
        InputFormat::Pdf => pdf_text(bytes),
        InputFormat::Text | InputFormat::Latex => Ok(ConvertedDocument::from_text(
            format,
            DocumentProperties::default(),
            decode_utf8(bytes).trim().to_owned(),
        )),
    }
}

#[cfg(not(feature = "convert"))]
fn convert_bytes(_format: InputFormat, _bytes: &[u8]) -> Result<ConvertedDocument, ConvertError> {
    Err(ConvertError::Unavailable)
}

#[cfg(feature = "convert")]
fn decode_utf8(bytes: &[u8]) -> std::borrow::Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

#[cfg(feature = "convert")]
fn pdf_text(bytes: &[u8]) -> Result<ConvertedDocument, ConvertError> {
    use crate::handlers::pdf::{LopdfSource, PageSource, source_text};

    let source = LopdfSource::load(bytes, "pdf").map_err(|e| ConvertError::Malformed(e.to_string()))?;
    let info = source.info();
    let properties = DocumentProperties {
        title: info.title,
        authors: info.author.into_iter().collect(),
        created: info.creation_date,
    };
    Ok(ConvertedDocument::from_text(
        InputFormat::Pdf,
        properties,
        source_text(&source),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup() {
        assert_eq!(InputFormat::from_extension(".DOCX"), Some(InputFormat::Docx));
        assert_eq!(InputFormat::from_extension("htm"), Some(InputFormat::Html));
        assert_eq!(InputFormat::from_extension(".markdown"), Some(InputFormat::Markdown));
        assert_eq!(InputFormat::from_extension(".tex"), Some(InputFormat::Latex));
        assert_eq!(InputFormat::from_extension(".rtf"), None);
        assert_eq!(InputFormat::from_extension(".doc"), None);
    }

    #[test]
    fn every_format_round_trips_through_its_name() {
        for format in InputFormat::ALL {
            assert_eq!(InputFormat::from_extension(format.as_str()), Some(format));
        }
    }

    #[test]
    fn sniff_plain_content() {
        assert_eq!(InputFormat::sniff(b"%PDF-1.7\n..."), Some(InputFormat::Pdf));
        assert_eq!(
            InputFormat::sniff(b"  <!DOCTYPE html><html></html>"),
            Some(InputFormat::Html)
        );
        assert_eq!(InputFormat::sniff(b"<html><body/>"), Some(InputFormat::Html));
        assert_eq!(InputFormat::sniff(b"hello"), Some(InputFormat::Text));
        assert_eq!(InputFormat::sniff(&[0xFF, 0xFE, 0x00]), None);
    }

    #[test]
    fn flat_text_formats() {
        assert!(!InputFormat::Pdf.has_element_tree());
        assert!(!InputFormat::Text.has_element_tree());
        assert!(InputFormat::Docx.has_element_tree());
    }

    #[test]
    fn labels_map_to_chunk_types() {
        assert_eq!(ElementLabel::ListItem.as_str(), "list_item");
        assert_eq!(ElementLabel::Table.chunk_type(), ChunkType::Table);
        assert!(ElementLabel::Title.is_heading());
        assert!(!ElementLabel::Caption.is_heading());
    }

    #[test]
    fn element_document_exports_text() {
        let doc = ConvertedDocument::from_elements(
            InputFormat::Html,
            DocumentProperties::default(),
            vec![
                DocElement::new(ElementLabel::Title, "Title"),
                DocElement::new(ElementLabel::Paragraph, "  "),
                DocElement::new(ElementLabel::Paragraph, "Body"),
                DocElement::new(ElementLabel::Paragraph, "More"),
            ],
        );
        assert!(doc.has_structure());
        assert_eq!(doc.export_to_text(), "Title\n\nBody\n\nMore");
        assert_eq!(doc.total_elements(), 4);
        let counts = doc.element_counts();
        assert_eq!(counts["paragraph"], 3);
        assert_eq!(counts["title"], 1);
    }

    #[test]
    fn flat_document_has_no_tree() {
        let doc = ConvertedDocument::from_text(
            InputFormat::Pdf,
            DocumentProperties::default(),
            "flat".into(),
        );
        assert!(matches!(doc.texts(), Err(ConvertError::NoElementTree(InputFormat::Pdf))));
        assert_eq!(doc.export_to_text(), "flat");
        assert!(doc.element_counts().is_empty());
        assert_eq!(doc.total_elements(), 0);
    }

    #[test]
    fn partial_document_keeps_gathered_text() {
        let walk = Err(ConvertError::Xml("unexpected end".into()));
        let doc = ConvertedDocument::from_walk(
            InputFormat::Docx,
            DocumentProperties::default(),
            vec![DocElement::new(ElementLabel::Paragraph, "kept")],
            walk,
        );
        assert!(matches!(doc.texts(), Err(ConvertError::Xml(_))));
        assert_eq!(doc.export_to_text(), "kept");
    }

    #[test]
    fn detect_prefers_extension() {
        let converter = DocumentConverter { _loaded: () };
        let input = FileInput::buffer(Some("a.md".into()), b"%PDF".to_vec());
        assert_eq!(
            converter.detect(&input, b"%PDF").unwrap(),
            InputFormat::Markdown
        );
        let unknown = FileInput::buffer(Some("a.rtf".into()), vec![]);
        assert!(matches!(
            converter.detect(&unknown, b""),
            Err(ConvertError::UnsupportedFormat(ext)) if ext == ".rtf"
        ));
        let nameless = FileInput::buffer(None, b"%PDF-1.4".to_vec());
        assert_eq!(
            converter.detect(&nameless, b"%PDF-1.4").unwrap(),
            InputFormat::Pdf
        );
    }

    #[cfg(feature = "convert")]
    #[test]
    fn converts_plain_and_markdown() {
        let converter = DocumentConverter::load().unwrap();
        let txt = FileInput::buffer(Some("notes.txt".into()), b"\xEF\xBB\xBF  plain body \n".to_vec());
        let doc = converter.convert(&txt).unwrap();
        assert_eq!(doc.format, InputFormat::Text);
        assert_eq!(doc.export_to_text(), "plain body");
        assert!(!doc.has_structure());

        let md = FileInput::buffer(Some("r.md".into()), b"# Heading\n\nSome text here.".to_vec());
        let doc = converter.convert(&md).unwrap();
        assert_eq!(doc.texts().unwrap().len(), 2);
        assert_eq!(doc.properties.title.as_deref(), Some("Heading"));
    }

    #[cfg(not(feature = "convert"))]
    #[test]
    fn unavailable_without_feature() {
        assert!(matches!(
            DocumentConverter::load(),
            Err(ConvertError::Unavailable)
        ));
    }
}
