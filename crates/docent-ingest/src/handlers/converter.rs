use serde_json::Value;

use crate::chunk::{ChunkType, DocumentChunk, Metadata, retain_non_empty};
use crate::convert::{ConvertError, ConvertedDocument, DocElement, DocumentConverter};
use crate::error::IngestError;
use crate::handler::{DocumentHandler, HandlerPriority};
use crate::metadata::{base_metadata, merged};
use crate::options::ExtractOptions;
use crate::source::FileInput;
use crate::splitter::TextSplitter;

/// Elements shorter than this (trimmed, in characters) are noise.
const MIN_ELEMENT_CHARS: usize = 5;

const FORMATS: &[&str] = &[
    "docx", "xlsx", "xls", "xlsm", "pptx", "pdf", "html", "md", "txt", "odt", "ods", "odp",
    "epub", "latex", "tex",
];

const EXTENSIONS: &[&str] = &[
    ".docx", ".xlsx", ".xlsm", ".xls", ".pptx", ".pdf", ".html", ".htm", ".xhtml", ".md",
    ".markdown", ".txt", ".odt", ".ods", ".odp", ".epub", ".latex", ".tex",
];

const MIMETYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/vnd.ms-excel.sheet.macroenabled.12",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/pdf",
    "text/html",
    "application/xhtml+xml",
    "text/markdown",
    "text/plain",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.presentation",
    "application/epub+zip",
    "application/x-latex",
    "text/x-tex",
];

/// Catch-all handler over [`DocumentConverter`].
///
/// Without a converter every capability set is empty, so the registry
/// never selects it.
#[derive(Debug, Clone, Copy)]
pub struct ConverterHandler {
    converter: Option<DocumentConverter>,
}

impl Default for ConverterHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterHandler {
    #[must_use]
    pub fn new() -> Self {
        let converter = match DocumentConverter::load() {
            Ok(converter) => Some(converter),
            Err(e) => {
                tracing::warn!("document converter not available, advanced document processing disabled: {e}");
                None
            }
        };
        Self::with_converter(converter)
    }

    #[must_use]
    pub fn with_converter(converter: Option<DocumentConverter>) -> Self {
        Self { converter }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.converter.is_some()
    }

    fn converter(&self) -> Result<&DocumentConverter, IngestError> {
        self.converter.as_ref().ok_or(IngestError::ConverterUnavailable)
    }
}

/// Document-level fields reported by a conversion.
fn document_metadata(base: &Metadata, doc: &ConvertedDocument) -> Metadata {
    let mut meta = merged(
        base,
        [
            ("processor", Value::from("converter")),
            ("has_structured_content", Value::from(doc.has_structure())),
        ],
    );
    let props = &doc.properties;
    if let Some(title) = &props.title {
        meta.insert("document_title".into(), Value::from(title.as_str()));
    }
    if !props.authors.is_empty() {
        meta.insert("document_authors".into(), Value::from(props.authors.clone()));
    }
    if let Some(created) = &props.created {
        meta.insert("document_creation_date".into(), Value::from(created.as_str()));
    }
    if doc.has_structure() {
        let counts: serde_json::Map<String, Value> = doc
            .element_counts()
            .into_iter()
            .map(|(label, n)| (label.to_owned(), Value::from(n)))
            .collect();
        meta.insert("element_counts".into(), Value::Object(counts));
        meta.insert("total_elements".into(), Value::from(doc.total_elements()));
    }
    meta
}

/// Walk labeled elements: atomic labels become one chunk each, long text
/// elements are split.
fn element_chunks(elements: &[DocElement], base: &Metadata, options: &ExtractOptions) -> Vec<DocumentChunk> {
    let splitter = TextSplitter::new(options.splitter());
    let mut chunks = Vec::new();
    let mut section_title: Option<String> = None;

    for (idx, element) in elements.iter().enumerate() {
        let text = element.text.trim();
        if element.label.is_heading() && !text.is_empty() {
            section_title = Some(text.to_owned());
        }
        if text.chars().count() < MIN_ELEMENT_CHARS {
            continue;
        }

        let chunk_type = element.label.chunk_type();
        let mut meta = merged(
            base,
            [
                ("element_index", Value::from(idx)),
                ("element_type", Value::from(chunk_type.as_str())),
            ],
        );
        if let Some(page) = element.page {
            meta.insert("page_number".into(), Value::from(page));
        }
        let build = |content: String, id: String, meta: Metadata| {
            let chunk = DocumentChunk::new(content, id, meta)
                .with_type(chunk_type)
                .with_section_title(section_title.clone());
            match element.page {
                Some(page) => chunk.with_page(page),
                None => chunk,
            }
        };

        if chunk_type.is_atomic() {
            chunks.push(build(text.to_owned(), format!("text_{idx}_{chunk_type}"), meta));
        } else if text.chars().count() <= options.chunk_size {
            chunks.push(build(text.to_owned(), format!("text_{idx}"), meta));
        } else {
            for (i, piece) in splitter.split(text).into_iter().enumerate() {
                let piece_meta = merged(&meta, [("chunk_index", Value::from(i))]);
                chunks.push(build(piece, format!("text_{idx}_chunk_{i}"), piece_meta));
            }
        }
    }
    chunks
}

fn flat_chunks(text: &str, base: &Metadata, options: &ExtractOptions, prefix: &str) -> Vec<DocumentChunk> {
    TextSplitter::new(options.splitter())
        .split(text)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let meta = merged(base, [("chunk_index", Value::from(i))]);
            DocumentChunk::new(piece, format!("{prefix}_{i}"), meta).with_type(ChunkType::Text)
        })
        .collect()
}

impl DocumentHandler for ConverterHandler {
    fn name(&self) -> &'static str {
        "converter"
    }

    fn priority(&self) -> HandlerPriority {
        HandlerPriority::Generic
    }

    fn supported_formats(&self) -> &[&'static str] {
        if self.is_available() { FORMATS } else { &[] }
    }

    fn supported_extensions(&self) -> &[&'static str] {
        if self.is_available() { EXTENSIONS } else { &[] }
    }

    fn supported_mimetypes(&self) -> &[&'static str] {
        if self.is_available() { MIMETYPES } else { &[] }
    }

    fn extract_metadata(&self, input: &FileInput) -> Metadata {
        let base = base_metadata(input);
        let Ok(converter) = self.converter() else {
            return base;
        };
        match converter.convert(input) {
            Ok(doc) => document_metadata(&base, &doc),
            Err(e) => {
                tracing::warn!("error extracting converter metadata: {e}");
                base
            }
        }
    }

    fn extract_text(&self, input: &FileInput, _options: &ExtractOptions) -> Result<String, IngestError> {
        let doc = self.converter()?.convert(input)?;
        Ok(doc.export_to_text().to_owned())
    }

    fn extract_chunks(
        &self,
        input: &FileInput,
        options: &ExtractOptions,
    ) -> Result<Vec<DocumentChunk>, IngestError> {
        options.validate()?;
        let doc = self.converter()?.convert(input)?;
        let base = merged(
            &document_metadata(&base_metadata(input), &doc),
            [
                ("document_type", Value::from("converted")),
                ("source_format", Value::from(doc.format.as_str())),
            ],
        );

        let mut chunks = match doc.texts() {
            Ok(elements) if !elements.is_empty() => element_chunks(elements, &base, options),
            Ok(_) | Err(ConvertError::NoElementTree(_)) => {
                flat_chunks(doc.export_to_text(), &base, options, "chunk")
            }
            Err(e) => {
                tracing::warn!(
                    "error processing structured content, falling back to text extraction: {e}"
                );
                flat_chunks(doc.export_to_text(), &base, options, "fallback_chunk")
            }
        };

        retain_non_empty(&mut chunks);
        tracing::info!(
            "extracted {} chunks from {} using the document converter",
            chunks.len(),
            input.display_name()
        );
        Ok(chunks)
    }
}
