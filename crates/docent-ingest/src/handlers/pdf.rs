use lopdf::{Dictionary, Document, Object};
use serde_json::Value;

use crate::chunk::{DocumentChunk, Metadata, retain_non_empty};
use crate::error::IngestError;
use crate::handler::DocumentHandler;
use crate::metadata::{base_metadata, merged};
use crate::options::ExtractOptions;
use crate::source::FileInput;
use crate::splitter::TextSplitter;

/// Fields of a PDF `Info` dictionary, kept as the raw PDF strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
}

impl PdfInfo {
    fn fields(&self) -> impl Iterator<Item = (&'static str, Value)> + '_ {
        [
            ("title", &self.title),
            ("author", &self.author),
            ("subject", &self.subject),
            ("creator", &self.creator),
            ("producer", &self.producer),
            ("creation_date", &self.creation_date),
            ("modification_date", &self.modification_date),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key, Value::from(v.as_str()))))
    }
}

/// Page-addressable text source. Pages are numbered from 1.
pub trait PageSource {
    fn page_count(&self) -> u32;

    /// # Errors
    ///
    /// Returns an error if the page content cannot be decoded.
    fn page_text(&self, page: u32) -> Result<String, IngestError>;

    fn info(&self) -> PdfInfo;

    fn is_encrypted(&self) -> bool;
}

/// [`PageSource`] backed by a parsed `lopdf` document.
pub struct LopdfSource {
    doc: Document,
    pages: Vec<u32>,
    name: String,
}

impl LopdfSource {
    /// # Errors
    ///
    /// Returns [`IngestError::Extraction`] if the bytes are not a readable PDF.
    pub fn load(bytes: &[u8], name: impl Into<String>) -> Result<Self, IngestError> {
        let name = name.into();
        let doc = Document::load_mem(bytes).map_err(|e| IngestError::extraction(&name, e))?;
        let pages = doc.get_pages().into_keys().collect();
        Ok(Self { doc, pages, name })
    }

    /// # Errors
    ///
    /// Returns an error if the input cannot be read or parsed.
    pub fn open(input: &FileInput) -> Result<Self, IngestError> {
        let bytes = input.read_bytes()?;
        Self::load(&bytes, input.display_name())
    }

    fn info_dict(&self) -> Option<&Dictionary> {
        match self.doc.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.doc.get_object(*id).ok()?.as_dict().ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    fn info_string(&self, dict: &Dictionary, key: &[u8]) -> Option<String> {
        let object = match dict.get(key).ok()? {
            Object::Reference(id) => self.doc.get_object(*id).ok()?,
            other => other,
        };
        match object {
            Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }
}

impl PageSource for LopdfSource {
    fn page_count(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }

    fn page_text(&self, page: u32) -> Result<String, IngestError> {
        let index = usize::try_from(page.saturating_sub(1)).unwrap_or(usize::MAX);
        let number = self
            .pages
            .get(index)
            .copied()
            .ok_or_else(|| IngestError::extraction(&self.name, format!("no page {page}")))?;
        self.doc
            .extract_text(&[number])
            .map_err(|e| IngestError::extraction(&self.name, format!("page {page}: {e}")))
    }

    fn info(&self) -> PdfInfo {
        let Some(dict) = self.info_dict() else {
            return PdfInfo::default();
        };
        PdfInfo {
            title: self.info_string(dict, b"Title"),
            author: self.info_string(dict, b"Author"),
            subject: self.info_string(dict, b"Subject"),
            creator: self.info_string(dict, b"Creator"),
            producer: self.info_string(dict, b"Producer"),
            creation_date: self.info_string(dict, b"CreationDate"),
            modification_date: self.info_string(dict, b"ModDate"),
        }
    }

    fn is_encrypted(&self) -> bool {
        self.doc.is_encrypted()
    }
}

/// UTF-16BE when prefixed with a byte-order mark, PDFDocEncoding (read as
/// Latin-1) otherwise.
#[must_use]
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Page text joined with `--- Page N ---` separators. Failing pages are
/// logged and left out.
#[must_use]
pub fn source_text(source: &dyn PageSource) -> String {
    let mut out = String::new();
    for page in 1..=source.page_count() {
        match source.page_text(page) {
            Ok(text) if !text.trim().is_empty() => {
                out.push_str(&format!("\n\n--- Page {page} ---\n\n{text}"));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("error processing page {page}: {e}"),
        }
    }
    out.trim().to_owned()
}

/// One chunk per page, or several when the page text exceeds `chunk_size`.
#[must_use]
pub fn source_chunks(
    source: &dyn PageSource,
    base: &Metadata,
    options: &ExtractOptions,
) -> Vec<DocumentChunk> {
    let splitter = TextSplitter::new(options.splitter());
    let mut chunks = Vec::new();

    for page in 1..=source.page_count() {
        let text = match source.page_text(page) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("error processing page {page}: {e}");
                continue;
            }
        };
        if text.trim().is_empty() {
            continue;
        }

        let page_meta = merged(
            base,
            [
                ("page_number", Value::from(page)),
                ("source_page", Value::from(page)),
            ],
        );

        if text.chars().count() <= options.chunk_size {
            chunks.push(
                DocumentChunk::new(text.trim(), format!("page_{page}"), page_meta).with_page(page),
            );
            continue;
        }

        for (idx, piece) in splitter.split(&text).into_iter().enumerate() {
            let meta = merged(&page_meta, [("chunk_index", Value::from(idx))]);
            chunks.push(
                DocumentChunk::new(piece, format!("page_{page}_chunk_{idx}"), meta).with_page(page),
            );
        }
    }
    chunks
}

fn document_fields(source: &dyn PageSource) -> Vec<(&'static str, Value)> {
    let mut fields = vec![
        ("document_type", Value::from("pdf")),
        ("total_pages", Value::from(source.page_count())),
        ("is_encrypted", Value::from(source.is_encrypted())),
    ];
    fields.extend(source.info().fields());
    fields
}

/// PDF documents, chunked page by page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfHandler;

impl PdfHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DocumentHandler for PdfHandler {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supported_formats(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &[".pdf"]
    }

    fn supported_mimetypes(&self) -> &[&'static str] {
        &["application/pdf"]
    }

    fn extract_metadata(&self, input: &FileInput) -> Metadata {
        let base = base_metadata(input);
        match LopdfSource::open(input) {
            Ok(source) => merged(&base, document_fields(&source)),
            Err(e) => {
                tracing::warn!("error extracting PDF metadata: {e}");
                merged(&base, [("document_type", Value::from("pdf"))])
            }
        }
    }

    fn extract_text(&self, input: &FileInput, _options: &ExtractOptions) -> Result<String, IngestError> {
        let source = LopdfSource::open(input)?;
        Ok(source_text(&source))
    }

    fn extract_chunks(
        &self,
        input: &FileInput,
        options: &ExtractOptions,
    ) -> Result<Vec<DocumentChunk>, IngestError> {
        options.validate()?;
        let source = LopdfSource::open(input)?;
        let base = merged(&base_metadata(input), document_fields(&source));

        let mut chunks = source_chunks(&source, &base, options);
        retain_non_empty(&mut chunks);
        tracing::info!(
            "extracted {} chunks from PDF with {} pages",
            chunks.len(),
            source.page_count()
        );
        Ok(chunks)
    }
}
