use serde::{Deserialize, Serialize};

/// Open key/value mapping attached to every chunk.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Shape of the content carried by a [`DocumentChunk`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    #[default]
    Text,
    StructuredText,
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

impl ChunkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::StructuredText => "structured_text",
            Self::Title => "title",
            Self::SectionHeader => "section_header",
            Self::Paragraph => "paragraph",
            Self::ListItem => "list_item",
            Self::Table => "table",
            Self::Figure => "figure",
            Self::Image => "image",
            Self::Caption => "caption",
            Self::Code => "code",
            Self::Formula => "formula",
            Self::Footnote => "footnote",
            Self::PageHeader => "page_header",
            Self::PageFooter => "page_footer",
        }
    }

    /// Tables, figures and images are emitted whole, never split.
    #[must_use]
    pub fn is_atomic(self) -> bool {
        matches!(self, Self::Table | Self::Figure | Self::Image)
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded span of extracted text plus provenance, ready for embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub metadata: Metadata,
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(default)]
    pub chunk_type: ChunkType,
}

impl DocumentChunk {
    #[must_use]
    pub fn new(content: impl Into<String>, chunk_id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
            chunk_id: chunk_id.into(),
            page_number: None,
            section_title: None,
            chunk_type: ChunkType::Text,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page_number = Some(page);
        self
    }

    #[must_use]
    pub fn with_section_title(mut self, title: Option<String>) -> Self {
        self.section_title = title;
        self
    }

    #[must_use]
    pub fn with_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = chunk_type;
        self
    }

    /// Name of the originating file, if the handler recorded one.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Drop chunks whose content is blank once trimmed.
pub(crate) fn retain_non_empty(chunks: &mut Vec<DocumentChunk>) {
    let before = chunks.len();
    chunks.retain(|c| !c.content.trim().is_empty());
    let dropped = before - chunks.len();
    if dropped > 0 {
        tracing::debug!(dropped, "discarded blank chunks");
    }
}
