use crate::chunk::{DocumentChunk, Metadata};
use crate::error::IngestError;
use crate::metadata::base_metadata;
use crate::options::ExtractOptions;
use crate::source::FileInput;

/// Dispatch rank: specific handlers are always consulted before generic ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandlerPriority {
    Generic,
    Specific,
}

/// A format-specific extraction strategy.
pub trait DocumentHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> HandlerPriority {
        HandlerPriority::Specific
    }

    /// Format names; the first one is the primary format.
    fn supported_formats(&self) -> &[&'static str];

    /// Lowercase extensions with their leading dot.
    fn supported_extensions(&self) -> &[&'static str];

    fn supported_mimetypes(&self) -> &[&'static str];

    /// Match by extension, then the explicit MIME type, then a MIME type
    /// guessed from the name. Nameless buffers match on `mimetype` only.
    fn can_handle(&self, input: &FileInput, mimetype: Option<&str>) -> bool {
        if let Some(ext) = input.extension()
            && self.supported_extensions().iter().any(|e| *e == ext)
        {
            return true;
        }
        if let Some(mime) = mimetype
            && self.supported_mimetypes().iter().any(|m| *m == mime)
        {
            return true;
        }
        if let Some(guessed) = input.guess_mimetype() {
            return self.supported_mimetypes().iter().any(|m| *m == guessed);
        }
        false
    }

    /// Paths must exist and be non-empty; buffers are always accepted.
    fn validate(&self, input: &FileInput) -> bool {
        match input {
            FileInput::Path(path) => std::fs::metadata(path).is_ok_and(|m| m.len() > 0),
            FileInput::Buffer { .. } => true,
        }
    }

    /// Base provenance merged with format-specific fields.
    fn extract_metadata(&self, input: &FileInput) -> Metadata {
        base_metadata(input)
    }

    /// Best-effort plain text of the whole document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed at all.
    fn extract_text(&self, input: &FileInput, options: &ExtractOptions)
    -> Result<String, IngestError>;

    /// Structure-aware chunks; every returned chunk has non-blank content.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or the document cannot be
    /// parsed at all.
    fn extract_chunks(
        &self,
        input: &FileInput,
        options: &ExtractOptions,
    ) -> Result<Vec<DocumentChunk>, IngestError>;
}

impl std::fmt::Debug for dyn DocumentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandler")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .finish_non_exhaustive()
    }
}
