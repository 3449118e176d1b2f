use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::handler::DocumentHandler;
use crate::handlers::{ConverterHandler, TextHandler};
use crate::source::FileInput;

/// Ordered handler list plus the format-name table.
///
/// Specific handlers always precede generic ones; among equals the
/// registration order is kept. The same order decides which handler owns a
/// format name declared by more than one handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn DocumentHandler>>,
    formats: BTreeMap<&'static str, Arc<dyn DocumentHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handler_names())
            .field("formats", &self.formats.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// PDF (when compiled in), text, then the converter when it loaded.
    #[must_use]
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "pdf")]
        registry.register(Arc::new(crate::handlers::PdfHandler::new()));
        #[cfg(not(feature = "pdf"))]
        tracing::debug!("skipping pdf handler: built without the pdf feature");

        registry.register(Arc::new(TextHandler::new()));

        let converter = ConverterHandler::new();
        if converter.is_available() {
            registry.register(Arc::new(converter));
        } else {
            tracing::debug!("skipping converter handler: document converter unavailable");
        }

        tracing::info!(
            "handler registry ready: {}",
            registry.handler_names().join(", ")
        );
        registry
    }

    /// Insert `handler` after every handler of equal or higher priority.
    /// Registering the same instance twice is a no-op.
    pub fn register(&mut self, handler: Arc<dyn DocumentHandler>) {
        if self.handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            tracing::debug!("handler {} already registered", handler.name());
            return;
        }

        for &format in handler.supported_formats() {
            match self.formats.get(format) {
                Some(owner) if owner.priority() >= handler.priority() => {
                    tracing::debug!(
                        "format {format} stays with {}, not {}",
                        owner.name(),
                        handler.name()
                    );
                }
                Some(owner) => {
                    tracing::debug!(
                        "format {format} moves from {} to {}",
                        owner.name(),
                        handler.name()
                    );
                    self.formats.insert(format, Arc::clone(&handler));
                }
                None => {
                    self.formats.insert(format, Arc::clone(&handler));
                }
            }
        }

        let pos = self
            .handlers
            .iter()
            .position(|h| h.priority() < handler.priority())
            .unwrap_or(self.handlers.len());
        tracing::debug!("registered handler {} at position {pos}", handler.name());
        self.handlers.insert(pos, handler);
    }

    /// First handler, in dispatch order, that accepts `input`.
    #[must_use]
    pub fn get_handler(
        &self,
        input: &FileInput,
        mimetype: Option<&str>,
    ) -> Option<Arc<dyn DocumentHandler>> {
        let found = self
            .handlers
            .iter()
            .find(|h| h.can_handle(input, mimetype))
            .cloned();
        if found.is_none() {
            tracing::warn!("no handler found for {}", input.display_name());
        }
        found
    }

    #[must_use]
    pub fn handler_for_format(&self, format: &str) -> Option<Arc<dyn DocumentHandler>> {
        self.formats
            .get(format.to_ascii_lowercase().as_str())
            .cloned()
    }

    /// Primary format of the handler that would process `input`.
    #[must_use]
    pub fn detect_format(&self, input: &FileInput, mimetype: Option<&str>) -> Option<&'static str> {
        self.get_handler(input, mimetype)
            .and_then(|h| h.supported_formats().first().copied())
    }

    #[must_use]
    pub fn supported_extensions(&self) -> BTreeSet<&'static str> {
        self.handlers
            .iter()
            .flat_map(|h| h.supported_extensions().iter().copied())
            .collect()
    }

    #[must_use]
    pub fn supported_mimetypes(&self) -> BTreeSet<&'static str> {
        self.handlers
            .iter()
            .flat_map(|h| h.supported_mimetypes().iter().copied())
            .collect()
    }

    /// Each format name mapped to the extensions of the handler owning it.
    #[must_use]
    pub fn supported_formats(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        self.formats
            .iter()
            .map(|(format, owner)| (*format, owner.supported_extensions().to_vec()))
            .collect()
    }

    #[must_use]
    pub fn handlers(&self) -> &[Arc<dyn DocumentHandler>] {
        &self.handlers
    }

    #[must_use]
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::DocumentChunk;
    use crate::error::IngestError;
    use crate::handler::HandlerPriority;
    use crate::options::ExtractOptions;

    struct Fake {
        name: &'static str,
        priority: HandlerPriority,
        formats: &'static [&'static str],
        extensions: &'static [&'static str],
    }

    impl DocumentHandler for Fake {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> HandlerPriority {
            self.priority
        }

        fn supported_formats(&self) -> &[&'static str] {
            self.formats
        }

        fn supported_extensions(&self) -> &[&'static str] {
            self.extensions
        }

        fn supported_mimetypes(&self) -> &[&'static str] {
            &[]
        }

        fn extract_text(&self, _: &FileInput, _: &ExtractOptions) -> Result<String, IngestError> {
            Ok(String::new())
        }

        fn extract_chunks(
            &self,
            _: &FileInput,
            _: &ExtractOptions,
        ) -> Result<Vec<DocumentChunk>, IngestError> {
            Ok(Vec::new())
        }
    }

    fn fake(
        name: &'static str,
        priority: HandlerPriority,
        formats: &'static [&'static str],
        extensions: &'static [&'static str],
    ) -> Arc<dyn DocumentHandler> {
        Arc::new(Fake {
            name,
            priority,
            formats,
            extensions,
        })
    }

    #[test]
    fn specific_handlers_precede_generic() {
        let mut registry = HandlerRegistry::new();
        registry.register(fake("catch-all", HandlerPriority::Generic, &["docx", "pdf"], &[".docx", ".pdf"]));
        registry.register(fake("pdf", HandlerPriority::Specific, &["pdf"], &[".pdf"]));
        registry.register(fake("csv", HandlerPriority::Specific, &["csv"], &[".csv"]));
        assert_eq!(registry.handler_names(), ["pdf", "csv", "catch-all"]);

        let pdf = FileInput::path("/docs/a.pdf");
        assert_eq!(registry.get_handler(&pdf, None).unwrap().name(), "pdf");
        let docx = FileInput::path("/docs/a.docx");
        assert_eq!(registry.get_handler(&docx, None).unwrap().name(), "catch-all");
    }

    #[test]
    fn format_table_follows_priority() {
        let mut registry = HandlerRegistry::new();
        registry.register(fake("catch-all", HandlerPriority::Generic, &["docx", "pdf"], &[".docx", ".pdf"]));
        registry.register(fake("pdf", HandlerPriority::Specific, &["pdf"], &[".pdf"]));
        registry.register(fake("pdf2", HandlerPriority::Specific, &["pdf"], &[".pdf"]));

        assert_eq!(registry.handler_for_format("PDF").unwrap().name(), "pdf");
        assert_eq!(registry.handler_for_format("docx").unwrap().name(), "catch-all");
        assert!(registry.handler_for_format("rtf").is_none());

        let formats = registry.supported_formats();
        assert_eq!(formats["pdf"], [".pdf"]);
        assert_eq!(formats["docx"], [".docx", ".pdf"]);
    }

    #[test]
    fn same_instance_registers_once() {
        let mut registry = HandlerRegistry::new();
        let handler = fake("csv", HandlerPriority::Specific, &["csv"], &[".csv"]);
        registry.register(Arc::clone(&handler));
        registry.register(handler);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unsupported_input_is_none() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        registry.register(fake("csv", HandlerPriority::Specific, &["csv"], &[".csv"]));
        assert!(registry.get_handler(&FileInput::path("/x/a.xyz"), None).is_none());
        assert!(registry.detect_format(&FileInput::path("/x/a.xyz"), None).is_none());
        assert_eq!(registry.detect_format(&FileInput::path("/x/a.csv"), None), Some("csv"));
    }

    #[test]
    fn capability_sets_are_sorted_unions() {
        let mut registry = HandlerRegistry::new();
        registry.register(fake("b", HandlerPriority::Specific, &["b"], &[".zz", ".bb"]));
        registry.register(fake("a", HandlerPriority::Specific, &["a"], &[".aa", ".bb"]));
        let exts: Vec<_> = registry.supported_extensions().into_iter().collect();
        assert_eq!(exts, [".aa", ".bb", ".zz"]);
    }

    #[test]
    fn default_handlers() {
        let registry = HandlerRegistry::with_default_handlers();
        let names = registry.handler_names();
        assert_eq!(names.first(), Some(&if cfg!(feature = "pdf") { "pdf" } else { "text" }));
        if cfg!(feature = "convert") {
            assert_eq!(names.last(), Some(&"converter"));
        }

        let text = FileInput::path("/notes/todo.txt");
        assert_eq!(registry.get_handler(&text, None).unwrap().name(), "text");
        assert_eq!(registry.detect_format(&text, None), Some("text"));
        assert_eq!(registry.handler_for_format("txt").unwrap().name(), "text");
        assert!(registry.supported_mimetypes().contains("text/plain"));
        assert!(format!("{registry:?}").contains("text"));
    }

    #[cfg(feature = "convert")]
    #[test]
    fn default_handlers_route_office_formats_to_converter() {
        let registry = HandlerRegistry::with_default_handlers();
        for name in ["a.docx", "b.xlsx", "c.pptx", "d.html", "e.md", "f.epub", "g.odt"] {
            let input = FileInput::path(format!("/docs/{name}"));
            assert_eq!(registry.get_handler(&input, None).unwrap().name(), "converter", "{name}");
        }
        assert_eq!(registry.handler_for_format("pdf").unwrap().name(), "pdf");
        assert_eq!(registry.handler_for_format("docx").unwrap().name(), "converter");
        assert!(registry.supported_formats()["docx"].contains(&".epub"));
        let buffer = FileInput::buffer(None, b"%PDF-1.4".to_vec());
        assert_eq!(
            registry.get_handler(&buffer, Some("application/pdf")).unwrap().name(),
            "pdf"
        );
    }
}
