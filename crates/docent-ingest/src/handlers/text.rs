use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use serde_json::Value;

use crate::chunk::{ChunkType, DocumentChunk, Metadata, retain_non_empty};
use crate::error::IngestError;
use crate::handler::DocumentHandler;
use crate::metadata::{base_metadata, merged};
use crate::options::ExtractOptions;
use crate::source::FileInput;
use crate::splitter::{SplitterConfig, TextSplitter, tail_chars};

/// Bytes inspected when guessing an encoding.
const DETECTION_SAMPLE: usize = 10_000;
/// Characters inspected when sniffing the text sub-type.
const SNIFF_CHARS: usize = 1000;

/// Sub-type of a plain-text document, used to pick a chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextType {
    Json,
    Xml,
    Csv,
    Yaml,
    Log,
    Structured,
    Plain,
}

impl TextType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Csv => "csv",
            Self::Yaml => "yaml",
            Self::Log => "log",
            Self::Structured => "structured",
            Self::Plain => "plain",
        }
    }

    /// Extension first, then content sniffing over the first characters.
    #[must_use]
    pub fn detect(extension: Option<&str>, text: &str) -> Self {
        match extension {
            Some(".json") => return Self::Json,
            Some(".xml") => return Self::Xml,
            Some(".csv") => return Self::Csv,
            Some(".yaml" | ".yml") => return Self::Yaml,
            Some(".log") => return Self::Log,
            _ => {}
        }

        let head: String = text.chars().take(SNIFF_CHARS).collect();
        let sample = head.trim();

        if sample.starts_with('{') || sample.starts_with('[') {
            return Self::Json;
        }
        if sample.starts_with('<') {
            return Self::Xml;
        }
        if sample.contains(',') && sample.contains('\n') {
            // a failed CSV check skips the YAML and log checks
            let csv_like = sample
                .split('\n')
                .take(5)
                .filter(|line| !line.trim().is_empty())
                .all(|line| line.contains(','));
            if csv_like {
                return Self::Csv;
            }
        } else if ["---\n", "- ", "  - "].iter().any(|p| sample.starts_with(p)) {
            return Self::Yaml;
        } else {
            let lower = sample.to_lowercase();
            if ["error:", "warning:", "info:", "debug:"]
                .iter()
                .any(|k| lower.contains(k))
            {
                return Self::Log;
            }
        }

        if looks_structured(sample) {
            Self::Structured
        } else {
            Self::Plain
        }
    }
}

/// Bullet or numbered lines in a sample of more than five lines.
fn looks_structured(sample: &str) -> bool {
    let lines: Vec<&str> = sample.split('\n').collect();
    if lines.len() <= 5 {
        return false;
    }
    let non_empty: Vec<&str> = lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect();
    if non_empty.len() <= 3 {
        return false;
    }
    let bulleted = non_empty.iter().any(|line| {
        let t = line.trim();
        t.starts_with("- ") || t.starts_with("* ") || t.starts_with("+ ")
    });
    bulleted
        || non_empty.iter().any(|line| {
            line.trim().starts_with(|c: char| c.is_ascii_digit())
                && line.chars().take(10).any(|c| c == '.')
        })
}

/// Decode raw bytes, honoring an explicit label when given.
///
/// Without a label: BOM, then strict UTF-8, then a statistical guess over the
/// first bytes. A guess that cannot decode cleanly falls back to lossy UTF-8.
///
/// # Errors
///
/// Returns [`IngestError::UnknownEncoding`] for an unrecognized label.
pub fn decode_text(bytes: &[u8], label: Option<&str>) -> Result<(String, &'static str), IngestError> {
    if let Some(label) = label {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| IngestError::UnknownEncoding(label.to_owned()))?;
        let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
        if had_errors {
            tracing::debug!("replaced undecodable bytes while decoding as {}", encoding.name());
        }
        return Ok((text.into_owned(), encoding.name()));
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return Ok((text.into_owned(), encoding.name()));
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_owned(), UTF_8.name()));
    }

    let sample = &bytes[..bytes.len().min(DETECTION_SAMPLE)];
    let mut detector = EncodingDetector::new();
    detector.feed(sample, sample.len() == bytes.len());
    let guessed = detector.guess(None, true);
    let (text, had_errors) = guessed.decode_without_bom_handling(bytes);
    if had_errors {
        tracing::debug!(
            "low-confidence encoding guess {}, falling back to UTF-8",
            guessed.name()
        );
        return Ok((String::from_utf8_lossy(bytes).into_owned(), UTF_8.name()));
    }
    tracing::debug!("detected encoding: {}", guessed.name());
    Ok((text.into_owned(), guessed.name()))
}

/// Plain and lightly structured text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextHandler;

impl TextHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn read(input: &FileInput, options: &ExtractOptions) -> Result<(String, &'static str), IngestError> {
        let bytes = input.read_bytes()?;
        let (text, encoding) = decode_text(&bytes, options.encoding.as_deref())?;
        Ok((text.trim().to_owned(), encoding))
    }
}

impl DocumentHandler for TextHandler {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supported_formats(&self) -> &[&'static str] {
        &["text", "txt"]
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &[
            ".txt", ".text", ".log", ".csv", ".tsv", ".json", ".xml", ".yaml", ".yml",
        ]
    }

    fn supported_mimetypes(&self) -> &[&'static str] {
        &[
            "text/plain",
            "text/csv",
            "text/tab-separated-values",
            "application/json",
            "application/xml",
            "text/xml",
            "application/x-yaml",
            "text/yaml",
        ]
    }

    fn extract_metadata(&self, input: &FileInput) -> Metadata {
        merged(&base_metadata(input), [("document_type", Value::from("text"))])
    }

    fn extract_text(&self, input: &FileInput, options: &ExtractOptions) -> Result<String, IngestError> {
        Self::read(input, options).map(|(text, _)| text)
    }

    fn extract_chunks(
        &self,
        input: &FileInput,
        options: &ExtractOptions,
    ) -> Result<Vec<DocumentChunk>, IngestError> {
        options.validate()?;
        let (text, encoding) = Self::read(input, options)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let text_type = TextType::detect(input.extension().as_deref(), &text);
        let base = merged(
            &self.extract_metadata(input),
            [
                ("total_characters", Value::from(text.chars().count())),
                ("text_type", Value::from(text_type.as_str())),
                ("encoding", Value::from(encoding)),
            ],
        );

        let mut chunks = if text_type == TextType::Structured && options.preserve_structure {
            structured_chunks(&text, &base, options.chunk_size, options.chunk_overlap)
        } else {
            TextSplitter::new(options.splitter())
                .split(&text)
                .into_iter()
                .enumerate()
                .map(|(idx, content)| {
                    let meta = merged(&base, [("chunk_index", Value::from(idx))]);
                    DocumentChunk::new(content, format!("text_chunk_{idx}"), meta)
                })
                .collect()
        };

        retain_non_empty(&mut chunks);
        tracing::info!(
            "extracted {} chunks from text file {}",
            chunks.len(),
            input.display_name()
        );
        Ok(chunks)
    }
}

/// Accumulate blank-line separated sections, recording which sections each
/// chunk spans. Sections longer than `chunk_size` are window-split first.
fn structured_chunks(
    text: &str,
    base: &Metadata,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<DocumentChunk> {
    let mut builder = SectionChunks {
        base,
        chunks: Vec::new(),
    };
    let mut current = String::new();
    let mut current_len = 0usize;
    let mut start = 0usize;
    let mut end = 0usize;

    for (idx, section) in text.split("\n\n").enumerate() {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }
        let section_len = section.chars().count();

        if !current.is_empty() && current_len + section_len + 2 > chunk_size {
            let tail = if chunk_overlap > 0 {
                tail_chars(&current, chunk_overlap).to_owned()
            } else {
                String::new()
            };
            builder.push(std::mem::take(&mut current), start, end);
            if !tail.is_empty() && section_len <= chunk_size {
                current = format!("{tail}\n\n{section}");
                current_len = current.chars().count();
                start = idx;
                end = idx;
                continue;
            }
        }

        if current.is_empty() {
            start = idx;
            if section_len > chunk_size {
                let mut pieces = TextSplitter::new(SplitterConfig {
                    chunk_size,
                    chunk_overlap,
                    preserve_paragraphs: false,
                })
                .split(section);
                current = pieces.pop().unwrap_or_default();
                for piece in pieces {
                    builder.push(piece, idx, idx);
                }
            } else {
                current = section.to_owned();
            }
            current_len = current.chars().count();
        } else {
            current.push_str("\n\n");
            current.push_str(section);
            current_len += section_len + 2;
        }
        end = idx;
    }

    if !current.is_empty() {
        builder.push(current, start, end);
    }
    builder.chunks
}

struct SectionChunks<'a> {
    base: &'a Metadata,
    chunks: Vec<DocumentChunk>,
}

impl SectionChunks<'_> {
    fn push(&mut self, content: String, start: usize, end: usize) {
        let idx = self.chunks.len();
        let meta = merged(
            self.base,
            [
                ("chunk_index", Value::from(idx)),
                ("section_start", Value::from(start)),
                ("section_end", Value::from(end)),
            ],
        );
        let content = content.trim().to_owned();
        self.chunks.push(
            DocumentChunk::new(content, format!("structured_chunk_{idx}"), meta)
                .with_type(ChunkType::StructuredText),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(name: &str, text: &str) -> FileInput {
        FileInput::buffer(Some(name.into()), text.as_bytes().to_vec())
    }

    const LIST_DOC: &str = "Shopping\n\n- apples\n- pears\n- plums\n\n1. first\n2. second\n\nnotes follow here";

    #[test]
    fn detect_by_extension() {
        assert_eq!(TextType::detect(Some(".json"), "plain"), TextType::Json);
        assert_eq!(TextType::detect(Some(".yml"), "x"), TextType::Yaml);
        assert_eq!(TextType::detect(Some(".log"), "x"), TextType::Log);
        assert_eq!(TextType::detect(Some(".csv"), "x"), TextType::Csv);
        assert_eq!(TextType::detect(Some(".xml"), "x"), TextType::Xml);
    }

    #[test]
    fn detect_by_content() {
        assert_eq!(TextType::detect(None, "  {\"a\": 1}"), TextType::Json);
        assert_eq!(TextType::detect(None, "[1, 2]"), TextType::Json);
        assert_eq!(TextType::detect(None, "<?xml version=\"1.0\"?><a/>"), TextType::Xml);
        assert_eq!(TextType::detect(None, "a,b,c\n1,2,3\n4,5,6"), TextType::Csv);
        assert_eq!(TextType::detect(None, "---\nkey: value"), TextType::Yaml);
        assert_eq!(TextType::detect(None, "2024 ERROR: disk full"), TextType::Log);
        assert_eq!(TextType::detect(None, "just some words"), TextType::Plain);
    }

    #[test]
    fn failed_csv_check_skips_log_keywords() {
        let text = "hello, world\nerror: nothing here";
        assert_eq!(TextType::detect(None, text), TextType::Plain);
    }

    #[test]
    fn detect_structured_lists() {
        assert_eq!(TextType::detect(None, LIST_DOC), TextType::Structured);
        let numbered = "Intro\n1. one\n2. two\n3. three\n4. four\n5. five";
        assert_eq!(TextType::detect(None, numbered), TextType::Structured);
        let short = "- a\n- b";
        assert_eq!(TextType::detect(None, short), TextType::Yaml);
    }

    #[test]
    fn decode_utf8_and_bom() {
        let (text, enc) = decode_text("héllo".as_bytes(), None).unwrap();
        assert_eq!(text, "héllo");
        assert_eq!(enc, "UTF-8");

        let mut bom = vec![0xEF, 0xBB, 0xBF];
        bom.extend_from_slice(b"hi");
        let (text, enc) = decode_text(&bom, None).unwrap();
        assert_eq!(text, "hi");
        assert_eq!(enc, "UTF-8");

        let utf16 = [0xFF, 0xFE, b'o', 0, b'k', 0];
        let (text, enc) = decode_text(&utf16, None).unwrap();
        assert_eq!(text, "ok");
        assert_eq!(enc, "UTF-16LE");
    }

    #[test]
    fn decode_guesses_legacy_encoding() {
        let bytes = b"caf\xe9 cr\xe8me br\xfbl\xe9e, d\xe9j\xe0 vu";
        let (text, enc) = decode_text(bytes, None).unwrap();
        assert!(text.contains("café"));
        assert_ne!(enc, "UTF-8");
    }

    #[test]
    fn decode_with_explicit_label() {
        let (text, enc) = decode_text(b"caf\xe9", Some("latin1")).unwrap();
        assert_eq!(text, "café");
        assert_eq!(enc, "windows-1252");
    }

    #[test]
    fn unknown_label_is_an_error() {
        let err = decode_text(b"x", Some("klingon-8")).unwrap_err();
        assert!(matches!(err, IngestError::UnknownEncoding(_)));
    }

    #[test]
    fn capability_sets() {
        let h = TextHandler::new();
        assert_eq!(h.supported_formats()[0], "text");
        assert!(h.supported_extensions().contains(&".yml"));
        assert!(h.supported_mimetypes().contains(&"text/csv"));
        assert!(h.can_handle(&FileInput::path("/a/b.log"), None));
        assert!(!h.can_handle(&FileInput::path("/a/b.pdf"), None));
    }

    #[test]
    fn small_file_single_chunk() {
        let chunks = TextHandler
            .extract_chunks(&buffer("a.txt", "  Hello world  \n"), &ExtractOptions::default())
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello world");
        assert_eq!(chunks[0].chunk_id, "text_chunk_0");
        assert_eq!(chunks[0].chunk_type, ChunkType::Text);
        let meta = &chunks[0].metadata;
        assert_eq!(meta["document_type"], "text");
        assert_eq!(meta["text_type"], "plain");
        assert_eq!(meta["total_characters"], 11);
        assert_eq!(meta["encoding"], "UTF-8");
        assert_eq!(meta["chunk_index"], 0);
        assert_eq!(meta["filename"], "a.txt");
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let chunks = TextHandler
            .extract_chunks(&buffer("a.txt", " \n\n "), &ExtractOptions::default())
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn long_plain_text_is_split() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {i} has a few words in it."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let opts = ExtractOptions::default().with_chunking(200, 20);
        let chunks = TextHandler.extract_chunks(&buffer("a.txt", &text), &opts).unwrap();
        assert!(chunks.len() > 5);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_id, format!("text_chunk_{i}"));
            assert_eq!(c.metadata["chunk_index"], i);
        }
    }

    #[test]
    fn structured_text_keeps_sections() {
        let opts = ExtractOptions::default().with_chunking(40, 0);
        let chunks = TextHandler
            .extract_chunks(&buffer("list.txt", LIST_DOC), &opts)
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::StructuredText));
        assert_eq!(chunks[0].chunk_id, "structured_chunk_0");
        assert_eq!(chunks[0].content, "Shopping\n\n- apples\n- pears\n- plums");
        assert_eq!(chunks[0].metadata["section_start"], 0);
        assert_eq!(chunks[0].metadata["section_end"], 1);
        assert_eq!(chunks[1].metadata["section_start"], 2);
        assert_eq!(chunks[0].metadata["text_type"], "structured");
    }

    #[test]
    fn structured_overlap_carries_tail() {
        let opts = ExtractOptions::default().with_chunking(40, 5);
        let chunks = TextHandler
            .extract_chunks(&buffer("list.txt", LIST_DOC), &opts)
            .unwrap();
        assert!(chunks[1].content.starts_with("plums"));
    }

    #[test]
    fn structured_disabled_falls_back_to_splitter() {
        let mut opts = ExtractOptions::default().with_chunking(30, 0);
        opts.preserve_structure = false;
        let chunks = TextHandler
            .extract_chunks(&buffer("list.txt", LIST_DOC), &opts)
            .unwrap();
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::Text));
        assert!(chunks[0].chunk_id.starts_with("text_chunk_"));
    }

    #[test]
    fn oversized_section_is_split() {
        let long = "word ".repeat(40);
        let text = format!("Checklist\n- a\n- b\n- c\n- d\n- e\n- f\n\n{long}");
        let opts = ExtractOptions::default().with_chunking(50, 0);
        let chunks = TextHandler.extract_chunks(&buffer("s.txt", &text), &opts).unwrap();
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::StructuredText));
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 51));
        assert!(chunks.len() >= 4);
        assert_eq!(chunks[1].metadata["section_start"], 1);
    }

    #[test]
    fn invalid_options_rejected() {
        let opts = ExtractOptions::default().with_chunking(10, 10);
        let err = TextHandler.extract_chunks(&buffer("a.txt", "x"), &opts).unwrap_err();
        assert!(matches!(err, IngestError::InvalidOptions(_)));
    }

    #[test]
    fn extract_text_trims() {
        let text = TextHandler
            .extract_text(&buffer("a.txt", "\n\n body \n"), &ExtractOptions::default())
            .unwrap();
        assert_eq!(text, "body");
    }

    #[test]
    fn missing_path_is_io_error() {
        let err = TextHandler
            .extract_chunks(&FileInput::path("/nonexistent/a.txt"), &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
