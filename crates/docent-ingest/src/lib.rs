//! Format-dispatching document-to-chunks pipeline.
//!
//! A [`HandlerRegistry`] picks a [`DocumentHandler`] for each input; the
//! handler turns the document into typed, metadata-annotated
//! [`DocumentChunk`]s using the shared [`TextSplitter`].

pub mod batch;
pub mod chunk;
pub mod convert;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod metadata;
pub mod options;
pub mod registry;
pub mod source;
pub mod splitter;

pub use batch::{BatchReport, FileOutcome, FileReport, SkipReason, extract_batch, extract_one};
pub use chunk::{ChunkType, DocumentChunk, Metadata};
pub use convert::{ConvertError, ConvertedDocument, DocumentConverter, InputFormat};
pub use error::IngestError;
pub use handler::{DocumentHandler, HandlerPriority};
pub use metadata::base_metadata;
pub use options::ExtractOptions;
pub use registry::HandlerRegistry;
pub use source::FileInput;
pub use splitter::{SplitterConfig, TextSplitter, split_text};
