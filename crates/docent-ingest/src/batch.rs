//! Sequential multi-file extraction that never aborts on a single file.

use crate::chunk::DocumentChunk;
use crate::error::IngestError;
use crate::options::ExtractOptions;
use crate::registry::HandlerRegistry;
use crate::source::FileInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No registered handler accepts the input.
    Unsupported,
    /// The selected handler rejected the input (missing or empty file).
    Invalid,
}

#[derive(Debug)]
pub enum FileOutcome {
    Processed {
        handler: &'static str,
        chunks: Vec<DocumentChunk>,
    },
    Skipped(SkipReason),
    Failed(IngestError),
}

#[derive(Debug)]
pub struct FileReport {
    pub source: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    #[must_use]
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Processed { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped(_)))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    /// Chunks of every processed file, in input order.
    pub fn chunks(&self) -> impl Iterator<Item = &DocumentChunk> {
        self.files.iter().flat_map(|f| match &f.outcome {
            FileOutcome::Processed { chunks, .. } => chunks.as_slice(),
            _ => &[],
        })
    }

    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.chunks().count()
    }

    #[must_use]
    pub fn into_chunks(self) -> Vec<DocumentChunk> {
        self.files
            .into_iter()
            .flat_map(|f| match f.outcome {
                FileOutcome::Processed { chunks, .. } => chunks,
                _ => Vec::new(),
            })
            .collect()
    }
}

/// Dispatch, validate and extract a single input.
#[must_use]
pub fn extract_one(
    registry: &HandlerRegistry,
    input: &FileInput,
    mimetype: Option<&str>,
    options: &ExtractOptions,
) -> FileOutcome {
    let Some(handler) = registry.get_handler(input, mimetype) else {
        return FileOutcome::Skipped(SkipReason::Unsupported);
    };
    if !handler.validate(input) {
        tracing::warn!("skipping invalid file {}", input.display_name());
        return FileOutcome::Skipped(SkipReason::Invalid);
    }
    match handler.extract_chunks(input, options) {
        Ok(chunks) => FileOutcome::Processed {
            handler: handler.name(),
            chunks,
        },
        Err(e) => {
            tracing::error!("failed to process {}: {e}", input.display_name());
            FileOutcome::Failed(e)
        }
    }
}

/// Process `inputs` one after another with the same options.
pub fn extract_batch(
    registry: &HandlerRegistry,
    inputs: impl IntoIterator<Item = FileInput>,
    options: &ExtractOptions,
) -> BatchReport {
    let files: Vec<FileReport> = inputs
        .into_iter()
        .map(|input| FileReport {
            source: input.display_name(),
            outcome: extract_one(registry, &input, None, options),
        })
        .collect();
    let report = BatchReport { files };
    tracing::info!(
        "batch finished: {} processed, {} skipped, {} failed, {} chunks",
        report.processed(),
        report.skipped(),
        report.failed(),
        report.total_chunks()
    );
    report
}
