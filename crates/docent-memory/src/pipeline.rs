use std::collections::BTreeSet;
use std::sync::Arc;

use docent_ingest::{ExtractOptions, FileInput, FileOutcome, HandlerRegistry, SkipReason, extract_one};

use crate::DEFAULT_MAX_FILE_SIZE;
use crate::error::MemoryError;
use crate::knowledge::KnowledgeBase;

#[derive(Debug)]
pub enum IngestOutcome {
    Ingested { handler: &'static str, chunks: usize },
    Skipped(SkipReason),
    TooLarge(u64),
    /// The source already has chunks in the knowledge base.
    AlreadyStored,
    Failed(MemoryError),
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: Vec<(String, IngestOutcome)>,
}

impl IngestReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, IngestOutcome::Ingested { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, IngestOutcome::Failed(_)))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                IngestOutcome::Skipped(_) | IngestOutcome::TooLarge(_) | IngestOutcome::AlreadyStored
            )
        })
    }

    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.files
            .iter()
            .map(|(_, o)| match o {
                IngestOutcome::Ingested { chunks, .. } => *chunks,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&IngestOutcome) -> bool) -> usize {
        self.files.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Extract (on the blocking pool) -> embed -> store, one file at a time.
#[derive(Debug)]
pub struct IngestionPipeline {
    registry: Arc<HandlerRegistry>,
    knowledge: Arc<KnowledgeBase>,
    options: ExtractOptions,
    max_file_size: u64,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        registry: Arc<HandlerRegistry>,
        knowledge: Arc<KnowledgeBase>,
        options: ExtractOptions,
    ) -> Self {
        Self {
            registry,
            knowledge,
            options,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Ingest one file. Per-file problems are reported in the outcome; this
    /// never returns early for the caller's batch.
    pub async fn ingest(&self, input: FileInput, mimetype: Option<String>) -> IngestOutcome {
        let name = input.display_name();
        match self.try_ingest(input, mimetype).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("error processing {name}: {e}");
                IngestOutcome::Failed(e)
            }
        }
    }

    async fn try_ingest(
        &self,
        input: FileInput,
        mimetype: Option<String>,
    ) -> Result<IngestOutcome, MemoryError> {
        let size = match &input {
            FileInput::Path(path) => tokio::fs::metadata(path).await.map_or(0, |m| m.len()),
            FileInput::Buffer { data, .. } => u64::try_from(data.len()).unwrap_or(u64::MAX),
        };
        if size > self.max_file_size {
            tracing::warn!("skipping {}: {size} bytes exceeds limit", input.display_name());
            return Ok(IngestOutcome::TooLarge(size));
        }

        let registry = Arc::clone(&self.registry);
        let options = self.options.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            extract_one(&registry, &input, mimetype.as_deref(), &options)
        })
        .await?;

        match outcome {
            FileOutcome::Processed { handler, chunks } => {
                let stored = self.knowledge.add(&chunks).await?;
                Ok(IngestOutcome::Ingested {
                    handler,
                    chunks: stored,
                })
            }
            FileOutcome::Skipped(reason) => Ok(IngestOutcome::Skipped(reason)),
            FileOutcome::Failed(e) => Err(e.into()),
        }
    }

    /// Ingest `inputs` in order, collecting one outcome per file.
    pub async fn ingest_all(&self, inputs: impl IntoIterator<Item = FileInput>) -> IngestReport {
        self.ingest_batch(inputs, &BTreeSet::new()).await
    }

    /// Like [`ingest_all`](Self::ingest_all), but sources that already have
    /// chunks stored are reported as [`IngestOutcome::AlreadyStored`] instead
    /// of being extracted again.
    pub async fn ingest_new(&self, inputs: impl IntoIterator<Item = FileInput>) -> IngestReport {
        let existing = match self.knowledge.sources().await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!("could not list stored sources, ingesting everything: {e}");
                BTreeSet::new()
            }
        };
        if !existing.is_empty() {
            tracing::info!("{} sources already stored", existing.len());
        }
        self.ingest_batch(inputs, &existing).await
    }

    async fn ingest_batch(
        &self,
        inputs: impl IntoIterator<Item = FileInput>,
        existing: &BTreeSet<String>,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        for input in inputs {
            let name = input.display_name();
            if existing.contains(&name) {
                tracing::debug!("{name} already stored, skipping");
                report.files.push((name, IngestOutcome::AlreadyStored));
                continue;
            }
            let outcome = self.ingest(input, None).await;
            if let IngestOutcome::Ingested { handler, chunks } = &outcome {
                tracing::info!("processed {name} with {handler}: {chunks} chunks");
            }
            report.files.push((name, outcome));
        }
        tracing::info!(
            "ingestion finished: {} succeeded, {} failed, {} skipped",
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
        report
    }
}
