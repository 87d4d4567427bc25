// src/pipeline.rs

use crate::extract::{ExtractionError, Extractor};
use crate::pdf::{self, TrimReport};
use crate::prompts::PromptSet;
use crate::record::ExtractedRecord;
use crate::schedule::{self, ScheduleOutcome};
use crate::validate::{ResponseValidator, ValidationWarning};
use crate::webhook::{Webhook, WebhookError, WebhookReceipt};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("extracted JSON does not match the record shape: {0}")]
    Shape(#[source] serde_json::Error),
    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{source}")]
    Webhook {
        #[source]
        source: WebhookError,
        /// The finished record, so the caller can still surface it.
        record: Box<ExtractedRecord>,
    },
}

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub max_pages: usize,
    /// Where to save the enriched record, before any delivery attempt.
    pub output: Option<PathBuf>,
    pub deliver: bool,
}

/// Everything one invocation produced.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub document_id: String,
    pub record: ExtractedRecord,
    pub trim: TrimReport,
    pub warnings: Vec<ValidationWarning>,
    pub schedule: ScheduleOutcome,
    pub delivery: Option<WebhookReceipt>,
}

/// Short content hash used to correlate the logs of one document.
pub fn document_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

/// Trim → extract → validate → schedule → save → deliver.
pub struct Pipeline {
    extractor: Box<dyn Extractor>,
    webhook: Option<Box<dyn Webhook>>,
    prompts: PromptSet,
    validator: ResponseValidator,
}

impl Pipeline {
    pub fn new(
        extractor: Box<dyn Extractor>,
        webhook: Option<Box<dyn Webhook>>,
        prompts: PromptSet,
        validator: ResponseValidator,
    ) -> Self {
        Self {
            extractor,
            webhook,
            prompts,
            validator,
        }
    }

    pub async fn process(
        &self,
        file_name: &str,
        pdf_bytes: Vec<u8>,
        opts: &ProcessOptions,
    ) -> Result<ProcessOutcome, PipelineError> {
        let id = document_id(&pdf_bytes);
        let span = info_span!("document", id = %id, file = %file_name);
        self.run(id, file_name, pdf_bytes, opts).instrument(span).await
    }

    async fn run(
        &self,
        document_id: String,
        file_name: &str,
        pdf_bytes: Vec<u8>,
        opts: &ProcessOptions,
    ) -> Result<ProcessOutcome, PipelineError> {
        info!(bytes = pdf_bytes.len(), backend = %self.extractor.describe(), "Processing document");

        let prepared = pdf::prepare_for_extraction(file_name, pdf_bytes, opts.max_pages);
        let raw = self.extractor.extract(&prepared, &self.prompts).await?;
        // Dropping the prepared document here releases the trimmed copy.
        let trim = prepared.report;

        let mut record = ExtractedRecord::from_value(raw).map_err(PipelineError::Shape)?;
        let (filled, total) = record.coverage();
        info!(
            filled,
            total,
            convocantes = record.convocantes.len(),
            convocados = record.convocados.len(),
            "Record extracted"
        );

        let warnings = self.validator.validate(&record);
        let schedule = schedule::apply_schedule(&mut record);

        if let Some(path) = &opts.output {
            write_record(path, &record).await?;
        }

        let delivery = match (&self.webhook, opts.deliver) {
            (Some(webhook), true) => {
                let payload = serde_json::to_value(&record).map_err(PipelineError::Serialize)?;
                match webhook.deliver(&payload).await {
                    Ok(receipt) => Some(receipt),
                    Err(source) => {
                        return Err(PipelineError::Webhook {
                            source,
                            record: Box::new(record),
                        });
                    }
                }
            }
            (None, true) => {
                warn!("Delivery requested but no webhook is configured");
                None
            }
            _ => None,
        };

        info!(warnings = warnings.len(), delivered = delivery.is_some(), "Document done");
        Ok(ProcessOutcome {
            document_id,
            record,
            trim,
            warnings,
            schedule,
            delivery,
        })
    }
}

async fn write_record(path: &Path, record: &ExtractedRecord) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(record).map_err(PipelineError::Serialize)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| PipelineError::Output {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), "Record saved");
    Ok(())
}
