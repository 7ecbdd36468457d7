//! Batches data lines and applies them to the graph store.
//!
//! Models accumulate for the whole section and are applied as one batch
//! when the section ends. Twins and relationships are flushed every
//! `batch_size` items, each item applied on its own so one bad line only
//! costs one error.

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use twingraph_core::job_state::JobState;
use twingraph_core::model_deps::parse_model;
use twingraph_core::options::ImportJobOptions;
use twingraph_core::section::Section;

use crate::error::{GraphError, ImportError};
use crate::graph::GraphClient;
use crate::log::JobLogWriter;

/// A twin or relationship line waiting for the next flush.
#[derive(Debug, Clone)]
struct PendingItem {
    section: Section,
    line_number: u64,
    raw: String,
}

/// Why a single item could not be applied.
#[derive(Debug)]
struct ItemFailure {
    item_id: Option<String>,
    message: String,
}

impl ItemFailure {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            item_id: None,
            message: message.into(),
        }
    }
}

pub struct BatchProcessor {
    graph: Arc<dyn GraphClient>,
    options: ImportJobOptions,
    pending_models: Vec<String>,
    items: Vec<PendingItem>,
}

impl BatchProcessor {
    pub fn new(graph: Arc<dyn GraphClient>, options: ImportJobOptions) -> Self {
        let capacity = options.batch_size;
        Self {
            graph,
            options,
            pending_models: Vec::new(),
            items: Vec::with_capacity(capacity),
        }
    }

    /// Re-seed model lines buffered by an interrupted run.
    pub fn restore_models(&mut self, models: Vec<String>) {
        self.pending_models = models;
    }

    /// Model lines waiting for the end of the Models section.
    pub fn pending_models(&self) -> &[String] {
        &self.pending_models
    }

    /// No twin or relationship is waiting to be applied.
    pub fn is_idle(&self) -> bool {
        self.items.is_empty()
    }

    pub fn batch_full(&self) -> bool {
        self.items.len() >= self.options.batch_size
    }

    /// Buffer a model line. Lines that are not a model with an `@id` are
    /// counted as failed items right away.
    pub async fn push_model(
        &mut self,
        line_number: u64,
        raw: String,
        state: &mut JobState,
        log: &mut JobLogWriter,
    ) -> Result<(), ImportError> {
        match parse_model(self.pending_models.len(), &raw) {
            Ok(_) => {
                self.pending_models.push(raw);
                state.record_model_buffered();
                Ok(())
            }
            Err(e) => {
                let failure = ItemFailure::invalid(e.to_string());
                self.item_failed(Section::Models, line_number, failure, state, log)
                    .await
            }
        }
    }

    /// Buffer a twin or relationship line for the next flush.
    pub fn push_item(&mut self, section: Section, line_number: u64, raw: String) {
        self.items.push(PendingItem {
            section,
            line_number,
            raw,
        });
    }

    /// Count a line that cannot become an item at all, such as one that is
    /// not valid UTF-8. Buffered twins or relationships are applied first so
    /// items land in line order.
    pub async fn reject_line(
        &mut self,
        section: Section,
        line_number: u64,
        message: String,
        state: &mut JobState,
        log: &mut JobLogWriter,
    ) -> Result<(), ImportError> {
        self.flush(state, log).await?;
        self.item_failed(section, line_number, ItemFailure::invalid(message), state, log)
            .await
    }

    /// Apply the buffered model lines as one dependency-ordered batch.
    ///
    /// A rejected batch counts as a single error and writes nothing.
    /// `line_number` is where the Models section ended.
    pub async fn flush_models(
        &mut self,
        line_number: u64,
        state: &mut JobState,
        log: &mut JobLogWriter,
    ) -> Result<(), ImportError> {
        if self.pending_models.is_empty() {
            return Ok(());
        }
        let models = std::mem::take(&mut self.pending_models);
        let submitted = models.len();

        match self.with_timeout(self.graph.create_models_batch(&models)).await {
            Ok(created) => {
                state.record_models_created(created);
                tracing::debug!(submitted, created, "Model batch applied");
                log.info(json!({
                    "section": Section::Models.as_str(),
                    "status": "modelsCreated",
                    "count": created,
                }))
                .await;
                Ok(())
            }
            Err(e) => {
                state.record_error();
                tracing::warn!(submitted, error = %e, "Model batch rejected");
                log.error(json!({
                    "section": Section::Models.as_str(),
                    "lineNumber": line_number,
                    "message": format!("Model batch of {submitted} rejected: {e}"),
                }))
                .await;
                if self.options.continue_on_failure {
                    Ok(())
                } else {
                    Err(ImportError::ItemFailed {
                        line_number,
                        message: format!("model batch rejected: {e}"),
                    })
                }
            }
        }
    }

    /// Apply every buffered twin or relationship, in arrival order.
    ///
    /// With `continueOnFailure` off the first failure aborts the flush.
    pub async fn flush(
        &mut self,
        state: &mut JobState,
        log: &mut JobLogWriter,
    ) -> Result<(), ImportError> {
        let items = std::mem::take(&mut self.items);
        for item in items {
            match self.apply_item(&item).await {
                Ok(item_id) => {
                    match item.section {
                        Section::Relationships => state.record_relationship_created(),
                        _ => state.record_twin_created(),
                    }
                    log.info(json!({
                        "section": item.section.as_str(),
                        "lineNumber": item.line_number,
                        "itemId": item_id,
                        "status": "created",
                    }))
                    .await;
                }
                Err(failure) => {
                    self.item_failed(item.section, item.line_number, failure, state, log)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Flush whatever belongs to `section` at its end.
    pub async fn finish_section(
        &mut self,
        section: Section,
        line_number: u64,
        state: &mut JobState,
        log: &mut JobLogWriter,
    ) -> Result<(), ImportError> {
        self.flush(state, log).await?;
        if section == Section::Models {
            self.flush_models(line_number, state, log).await?;
        }
        Ok(())
    }

    async fn item_failed(
        &self,
        section: Section,
        line_number: u64,
        failure: ItemFailure,
        state: &mut JobState,
        log: &mut JobLogWriter,
    ) -> Result<(), ImportError> {
        state.record_error();
        tracing::debug!(
            section = section.as_str(),
            line_number,
            error = %failure.message,
            "Import item failed",
        );
        log.error(json!({
            "section": section.as_str(),
            "lineNumber": line_number,
            "itemId": failure.item_id,
            "message": failure.message,
        }))
        .await;

        if self.options.continue_on_failure {
            Ok(())
        } else {
            Err(ImportError::ItemFailed {
                line_number,
                message: failure.message,
            })
        }
    }

    async fn apply_item(&self, item: &PendingItem) -> Result<String, ItemFailure> {
        let value: serde_json::Value = serde_json::from_str(&item.raw)
            .map_err(|e| ItemFailure::invalid(format!("malformed JSON: {e}")))?;
        let dt_id = required_id(&value, "$dtId")?;

        let result = match item.section {
            Section::Relationships => {
                let relationship_id = required_id(&value, "$relationshipId").map_err(|mut f| {
                    f.item_id = Some(dt_id.to_string());
                    f
                })?;
                let outcome = self
                    .with_timeout(self.graph.create_or_replace_relationship(
                        dt_id,
                        relationship_id,
                        &value,
                    ))
                    .await;
                (relationship_id, outcome)
            }
            _ => {
                let outcome = self
                    .with_timeout(self.graph.create_or_replace_twin(dt_id, &value))
                    .await;
                (dt_id, outcome)
            }
        };

        match result {
            (id, Ok(_)) => Ok(id.to_string()),
            (id, Err(e)) => Err(ItemFailure {
                item_id: Some(id.to_string()),
                message: e.to_string(),
            }),
        }
    }

    /// Bound a graph call by the per-item operation timeout.
    async fn with_timeout<T, F>(&self, call: F) -> Result<T, GraphError>
    where
        F: Future<Output = Result<T, GraphError>>,
    {
        let timeout = self.options.operation_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GraphError::Rejected(format!(
                "operation timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

fn required_id<'a>(value: &'a serde_json::Value, field: &str) -> Result<&'a str, ItemFailure> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ItemFailure::invalid(format!("missing string {field}")))
}
