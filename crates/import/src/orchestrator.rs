//! One execution of an import job, from the first unread line to a terminal
//! status.
//!
//! The orchestrator owns the job's [`JobState`] for the duration of the run.
//! It validates the header on a fresh run, or skips to the checkpointed line
//! on a resumed one, then dispatches lines to the [`BatchProcessor`] until
//! the input ends or cancellation is observed.

use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use twingraph_core::checkpoint::ImportJobCheckpoint;
use twingraph_core::import_job::{ImportJobRecord, JobError};
use twingraph_core::job_state::{determine_status, ImportCounters, JobState};
use twingraph_core::section::{transition, Section};
use twingraph_core::status::ImportJobStatus;

use crate::batch::BatchProcessor;
use crate::blob::{BlobReader, BlobWriter};
use crate::checkpoint::CheckpointWriter;
use crate::error::{ImportError, StoreError};
use crate::graph::GraphClient;
use crate::log::JobLogWriter;
use crate::parser::{ParsedLine, SectionStreamParser};
use crate::store::{CheckpointStore, ImportJobStore};

/// Result of a run that reached a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub status: ImportJobStatus,
    pub counters: ImportCounters,
    pub error: Option<JobError>,
}

/// How the line loop ended.
enum Drained {
    Completed,
    Cancelled,
}

/// Mutable pieces of one run, borrowed together by the line loop.
struct RunContext<'a, R> {
    parser: SectionStreamParser<R>,
    state: JobState,
    batch: BatchProcessor,
    log: &'a mut JobLogWriter,
    checkpoints: &'a CheckpointWriter,
}

#[derive(Clone)]
pub struct ImportJobOrchestrator {
    jobs: Arc<dyn ImportJobStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    graph: Arc<dyn GraphClient>,
}

impl ImportJobOrchestrator {
    pub fn new(
        jobs: Arc<dyn ImportJobStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        graph: Arc<dyn GraphClient>,
    ) -> Self {
        Self {
            jobs,
            checkpoints,
            graph,
        }
    }

    /// Run `job` against a fresh read of its input.
    ///
    /// Returns the terminal outcome once it is recorded on the job. An
    /// `Err` means the run was interrupted by infrastructure (input read
    /// failure, job store failure): the job stays `running`, its checkpoint
    /// is kept, and a later attempt resumes it.
    pub async fn run(
        &self,
        job: &ImportJobRecord,
        input: BlobReader,
        output: BlobWriter,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome, StoreError> {
        let mut log = JobLogWriter::new(&job.id, output);
        let checkpoint = self.checkpoints.load(&job.id).await?;
        if !self.jobs.mark_running(&job.id).await? {
            return Err(StoreError::NotRunning { id: job.id.clone() });
        }

        let writer = CheckpointWriter::new(&job.id, self.checkpoints.clone(), self.jobs.clone());
        let mut batch = BatchProcessor::new(self.graph.clone(), job.options.clone());
        let state = match &checkpoint {
            Some(cp) => {
                batch.restore_models(cp.pending_models.clone());
                tracing::info!(
                    job_id = %job.id,
                    section = cp.current_section.as_str(),
                    line_number = cp.line_number,
                    "Resuming import job from checkpoint",
                );
                log.info(json!({
                    "status": "resumed",
                    "section": cp.current_section.as_str(),
                    "lineNumber": cp.line_number,
                }))
                .await;
                JobState::from_checkpoint(cp)
            }
            None => {
                tracing::info!(job_id = %job.id, "Starting import job");
                log.info(json!({
                    "status": "started",
                    "inputBlobUri": job.input_blob_uri,
                }))
                .await;
                JobState::fresh(&job.id)
            }
        };

        let mut ctx = RunContext {
            parser: SectionStreamParser::new(BufReader::new(input)),
            state,
            batch,
            log: &mut log,
            checkpoints: &writer,
        };
        let drained = process(&mut ctx, checkpoint.as_ref(), job, cancel).await;
        let counters = ctx.state.counters();

        let (status, error) = match drained {
            Ok(drained) => {
                let cancelled = matches!(drained, Drained::Cancelled);
                let lines = ctx.parser.lines_read();
                let pending = ctx.batch.pending_models().to_vec();
                writer.save(&mut ctx.state, lines, &pending).await;
                (determine_status(&counters, cancelled), None)
            }
            Err(ImportError::Store(e)) => return Err(e),
            Err(ImportError::Io(e)) => {
                tracing::warn!(job_id = %job.id, error = %e, "Import input read failed");
                return Err(StoreError::Io(e));
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Import job failed");
                (ImportJobStatus::Failed, Some(e.to_job_error()))
            }
        };
        drop(ctx);

        if status.clears_checkpoint() {
            writer.clear().await;
        }
        let recorded = self
            .jobs
            .finish(&job.id, status, &counters, error.as_ref())
            .await?;
        if !recorded {
            tracing::warn!(
                job_id = %job.id,
                status = status.as_str(),
                "Import job was finalized elsewhere, outcome not recorded",
            );
        }

        let summary = json!({
            "status": status.as_str(),
            "modelsCreated": counters.models_created,
            "twinsCreated": counters.twins_created,
            "relationshipsCreated": counters.relationships_created,
            "errorCount": counters.error_count,
            "error": error,
        });
        match status {
            ImportJobStatus::Succeeded => log.info(summary).await,
            ImportJobStatus::Failed => log.error(summary).await,
            _ => log.warning(summary).await,
        }
        tracing::info!(
            job_id = %job.id,
            status = status.as_str(),
            models_created = counters.models_created,
            twins_created = counters.twins_created,
            relationships_created = counters.relationships_created,
            error_count = counters.error_count,
            "Import job finished",
        );

        Ok(ImportOutcome {
            status,
            counters,
            error,
        })
    }
}

async fn process<R>(
    ctx: &mut RunContext<'_, R>,
    checkpoint: Option<&ImportJobCheckpoint>,
    job: &ImportJobRecord,
    cancel: &CancellationToken,
) -> Result<Drained, ImportError>
where
    R: AsyncBufRead + Unpin,
{
    match checkpoint {
        Some(cp) => ctx.parser.skip_to(cp.line_number).await?,
        None => {
            let header = ctx.parser.read_header().await?;
            ctx.state.enter_section(Section::Header);
            ctx.log
                .info(json!({
                    "status": "headerValidated",
                    "fileVersion": header.file_version,
                    "author": header.author,
                    "organization": header.organization,
                }))
                .await;
            let lines = ctx.parser.lines_read();
            ctx.checkpoints.save(&mut ctx.state, lines, &[]).await;
        }
    }

    loop {
        if cancel.is_cancelled() {
            // Let the in-flight batch land so the checkpoint stays consistent.
            ctx.batch.flush(&mut ctx.state, ctx.log).await?;
            tracing::info!(job_id = %job.id, line_number = ctx.parser.lines_read(), "Import job cancelled");
            ctx.log
                .warning(json!({
                    "status": "cancelled",
                    "section": ctx.state.current_section().as_str(),
                    "lineNumber": ctx.parser.lines_read(),
                }))
                .await;
            return Ok(Drained::Cancelled);
        }

        let Some(item) = ctx.parser.next_line().await? else {
            break;
        };
        let line_number = item.line_number;

        match item.line {
            ParsedLine::Marker(Section::Header) => {
                ctx.log
                    .warning(json!({
                        "lineNumber": line_number,
                        "message": "Repeated Header section ignored",
                    }))
                    .await;
            }
            ParsedLine::Marker(next) => {
                let change = transition(ctx.state.current_section(), next);
                match change.completed {
                    Some(done) => {
                        ctx.batch
                            .finish_section(done, line_number, &mut ctx.state, ctx.log)
                            .await?;
                        ctx.state.mark_completed(done);
                    }
                    None => ctx.batch.flush(&mut ctx.state, ctx.log).await?,
                }
                ctx.state.enter_section(change.entered);

                let skipped = ctx.state.is_completed(change.entered);
                tracing::debug!(
                    job_id = %job.id,
                    section = change.entered.as_str(),
                    line_number,
                    skipped,
                    "Entered import section",
                );
                let status = if skipped { "sectionSkipped" } else { "sectionStarted" };
                ctx.log
                    .info(json!({
                        "status": status,
                        "section": change.entered.as_str(),
                        "lineNumber": line_number,
                    }))
                    .await;
                let pending = ctx.batch.pending_models().to_vec();
                ctx.checkpoints
                    .save(&mut ctx.state, line_number, &pending)
                    .await;
            }
            ParsedLine::UnknownMarker(name) => {
                ctx.state.record_error();
                let message = format!("Unknown section '{name}'");
                ctx.log
                    .error(json!({ "lineNumber": line_number, "message": message }))
                    .await;
                if !job.options.continue_on_failure {
                    return Err(ImportError::ItemFailed {
                        line_number,
                        message,
                    });
                }
            }
            ParsedLine::NotUtf8(reason) => {
                let section = ctx.state.current_section();
                if ctx.state.is_completed(section) {
                    skip_completed_line(ctx, section, line_number).await;
                    continue;
                }
                ctx.batch
                    .reject_line(
                        section,
                        line_number,
                        format!("line is not valid UTF-8: {reason}"),
                        &mut ctx.state,
                        ctx.log,
                    )
                    .await?;
                if ctx.batch.is_idle() {
                    let pending = ctx.batch.pending_models().to_vec();
                    ctx.checkpoints
                        .maybe_save(&mut ctx.state, line_number, &pending)
                        .await;
                }
            }
            ParsedLine::Data(raw) => {
                let section = ctx.state.current_section();
                if ctx.state.is_completed(section) {
                    skip_completed_line(ctx, section, line_number).await;
                    continue;
                }
                match section {
                    Section::Models => {
                        ctx.batch
                            .push_model(line_number, raw, &mut ctx.state, ctx.log)
                            .await?;
                    }
                    Section::Twins | Section::Relationships => {
                        ctx.batch.push_item(section, line_number, raw);
                        if ctx.batch.batch_full() {
                            ctx.batch.flush(&mut ctx.state, ctx.log).await?;
                        }
                    }
                    Section::None | Section::Header => {
                        ctx.log
                            .warning(json!({
                                "lineNumber": line_number,
                                "message": "Data line outside a data section ignored",
                            }))
                            .await;
                    }
                }
                if ctx.batch.is_idle() {
                    let pending = ctx.batch.pending_models().to_vec();
                    ctx.checkpoints
                        .maybe_save(&mut ctx.state, line_number, &pending)
                        .await;
                }
            }
        }
    }

    let current = ctx.state.current_section();
    let lines = ctx.parser.lines_read();
    ctx.batch
        .finish_section(current, lines, &mut ctx.state, ctx.log)
        .await?;
    if current.carries_graph_data() {
        ctx.state.mark_completed(current);
    }
    Ok(Drained::Completed)
}

/// A data line of a section that already completed, in this run or a
/// previous one. It is not applied again.
async fn skip_completed_line<R>(ctx: &mut RunContext<'_, R>, section: Section, line_number: u64) {
    ctx.log
        .warning(json!({
            "section": section.as_str(),
            "lineNumber": line_number,
            "message": "Section already completed, line skipped",
        }))
        .await;
}
