use crate::builder::ScheduleBuilder;
use crate::error::{AmcError, ErrorKind};
use crate::protocol::{
    chunk_id_hint, decode_command, run_id_hint, BatchSummary, Command, Event,
};
use crate::schema::{Configuration, ContractIdentity, ContractRecord, ScheduleResult};
use futures::channel::mpsc::UnboundedSender;
use log::{debug, info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Receives events in the order the processor emits them.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

impl EventSink for UnboundedSender<Event> {
    fn emit(&mut self, event: Event) {
        if self.unbounded_send(event).is_err() {
            debug!("Event receiver dropped; discarding event");
        }
    }
}

/// Identifies one `process-batch` command in the events it produces.
#[derive(Debug, Clone, Copy)]
struct BatchTag {
    chunk_id: usize,
    chunk_total: usize,
    record_offset: usize,
    run_id: u64,
}

/// Runs commands to completion, one at a time, without any runtime of its own.
///
/// The processor is idle between calls. A batch starts and finishes inside a single `handle`
/// call, so its progress is only visible through the events it emits.
#[derive(Debug, Default)]
pub struct BatchProcessor {
    cancelled: Option<Arc<AtomicBool>>,
}

impl BatchProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abandons a running batch at the next record once `flag` is set.
    ///
    /// An abandoned batch emits no further progress and no `batch-complete`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn handle<S: EventSink + ?Sized>(&self, command: Command, sink: &mut S) {
        match command {
            Command::ProcessBatch {
                records,
                config,
                chunk_id,
                chunk_total,
                record_offset,
                run_id,
            } => {
                let tag = BatchTag {
                    chunk_id,
                    chunk_total,
                    record_offset,
                    run_id,
                };
                self.process_batch(&records, &config, tag, sink)
            }
            Command::ProcessSingle { record, config } => self.process_single(&record, &config, sink),
        }
    }

    /// Decodes and handles a JSON command. Undecodable input becomes an `error` event.
    pub fn handle_raw<S: EventSink + ?Sized>(&self, raw: &str, sink: &mut S) {
        match decode_command(raw) {
            Ok(command) => self.handle(command, sink),
            Err(e) => {
                warn!("Rejected command: {}", e);
                sink.emit(Event::error(&e, chunk_id_hint(raw), run_id_hint(raw)));
            }
        }
    }

    fn process_batch<S: EventSink + ?Sized>(
        &self,
        records: &[ContractRecord],
        config: &Configuration,
        tag: BatchTag,
        sink: &mut S,
    ) {
        let BatchTag {
            chunk_id,
            chunk_total,
            record_offset,
            run_id,
        } = tag;

        if let Err(e) = config.validate() {
            warn!("Rejected chunk {}: {}", chunk_id, e);
            sink.emit(Event::error(&e, Some(chunk_id), Some(run_id)));
            return;
        }

        let total = records.len();
        let started = Instant::now();

        info!("Chunk {} started with {} records", chunk_id, total);
        sink.emit(Event::BatchStarted {
            chunk_id,
            record_count: total,
            run_id,
        });

        let builder = ScheduleBuilder::new(config);
        let mut results = Vec::with_capacity(total);

        for (index, record) in records.iter().enumerate() {
            if self.is_cancelled() {
                info!("Chunk {} abandoned after {} of {} records", chunk_id, index, total);
                return;
            }

            let position = record_offset + index;
            results.push(schedule_isolated(record.identity(position), || {
                builder.build(record, position)
            }));

            let processed = index + 1;
            if processed % config.progress_interval == 0 && processed < total {
                debug!("Chunk {} progress: {}/{}", chunk_id, processed, total);
                sink.emit(Event::Progress {
                    chunk_id,
                    processed,
                    total,
                    elapsed_ms: elapsed_ms(started),
                    run_id,
                });
            }
        }

        sink.emit(Event::Progress {
            chunk_id,
            processed: total,
            total,
            elapsed_ms: elapsed_ms(started),
            run_id,
        });

        let summary = BatchSummary::from_results(&results);
        info!(
            "Chunk {} complete: {} processed, {} succeeded, {} failed",
            chunk_id, summary.processed, summary.succeeded, summary.failed
        );

        sink.emit(Event::BatchComplete {
            chunk_id,
            chunk_total,
            run_id,
            results,
            summary,
        });
    }

    fn process_single<S: EventSink + ?Sized>(
        &self,
        record: &ContractRecord,
        config: &Configuration,
        sink: &mut S,
    ) {
        if let Err(e) = config.validate() {
            warn!("Rejected single calculation: {}", e);
            sink.emit(Event::error(&e, None, None));
            return;
        }

        let builder = ScheduleBuilder::new(config);
        let result = schedule_isolated(record.identity(0), || builder.build(record, 0));
        sink.emit(Event::SingleComplete { result });
    }
}

/// Runs `build`, turning a panic into a `ComputationFault` placeholder for `identity`.
pub fn schedule_isolated<F>(identity: ContractIdentity, build: F) -> ScheduleResult
where
    F: FnOnce() -> ScheduleResult,
{
    match catch_unwind(AssertUnwindSafe(build)) {
        Ok(result) => result,
        Err(payload) => {
            let fault = AmcError::ComputationFault(panic_payload_to_string(payload.as_ref()));
            warn!("Record {} panicked: {}", identity.id, fault);
            ScheduleResult::failed(identity, ErrorKind::ComputationFault, fault.to_string())
        }
    }
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
