use crate::error::{AmcError, Result};
use crate::protocol::{BatchSummary, Command, Event};
use crate::schema::{Configuration, ContractRecord, ScheduleResult};
use crate::worker::BatchWorker;
use log::{debug, info};

/// Progress across a whole dataset, derived from per-chunk progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetProgress {
    pub chunk_id: usize,
    pub chunk_total: usize,
    pub completed_records: usize,
    pub total_records: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOutcome {
    /// One result per input record, in input order.
    pub results: Vec<ScheduleResult>,
    pub summary: BatchSummary,
}

/// Splits `records` into `process-batch` commands of at most `config.chunk_size` records.
///
/// Each command carries the dataset position of its first record, so fallback ids stay
/// unique across chunks.
pub fn partition(records: Vec<ContractRecord>, config: &Configuration) -> Vec<Command> {
    tagged_partition(records, config, 0)
}

fn tagged_partition(
    records: Vec<ContractRecord>,
    config: &Configuration,
    run_id: u64,
) -> Vec<Command> {
    let size = config.chunk_size.max(1);
    let chunk_total = records.len().div_ceil(size);
    let mut remaining = records.into_iter();

    (0..chunk_total)
        .map(|chunk_id| Command::ProcessBatch {
            records: remaining.by_ref().take(size).collect(),
            config: config.clone(),
            chunk_id,
            chunk_total,
            record_offset: chunk_id * size,
            run_id,
        })
        .collect()
}

/// Sends a dataset through `worker` chunk by chunk and gathers the results.
///
/// Every chunk is tagged with a fresh run id from the worker. Events of other runs still
/// queued on the worker are skipped. `on_progress` sees every progress event of this run
/// translated to dataset-wide counts.
pub async fn run_dataset<F>(
    worker: &mut BatchWorker,
    records: Vec<ContractRecord>,
    config: &Configuration,
    mut on_progress: F,
) -> Result<DatasetOutcome>
where
    F: FnMut(DatasetProgress),
{
    config.validate()?;

    let total_records = records.len();
    let run_id = worker.next_run_id();
    let commands = tagged_partition(records, config, run_id);
    let chunk_total = commands.len();

    if chunk_total == 0 {
        return Ok(DatasetOutcome {
            results: Vec::new(),
            summary: BatchSummary::default(),
        });
    }

    info!(
        "Dispatching {} records in {} chunks (run {})",
        total_records, chunk_total, run_id
    );

    let mut chunk_sizes = vec![0; chunk_total];
    for command in commands {
        if let Command::ProcessBatch {
            ref records,
            chunk_id,
            ..
        } = command
        {
            chunk_sizes[chunk_id] = records.len();
        }
        worker.submit(command)?;
    }

    let mut chunks: Vec<Option<(Vec<ScheduleResult>, BatchSummary)>> = vec![None; chunk_total];
    let mut completed_chunks = 0;
    let mut completed_records = 0;

    while completed_chunks < chunk_total {
        let event = worker
            .next_event()
            .await
            .ok_or_else(|| AmcError::WorkerUnavailable("Event stream closed".to_string()))?;

        if event.run_id() != Some(run_id) {
            debug!("Skipping event from another run: {:?}", event.run_id());
            continue;
        }

        match event {
            Event::Progress {
                chunk_id,
                processed,
                ..
            } => on_progress(DatasetProgress {
                chunk_id,
                chunk_total,
                completed_records: completed_records + processed,
                total_records,
            }),
            Event::BatchComplete {
                chunk_id,
                chunk_total: reported_total,
                results,
                summary,
                ..
            } => {
                let expected = chunk_sizes.get(chunk_id).copied();
                if reported_total != chunk_total
                    || expected != Some(results.len())
                    || chunks[chunk_id].is_some()
                {
                    return Err(AmcError::ProtocolError(format!(
                        "Unexpected completion for chunk {}/{} with {} results in run {}",
                        chunk_id,
                        reported_total,
                        results.len(),
                        run_id
                    )));
                }

                debug!("Chunk {}/{} collected", chunk_id + 1, chunk_total);
                completed_records += results.len();
                completed_chunks += 1;
                chunks[chunk_id] = Some((results, summary));
            }
            Event::Error { message, chunk_id, .. } => {
                return Err(AmcError::ProtocolError(match chunk_id {
                    Some(id) => format!("Chunk {} failed: {}", id, message),
                    None => message,
                }));
            }
            _ => {}
        }
    }

    let mut results = Vec::with_capacity(total_records);
    let mut summary = BatchSummary::default();
    for (chunk_results, chunk_summary) in chunks.into_iter().flatten() {
        summary.absorb(&chunk_summary);
        results.extend(chunk_results);
    }

    info!(
        "Dataset complete: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    );

    Ok(DatasetOutcome { results, summary })
}
