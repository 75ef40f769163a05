use crate::error::{AmcError, Result};
use crate::processor::{BatchProcessor, EventSink};
use crate::protocol::{Command, Event};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::executor::block_on;
use futures::StreamExt;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const WORKER_THREAD_NAME: &str = "amc-batch-worker";

enum Inbound {
    Command(Command),
    Raw(String),
}

/// A batch processor running on its own thread, reachable only through ordered channels.
///
/// Events arrive in emission order. The first event is always `ready`.
pub struct BatchWorker {
    commands: Option<UnboundedSender<Inbound>>,
    events: UnboundedReceiver<Event>,
    terminated: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    last_run_id: u64,
}

impl BatchWorker {
    pub fn spawn() -> Result<Self> {
        let (command_tx, command_rx) = mpsc::unbounded();
        let (event_tx, event_rx) = mpsc::unbounded();
        let terminated = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&terminated);

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run(command_rx, event_tx, flag))
            .map_err(|e| AmcError::WorkerUnavailable(format!("Failed to spawn worker: {}", e)))?;

        info!("Spawned {}", WORKER_THREAD_NAME);

        Ok(Self {
            commands: Some(command_tx),
            events: event_rx,
            terminated,
            thread: Some(thread),
            last_run_id: 0,
        })
    }

    pub fn submit(&self, command: Command) -> Result<()> {
        self.send(Inbound::Command(command))
    }

    /// Queues a raw JSON command. Decoding happens on the worker thread.
    pub fn submit_json(&self, raw: impl Into<String>) -> Result<()> {
        self.send(Inbound::Raw(raw.into()))
    }

    /// A run tag not yet handed out by this worker. Tag 0 is never returned.
    pub fn next_run_id(&mut self) -> u64 {
        self.last_run_id += 1;
        self.last_run_id
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.next().await
    }

    /// The event stream, for callers that want to combine it with other streams.
    pub fn events(&mut self) -> &mut UnboundedReceiver<Event> {
        &mut self.events
    }

    /// Stops accepting commands, lets queued commands finish and waits for the thread.
    ///
    /// Returns every event nobody has read yet, in emission order.
    pub fn shutdown(mut self) -> Result<Vec<Event>> {
        self.commands.take();
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| AmcError::WorkerUnavailable("Worker thread panicked".to_string()))?;
        }

        // The worker's sender is gone once the thread has exited, so this ends at the last event.
        Ok(block_on((&mut self.events).collect::<Vec<Event>>()))
    }

    /// Stops the worker without waiting for it.
    ///
    /// Queued commands are discarded and a running batch is abandoned at its next record, so
    /// neither produces a `batch-complete`. Events already emitted stay readable, after which
    /// the stream ends. Further submissions fail with `WorkerUnavailable`.
    pub fn terminate(&mut self) {
        if self.commands.is_some() {
            debug!("Terminating {}", WORKER_THREAD_NAME);
        }
        self.terminated.store(true, Ordering::SeqCst);
        self.commands.take();
        self.thread.take();
    }

    fn send(&self, message: Inbound) -> Result<()> {
        let sender = self
            .commands
            .as_ref()
            .ok_or_else(|| AmcError::WorkerUnavailable("Worker is shut down".to_string()))?;
        sender
            .unbounded_send(message)
            .map_err(|_| AmcError::WorkerUnavailable("Worker stopped".to_string()))
    }
}

impl Drop for BatchWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.terminate();
        }
    }
}

fn run(
    mut commands: UnboundedReceiver<Inbound>,
    mut events: UnboundedSender<Event>,
    terminated: Arc<AtomicBool>,
) {
    let processor = BatchProcessor::new().with_cancel_flag(Arc::clone(&terminated));
    events.emit(Event::ready());

    while let Some(message) = block_on(commands.next()) {
        if terminated.load(Ordering::SeqCst) {
            break;
        }
        match message {
            Inbound::Command(command) => processor.handle(command, &mut events),
            Inbound::Raw(raw) => processor.handle_raw(&raw, &mut events),
        }
    }

    debug!("{} stopped", WORKER_THREAD_NAME);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Configuration, ContractRecord};

    #[tokio::test]
    async fn test_worker_round_trip() {
        let mut worker = BatchWorker::spawn().unwrap();
        assert!(matches!(worker.next_event().await, Some(Event::Ready { .. })));

        worker
            .submit(Command::ProcessSingle {
                record: ContractRecord::new("w-1", "2024-01-05", 100_000.0),
                config: Configuration::default(),
            })
            .unwrap();

        match worker.next_event().await {
            Some(Event::SingleComplete { result }) => {
                assert!(result.is_success());
                assert_eq!(result.identity.id, "w-1");
            }
            other => panic!("expected single-complete, got {:?}", other),
        }

        worker.submit_json(r#"{"type": "bogus"}"#).unwrap();
        assert!(matches!(worker.next_event().await, Some(Event::Error { .. })));

        worker.shutdown().unwrap();
    }

    fn batch(chunk_id: usize, chunk_total: usize, count: usize) -> Command {
        Command::ProcessBatch {
            records: (0..count)
                .map(|i| ContractRecord::new(format!("c{}-{}", chunk_id, i), "2022-10-05", 1_000.0))
                .collect(),
            config: Configuration::default(),
            chunk_id,
            chunk_total,
            record_offset: 0,
            run_id: 0,
        }
    }

    fn completed_chunks(events: &[Event]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::BatchComplete { chunk_id, .. } => Some(*chunk_id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_events_stay_ordered() {
        let mut worker = BatchWorker::spawn().unwrap();
        worker.submit(batch(7, 1, 120)).unwrap();

        let mut last_processed = 0;
        let mut saw_final_progress = false;
        loop {
            match worker.next_event().await {
                Some(Event::Ready { .. }) | Some(Event::BatchStarted { .. }) => {}
                Some(Event::Progress {
                    processed, total, ..
                }) => {
                    assert!(processed >= last_processed);
                    last_processed = processed;
                    saw_final_progress = processed == total;
                }
                Some(Event::BatchComplete {
                    chunk_id, summary, ..
                }) => {
                    assert_eq!(chunk_id, 7);
                    assert_eq!(summary.processed, 120);
                    break;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert!(saw_final_progress);
        assert_eq!(last_processed, 120);
    }

    #[test]
    fn test_shutdown_finishes_queued_batches() {
        let worker = BatchWorker::spawn().unwrap();
        worker.submit(batch(0, 2, 60)).unwrap();
        worker.submit(batch(1, 2, 60)).unwrap();

        let events = worker.shutdown().unwrap();
        assert!(matches!(events.first(), Some(Event::Ready { .. })));
        assert_eq!(completed_chunks(&events), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_terminate_discards_queued_work() {
        let commands: Vec<Command> = (0..8).map(|id| batch(id, 8, 2_500)).collect();

        let mut worker = BatchWorker::spawn().unwrap();
        for command in commands {
            worker.submit(command).unwrap();
        }
        worker.terminate();

        let mut events = Vec::new();
        while let Some(event) = worker.next_event().await {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(Event::Ready { .. })));
        assert!(completed_chunks(&events).len() < 8);
    }

    #[test]
    fn test_terminated_worker_rejects_commands() {
        let mut worker = BatchWorker::spawn().unwrap();
        worker.terminate();

        let err = worker.submit(batch(0, 1, 1)).unwrap_err();
        assert!(matches!(err, AmcError::WorkerUnavailable(_)));
        assert!(matches!(
            worker.submit_json(r#"{"type": "process-single"}"#),
            Err(AmcError::WorkerUnavailable(_))
        ));
    }

    #[test]
    fn test_run_ids_are_fresh() {
        let mut worker = BatchWorker::spawn().unwrap();
        let first = worker.next_run_id();
        let second = worker.next_run_id();
        assert_ne!(first, 0);
        assert!(second > first);
    }
}
