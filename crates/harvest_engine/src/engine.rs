use std::sync::{mpsc, Arc};
use std::thread;

use harvest_core::{Batch, ItemKey};
use harvest_logging::harvest_error;
use tokio_util::sync::CancellationToken;

use crate::fetch::ChannelProgressSink;
use crate::worker::{BatchWorker, SessionFactory};
use crate::{EngineEvent, Harvester, JobId};

pub enum HarvestJob {
    /// One pagination session. Progress is reported on the engine channel.
    Session(Harvester),
    /// Follow-up harvests for every key of a batch.
    Batch {
        batch: Batch<ItemKey>,
        factory: Arc<dyn SessionFactory>,
    },
}

enum EngineCommand {
    Enqueue { job_id: JobId, job: HarvestJob },
}

/// Runs harvest jobs in the background and reports [`EngineEvent`]s.
///
/// Each job gets its own thread and single-threaded runtime, so jobs run in
/// parallel and the per-thread session log label stays with its job.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    cancel: CancellationToken,
}

impl EngineHandle {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();

        thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                let EngineCommand::Enqueue { job_id, job } = command;
                let event_tx = event_tx.clone();
                let cancel = shutdown.child_token();
                thread::spawn(move || run_job(job_id, job, event_tx, cancel));
            }
        });

        Self {
            cmd_tx,
            event_rx,
            cancel,
        }
    }

    pub fn enqueue(&self, job_id: JobId, job: HarvestJob) {
        let _ = self.cmd_tx.send(EngineCommand::Enqueue { job_id, job });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Cancels every running job. Each still reports its partial outcome.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

fn run_job(
    job_id: JobId,
    job: HarvestJob,
    event_tx: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            harvest_error!("job {}: runtime unavailable: {}", job_id, err);
            let _ = event_tx.send(EngineEvent::JobFailed {
                job_id,
                message: err.to_string(),
            });
            return;
        }
    };

    let event = match job {
        HarvestJob::Session(harvester) => {
            let sink = Arc::new(ChannelProgressSink::new(event_tx.clone()));
            let harvester = harvester.with_job_id(job_id).with_progress(sink);
            let outcome = runtime.block_on(harvester.run_until_cancelled(&cancel));
            EngineEvent::SessionCompleted { job_id, outcome }
        }
        HarvestJob::Batch { batch, factory } => {
            let worker = BatchWorker::new(factory);
            let report = runtime.block_on(worker.run(&batch, &cancel));
            EngineEvent::BatchCompleted { job_id, report }
        }
    };
    let _ = event_tx.send(event);
}
