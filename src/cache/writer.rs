//! Ordered background writer for the disk tier.
//!
//! One named thread drains an unbounded queue in submission order, so the last record
//! queued for a key is the last one written. `flush` enqueues a marker and waits for the
//! thread to reach it; `stop` closes the queue and joins after the backlog is written.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use tracing::debug;

use crate::cache::disk::DiskRecord;
use crate::error::{ExtractError, ExtractResult};

enum WriteCommand {
    Store(DiskRecord),
    Flush(Sender<()>),
}

/// Handle to the disk writer thread.
#[derive(Debug)]
pub struct DiskWriter {
    queue: Option<Sender<WriteCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl DiskWriter {
    /// Starts a thread that calls `write` for every queued record.
    pub fn spawn<F>(name: &str, write: F) -> ExtractResult<Self>
    where
        F: Fn(&DiskRecord) + Send + 'static,
    {
        let (tx, rx) = unbounded::<WriteCommand>();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                for command in rx {
                    match command {
                        WriteCommand::Store(record) => write(&record),
                        WriteCommand::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                debug!(thread = %thread_name, "disk writer stopped");
            })
            .map_err(|e| ExtractError::io("spawn disk writer thread", e))?;

        Ok(Self {
            queue: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.queue.is_some()
    }

    /// Queues `record`. Returns `false` once the writer has stopped.
    pub fn enqueue(&self, record: DiskRecord) -> bool {
        match &self.queue {
            Some(queue) => queue.send(WriteCommand::Store(record)).is_ok(),
            None => false,
        }
    }

    /// Blocks until every record queued before this call has been written.
    pub fn flush(&self) {
        let Some(queue) = &self.queue else {
            return;
        };
        let (done_tx, done_rx) = bounded(1);
        if queue.send(WriteCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }

    /// Writes the backlog and joins the thread. Idempotent.
    pub fn stop(&mut self) {
        self.queue.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        self.stop();
    }
}
