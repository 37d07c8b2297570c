//! Concurrent dispatcher on a tokio multi-thread runtime
//!
//! One task per actor drains an unbounded channel. A `watch` gate holds the
//! task back while the actor is suspended. The runtime is built on first use
//! and owned by the dispatcher.

use crate::cell::ActorCell;
use crate::dispatcher::{Dispatcher, Task};
use parking_lot::Mutex;
use probekit_core::actor::ActorId;
use probekit_core::error::{Error, Result};
use probekit_core::message::Envelope;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

struct TokioSlot {
    tx: mpsc::UnboundedSender<Envelope>,
    /// `true` while the actor may process messages
    gate: watch::Sender<bool>,
}

/// Dispatcher running each actor as a task on a shared tokio runtime
pub struct TokioDispatcher {
    thread_name: String,
    worker_threads_count: usize,
    runtime: Mutex<Option<Runtime>>,
    slots: Mutex<HashMap<ActorId, TokioSlot>>,
}

impl TokioDispatcher {
    pub fn new(system_name: &str, worker_threads_count: usize) -> Self {
        debug_assert!(worker_threads_count > 0);
        Self {
            thread_name: format!("{}-dispatcher", system_name),
            worker_threads_count,
            runtime: Mutex::new(None),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Handle to the runtime, building it on first use
    pub fn handle(&self) -> Result<Handle> {
        let mut runtime = self.runtime.lock();
        if let Some(rt) = runtime.as_ref() {
            return Ok(rt.handle().clone());
        }

        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.worker_threads_count)
            .thread_name(self.thread_name.clone())
            .enable_time()
            .build()
            .map_err(|e| Error::internal(format!("failed to build dispatcher runtime: {}", e)))?;
        let handle = rt.handle().clone();
        *runtime = Some(rt);

        debug!(
            worker_threads = self.worker_threads_count,
            "Dispatcher runtime started"
        );
        Ok(handle)
    }

    /// Stop the runtime without waiting for running tasks
    pub fn shutdown(&self) {
        if let Some(rt) = self.runtime.lock().take() {
            rt.shutdown_background();
            debug!("Dispatcher runtime stopped");
        }
    }
}

impl Dispatcher for TokioDispatcher {
    fn name(&self) -> &'static str {
        "tokio"
    }

    fn attach(&self, cell: &Arc<ActorCell>) -> Result<()> {
        let handle = self.handle()?;
        let mut slots = self.slots.lock();
        if slots.contains_key(cell.id()) {
            return Err(Error::ActorAlreadyExists {
                id: cell.id().to_string(),
            });
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let (gate, mut gate_rx) = watch::channel(true);
        let task_cell = Arc::clone(cell);

        handle.spawn(async move {
            while let Some(envelope) = rx.recv().await {
                while !*gate_rx.borrow_and_update() {
                    if gate_rx.changed().await.is_err() {
                        task_cell.dead_letter(envelope);
                        return;
                    }
                }
                if let Err(e) = task_cell.invoke(envelope) {
                    warn!(actor_id = %task_cell.id(), error = %e, "Invocation reported an error");
                }
            }
        });

        slots.insert(cell.id().clone(), TokioSlot { tx, gate });
        debug!(actor_id = %cell.id(), "Attached to tokio dispatcher");
        Ok(())
    }

    fn detach(&self, id: &ActorId) -> Vec<Envelope> {
        // Dropping the sender ends the task once the channel is empty;
        // anything still queued reaches the terminated cell as a dead letter.
        self.slots.lock().remove(id);
        Vec::new()
    }

    fn dispatch(&self, cell: &Arc<ActorCell>, envelope: Envelope) -> Result<()> {
        let sent = match self.slots.lock().get(cell.id()) {
            Some(slot) => slot.tx.send(envelope).map_err(|e| e.0),
            None => Err(envelope),
        };
        if let Err(envelope) = sent {
            cell.dead_letter(envelope);
        }
        Ok(())
    }

    fn suspend(&self, cell: &ActorCell) {
        if let Some(slot) = self.slots.lock().get(cell.id()) {
            slot.gate.send_replace(false);
        }
    }

    fn resume(&self, cell: &Arc<ActorCell>) -> Result<()> {
        if let Some(slot) = self.slots.lock().get(cell.id()) {
            slot.gate.send_replace(true);
        }
        Ok(())
    }

    fn execute(&self, task: Task) {
        match self.handle() {
            Ok(handle) => {
                handle.spawn_blocking(task);
            }
            Err(e) => error!(error = %e, "Cannot execute task"),
        }
    }

    fn schedule_once(&self, delay: Duration, task: Task) {
        match self.handle() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    task();
                });
            }
            Err(e) => error!(error = %e, "Cannot schedule task"),
        }
    }
}

impl Drop for TokioDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
