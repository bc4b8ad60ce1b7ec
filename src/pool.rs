//! Fixed-size pool of background threads for decode and resample work.
//!
//! Each worker owns a channel. Submission prefers an idle worker with an
//! empty queue and otherwise falls back to round-robin. Results travel back
//! on a per-task oneshot channel tagged with the task id, so callers can
//! await them directly from async code. A pool of size zero runs every task
//! on the submitting thread.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run { id: u64, task: Task },
    Shutdown,
}

struct Worker {
    sender: Sender<Message>,
    busy: Arc<AtomicBool>,
}

/// Number of workers used when none is configured.
#[must_use]
pub fn default_pool_size() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

pub struct WorkerPool {
    workers: Vec<Worker>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
    next_id: AtomicU64,
    closed: AtomicBool,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

fn worker_loop(index: usize, receiver: Receiver<Message>, busy: Arc<AtomicBool>) {
    for message in receiver {
        match message {
            Message::Run { id, task } => {
                busy.store(true, Ordering::Release);
                task();
                busy.store(false, Ordering::Release);
                debug!(worker = index, task = id, "task finished");
            }
            Message::Shutdown => break,
        }
    }
}

impl WorkerPool {
    /// Start `size` worker threads. Zero runs tasks synchronously.
    pub fn new(size: usize) -> Result<Self> {
        let mut workers = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let (sender, receiver) = unbounded();
            let busy = Arc::new(AtomicBool::new(false));
            let worker_busy = Arc::clone(&busy);
            let handle = thread::Builder::new()
                .name(format!("cog-imagery-worker-{index}"))
                .spawn(move || worker_loop(index, receiver, worker_busy))
                .map_err(|e| Error::Worker(format!("failed to spawn worker {index}: {e}")))?;
            workers.push(Worker { sender, busy });
            handles.push(handle);
        }
        debug!(size, "started worker pool");
        Ok(Self {
            workers,
            handles: Mutex::new(handles),
            next_worker: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn pick_worker(&self) -> usize {
        let n = self.workers.len();
        let start = self.next_worker.fetch_add(1, Ordering::Relaxed) % n;
        (0..n)
            .map(|offset| (start + offset) % n)
            .find(|&i| !self.workers[i].busy.load(Ordering::Acquire) && self.workers[i].sender.is_empty())
            .unwrap_or(start)
    }

    /// Queue `task` and return the receiver of its result.
    ///
    /// A panicking task resolves to [`Error::Worker`]; the pool stays usable.
    pub fn submit<T, F>(&self, task: F) -> Result<oneshot::Receiver<Result<T>>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::Destroyed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, receiver) = oneshot::channel();
        let job: Task = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(task)).map_err(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(task = id, %message, "worker task panicked");
                Error::Worker(message)
            });
            // the requester may have gone away
            let _ = reply.send(result);
        });

        if self.workers.is_empty() {
            job();
            return Ok(receiver);
        }
        let worker = self.pick_worker();
        self.workers[worker]
            .sender
            .send(Message::Run { id, task: job })
            .map_err(|_| Error::Worker(format!("worker {worker} is gone")))?;
        Ok(receiver)
    }

    /// Run `task` on the pool and wait for its result.
    pub async fn run<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let receiver = self.submit(task)?;
        receiver
            .await
            .map_err(|_| Error::Worker("worker dropped the task".into()))?
    }

    /// Stop accepting tasks, let queued tasks finish and join every worker.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for worker in &self.workers {
            let _ = worker.sender.send(Message::Shutdown);
        }
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        let current = thread::current().id();
        for handle in handles {
            // a task dropping the last pool reference runs on a worker thread
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread exited with a panic");
            }
        }
        debug!(size = self.workers.len(), "worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
