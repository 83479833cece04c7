//! Worker pool
//!
//! A fixed set of threads pulling tasks from a FIFO channel. Shutdown
//! flips a flag and closes the channel: queued-but-unstarted tasks are
//! drained in abort mode (their queries combine to the aborted result),
//! in-flight tasks finish, then the threads are joined.

use super::task::Task;
use crossbeam_channel::{unbounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) struct WorkerPool {
    sender: Sender<Task>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads draining the task queue
    pub(crate) fn start(workers: usize) -> Self {
        let (sender, receiver) = unbounded::<Task>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handles = (0..workers)
            .map(|id| {
                let receiver = receiver.clone();
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || {
                    log::debug!("worker {} started", id);
                    while let Ok(task) = receiver.recv() {
                        if shutdown.load(Ordering::Acquire) {
                            task.abort();
                        } else {
                            task.run();
                        }
                    }
                    log::debug!("worker {} exiting", id);
                })
            })
            .collect();
        Self {
            sender,
            shutdown,
            handles,
        }
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Enqueue a task; hands it back if the pool is already stopped
    pub(crate) fn submit(&self, task: Task) -> std::result::Result<(), Task> {
        self.sender.send(task).map_err(|err| err.into_inner())
    }

    /// Drain queued tasks in abort mode, let in-flight tasks finish,
    /// then join all workers.
    pub(crate) fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
        drop(self.sender);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_stop() {
        let pool = WorkerPool::start(3);
        assert_eq!(pool.worker_count(), 3);
        pool.stop();
    }
}
