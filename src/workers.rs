//! Fixed pool of scheduler worker threads
//!
//! Each worker owns an inbox; every dispatch round sends the same job to all
//! of them and collects one report per worker on a shared channel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, trace, warn};
use parking_lot::Mutex;

use crate::error::{KernelError, Result};
use crate::scheduler::Flow;

/// One scheduling pass, run once by every worker
pub type Job = Arc<dyn Fn() -> Flow + Send + Sync>;

enum WorkerMessage {
    Run { round: u64, job: Job },
    Shutdown,
}

struct WorkerReport {
    worker: usize,
    round: u64,
    flow: Flow,
}

struct WorkerHandle {
    id: usize,
    inbox: Sender<WorkerMessage>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
struct PoolState {
    workers: Vec<WorkerHandle>,
    reports: Option<(Sender<WorkerReport>, Receiver<WorkerReport>)>,
    round: u64,
}

pub struct WorkerPool {
    size: usize,
    state: Mutex<PoolState>,
    thread_ids: Mutex<Vec<ThreadId>>,
}

impl WorkerPool {
    /// Create a pool of `size` workers. Threads start on the first dispatch.
    pub fn new(size: usize) -> Self {
        WorkerPool {
            size,
            state: Mutex::new(PoolState::default()),
            thread_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn is_started(&self) -> bool {
        !self.state.lock().workers.is_empty()
    }

    /// True when called from one of this pool's worker threads
    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.thread_ids.lock().contains(&current)
    }

    fn ensure_started(&self, state: &mut PoolState) -> Result<()> {
        if !state.workers.is_empty() {
            return Ok(());
        }
        let (report_tx, report_rx) = channel::unbounded();
        for id in 0..self.size {
            let (inbox_tx, inbox_rx) = channel::unbounded();
            let reports = report_tx.clone();
            let thread = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, inbox_rx, reports))
                .map_err(KernelError::WorkerSpawn)?;
            self.thread_ids.lock().push(thread.thread().id());
            state.workers.push(WorkerHandle {
                id,
                inbox: inbox_tx,
                thread,
            });
        }
        state.reports = Some((report_tx, report_rx));
        debug!("started {} workers", self.size);
        Ok(())
    }

    /// Run `job` on every worker and block until each has reported back, or
    /// until one of them reports a quit request
    pub fn dispatch(&self, job: Job) -> Result<Flow> {
        let mut state = self.state.lock();
        self.ensure_started(&mut state)?;
        state.round += 1;
        let round = state.round;

        let mut pending = 0;
        for worker in &state.workers {
            let message = WorkerMessage::Run {
                round,
                job: Arc::clone(&job),
            };
            match worker.inbox.send(message) {
                Ok(()) => pending += 1,
                Err(_) => warn!("worker {} is gone; skipping it", worker.id),
            }
        }
        drop(job);
        trace!("round {} dispatched to {} workers", round, pending);

        let reports = match &state.reports {
            Some((_, rx)) => rx.clone(),
            None => return Ok(Flow::Continue),
        };
        let mut flow = Flow::Continue;
        while pending > 0 {
            let report = match reports.recv() {
                Ok(report) => report,
                Err(_) => break,
            };
            if report.round != round {
                continue;
            }
            pending -= 1;
            trace!("worker {} finished round {}", report.worker, round);
            if report.flow == Flow::Quit {
                flow = Flow::Quit;
                break;
            }
        }
        Ok(flow)
    }

    /// Stop and join every worker. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        let workers = std::mem::take(&mut state.workers);
        state.reports = None;
        drop(state);

        for worker in &workers {
            let _ = worker.inbox.send(WorkerMessage::Shutdown);
        }
        for worker in workers {
            if worker.thread.join().is_err() {
                error!("worker {} panicked", worker.id);
            }
        }
        self.thread_ids.lock().clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // A worker cannot join itself; the others exit once their inbox closes
        if self.is_worker_thread() {
            for worker in &self.state.lock().workers {
                let _ = worker.inbox.send(WorkerMessage::Shutdown);
            }
            return;
        }
        self.shutdown();
    }
}

fn worker_loop(id: usize, inbox: Receiver<WorkerMessage>, reports: Sender<WorkerReport>) {
    debug!("worker {} started", id);
    for message in inbox.iter() {
        match message {
            WorkerMessage::Run { round, job } => {
                let flow = match panic::catch_unwind(AssertUnwindSafe(|| job())) {
                    Ok(flow) => flow,
                    Err(_) => {
                        error!("worker {} panicked during round {}", id, round);
                        Flow::Continue
                    }
                };
                drop(job);
                let report = WorkerReport {
                    worker: id,
                    round,
                    flow,
                };
                if reports.send(report).is_err() {
                    break;
                }
            }
            WorkerMessage::Shutdown => break,
        }
    }
    debug!("worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_pool_starts_lazily() {
        let pool = WorkerPool::new(2);
        assert!(!pool.is_started());
        assert!(!pool.is_worker_thread());
        pool.dispatch(Arc::new(|| Flow::Continue)).unwrap();
        assert!(pool.is_started());
        pool.shutdown();
        assert!(!pool.is_started());
    }

    #[test]
    fn test_every_worker_runs_the_job_once() {
        let pool = WorkerPool::new(3);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let flow = pool
            .dispatch(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Flow::Continue
            }))
            .unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        // Second round reuses the same threads
        pool.dispatch(Arc::new(|| Flow::Continue)).unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_jobs_run_on_worker_threads() {
        let pool = Arc::new(WorkerPool::new(2));
        let seen = Arc::new(AtomicUsize::new(0));
        let (p, s) = (Arc::clone(&pool), Arc::clone(&seen));
        pool.dispatch(Arc::new(move || {
            if p.is_worker_thread() {
                s.fetch_add(1, Ordering::SeqCst);
            }
            Flow::Continue
        }))
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        pool.shutdown();
    }

    #[test]
    fn test_quit_report_ends_dispatch() {
        let pool = WorkerPool::new(2);
        let flow = pool.dispatch(Arc::new(|| Flow::Quit)).unwrap();
        assert_eq!(flow, Flow::Quit);
        pool.shutdown();
        pool.shutdown();
    }

    #[test]
    fn test_panicking_job_still_reports() {
        let pool = WorkerPool::new(1);
        let flow = pool.dispatch(Arc::new(|| -> Flow { panic!("boom") })).unwrap();
        assert_eq!(flow, Flow::Continue);
        pool.shutdown();
    }
}
