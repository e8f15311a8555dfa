//! Scheduler core
//!
//! `Kernel` is the explicit context shared by the shell and the worker pool:
//! the ready queue, the paged memory and the pool each sit behind their own
//! lock, and no code path holds two of them at once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, info, trace};
use parking_lot::Mutex;

use crate::config::KernelConfig;
use crate::console::Console;
use crate::constants::BACKGROUND_SCRIPT_NAME;
use crate::error::{KernelError, Result};
use crate::io::{ScriptSource, page_of, read_script};
use crate::policy::{Insertion, Policy};
use crate::process::{Pcb, Pid};
use crate::queue::ReadyQueue;
use crate::stats::KernelStats;
use crate::translation::TranslationResult;
use crate::vm_manager::{FaultReport, VmManager};
use crate::workers::{Job, WorkerPool};

/// Whether the shell should keep going after a line or a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Executes one instruction line on behalf of a running process
pub trait LineHandler: Send + Sync {
    fn execute_line(&self, line: &str) -> Flow;
}

impl<F> LineHandler for F
where
    F: Fn(&str) -> Flow + Send + Sync,
{
    fn execute_line(&self, line: &str) -> Flow {
        self(line)
    }
}

/// Outcome of executing a single instruction
enum Step {
    Ran(Flow),
    Faulted,
    Aborted,
}

pub struct Kernel {
    config: KernelConfig,
    queue: Mutex<ReadyQueue>,
    vm: Mutex<VmManager>,
    pool: WorkerPool,
    console: Console,
    stats: KernelStats,
    next_pid: AtomicU64,
}

impl Kernel {
    pub fn new(config: KernelConfig, console: Console) -> Result<Self> {
        config.validate()?;
        debug!(
            "kernel: {} frames of {} lines, {} workers, {:?} scripts",
            config.frame_count(),
            config.page_size,
            config.workers,
            config.sharing
        );
        Ok(Kernel {
            vm: Mutex::new(VmManager::new(&config)),
            queue: Mutex::new(ReadyQueue::new()),
            pool: WorkerPool::new(config.workers),
            console,
            stats: KernelStats::new(),
            next_pid: AtomicU64::new(1),
            config,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn stats(&self) -> &KernelStats {
        &self.stats
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run `f` with the memory manager locked
    pub fn with_vm<R>(&self, f: impl FnOnce(&VmManager) -> R) -> R {
        f(&self.vm.lock())
    }

    /// True on one of this kernel's worker threads
    pub fn on_worker(&self) -> bool {
        self.pool.is_worker_thread()
    }

    fn next_pid(&self) -> Pid {
        Pid(self.next_pid.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Loading
    // =========================================================================

    pub fn load_script<P: AsRef<Path>>(&self, path: P, policy: Policy) -> Result<Pid> {
        self.load_batch(&[path], policy)?
            .into_iter()
            .next()
            .ok_or(KernelError::EmptyBatch)
    }

    /// Load every script in `paths` and enqueue one process per script.
    ///
    /// All files are read before anything is installed, so a missing script
    /// leaves memory and the ready queue untouched.
    pub fn load_batch<P: AsRef<Path>>(&self, paths: &[P], policy: Policy) -> Result<Vec<Pid>> {
        if paths.is_empty() {
            return Err(KernelError::EmptyBatch);
        }
        let mut seen = HashSet::new();
        for path in paths {
            let path = path.as_ref();
            if !seen.insert(path) {
                return Err(KernelError::DuplicateScript(path.display().to_string()));
            }
        }

        let mut contents: Vec<(PathBuf, Vec<String>)> = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            contents.push((path.to_path_buf(), read_script(path)?));
        }

        let pcbs = contents
            .into_iter()
            .map(|(path, lines)| self.install(ScriptSource::File(path), lines))
            .collect::<Result<Vec<Pcb>>>()?;
        Ok(self.enqueue(pcbs, policy.insertion()))
    }

    /// Load lines held in memory as a process of their own
    pub fn load_inline(&self, name: &str, lines: Vec<String>, policy: Policy) -> Result<Pid> {
        let pcb = self.install(ScriptSource::inline(name, lines.clone()), lines)?;
        let pid = pcb.pid;
        self.queue.lock().push(pcb, policy.insertion());
        Ok(pid)
    }

    /// Register (or reuse) a script, preload its first pages and build a PCB.
    ///
    /// The new process is counted before any page is loaded, so a preload
    /// that has to evict one of the script's own pages never frees it.
    fn install(&self, source: ScriptSource, lines: Vec<String>) -> Result<Pcb> {
        let mut reports = Vec::new();
        let pcb = {
            let mut vm = self.vm.lock();
            let shared = source.path().and_then(|path| vm.find_existing(path));
            let script = match shared {
                Some(script) => {
                    debug!("sharing resident script {}", source);
                    vm.acquire(script);
                    script
                }
                None => {
                    let script = vm.register(source, lines.len());
                    vm.acquire(script);
                    let page_size = vm.page_size();
                    let preload = PreloadPlan::new(
                        lines.len(),
                        page_size,
                        self.config.pages_loaded,
                        vm.store().frame_count(),
                    );
                    for page in 0..preload.pages {
                        let page_lines = page_of(&lines, page, page_size);
                        reports.push(vm.assign_lines(page, script, true, page_lines)?);
                    }
                    script
                }
            };
            let length = vm.script(script).map_or(lines.len(), |meta| meta.total_lines);
            Pcb::new(self.next_pid(), script, length)
        };

        for report in reports {
            self.stats
                .record_prefault(matches!(report, FaultReport::Evicted(_)));
            if let Some(text) = report.diagnostic() {
                self.console.print(&text);
            }
        }
        debug!("pid {} created ({} lines)", pcb.pid, pcb.length);
        Ok(pcb)
    }

    fn enqueue(&self, pcbs: Vec<Pcb>, insertion: Insertion) -> Vec<Pid> {
        let mut queue = self.queue.lock();
        pcbs.into_iter()
            .map(|pcb| {
                let pid = pcb.pid;
                queue.push(pcb, insertion);
                pid
            })
            .collect()
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Drain the ready queue under `policy`.
    ///
    /// With `background` the given lines are queued ahead of everything else
    /// as one more process. With `concurrent` the pass runs on every worker of
    /// the pool at once; a worker asking for a concurrent run just runs inline.
    pub fn run(
        self: &Arc<Self>,
        policy: Policy,
        background: Option<Vec<String>>,
        concurrent: bool,
        handler: Arc<dyn LineHandler>,
    ) -> Result<Flow> {
        if let Some(lines) = background {
            self.load_inline(BACKGROUND_SCRIPT_NAME, lines, Policy::Background)?;
        }
        if concurrent && !self.on_worker() {
            let kernel = Arc::clone(self);
            let job: Job = Arc::new(move || kernel.run_pass(policy, handler.as_ref()));
            return self.pool.dispatch(job);
        }
        Ok(self.run_pass(policy, handler.as_ref()))
    }

    /// Pop and run processes until the queue is empty or one of them quits
    pub fn run_pass(&self, policy: Policy, handler: &dyn LineHandler) -> Flow {
        trace!("{} pass started", policy);
        loop {
            let Some(pcb) = self.queue.lock().pop_head() else {
                trace!("{} pass finished", policy);
                return Flow::Continue;
            };
            let flow = match policy {
                Policy::Aging => self.run_aging(pcb, handler),
                _ => self.run_turn(policy, pcb, handler),
            };
            if flow == Flow::Quit {
                return Flow::Quit;
            }
        }
    }

    /// One turn of FCFS, SJF or round robin
    fn run_turn(&self, policy: Policy, mut pcb: Pcb, handler: &dyn LineHandler) -> Flow {
        let quantum = policy.quantum().unwrap_or(usize::MAX);
        let mut executed = 0;
        while executed < quantum {
            if pcb.is_finished() {
                break;
            }
            match self.step(&mut pcb, handler) {
                Step::Ran(Flow::Continue) => executed += 1,
                Step::Ran(Flow::Quit) => {
                    self.terminate(pcb);
                    return Flow::Quit;
                }
                Step::Faulted => {
                    self.requeue(pcb, policy.fault_insertion());
                    return Flow::Continue;
                }
                Step::Aborted => {
                    self.terminate(pcb);
                    return Flow::Continue;
                }
            }
        }
        if pcb.is_finished() {
            self.terminate(pcb);
        } else {
            self.requeue(pcb, Insertion::Tail);
        }
        Flow::Continue
    }

    /// Run one process a line at a time, aging everyone still waiting and
    /// handing over to the queue head once it has the lower score
    fn run_aging(&self, mut pcb: Pcb, handler: &dyn LineHandler) -> Flow {
        loop {
            if pcb.is_finished() {
                self.terminate(pcb);
                return Flow::Continue;
            }
            match self.step(&mut pcb, handler) {
                Step::Ran(Flow::Continue) => {}
                Step::Ran(Flow::Quit) => {
                    self.terminate(pcb);
                    return Flow::Quit;
                }
                Step::Faulted => {
                    self.requeue(pcb, Insertion::Priority);
                    return Flow::Continue;
                }
                Step::Aborted => {
                    self.terminate(pcb);
                    return Flow::Continue;
                }
            }

            let mut queue = self.queue.lock();
            queue.age_all();
            if pcb.is_finished() {
                drop(queue);
                self.terminate(pcb);
                return Flow::Continue;
            }
            if queue.head().is_some_and(|head| head.score < pcb.score) {
                trace!("pid {} yields to pid {:?}", pcb.pid, queue.head().map(|h| h.pid));
                queue.push(pcb, Insertion::Priority);
                return Flow::Continue;
            }
        }
    }

    /// Execute the instruction at the PCB's pointer, or service the fault
    fn step(&self, pcb: &mut Pcb, handler: &dyn LineHandler) -> Step {
        let line = {
            let mut vm = self.vm.lock();
            let translated = vm.translate(pcb.ip, pcb.script);
            match translated {
                TranslationResult::Resident(_) => vm.fetch(pcb.ip, pcb.script).unwrap_or_default(),
                TranslationResult::NotResident => {
                    drop(vm);
                    return match self.service_fault(pcb) {
                        Ok(()) => Step::Faulted,
                        Err(err) => {
                            error!("pid {}: {}", pcb.pid, err);
                            self.console.println(&err.to_string());
                            Step::Aborted
                        }
                    };
                }
            }
        };
        pcb.ip += 1;
        self.stats.record_line();
        Step::Ran(handler.execute_line(&line))
    }

    fn service_fault(&self, pcb: &Pcb) -> Result<()> {
        let report = {
            let mut vm = self.vm.lock();
            let page = pcb.ip / vm.page_size();
            vm.assign(page, pcb.script, false)?
        };
        let evicted = matches!(report, FaultReport::Evicted(_));
        debug!(
            "pid {} faulted at line {} (frame {}, evicted: {})",
            pcb.pid,
            pcb.ip,
            report.frame(),
            evicted
        );
        self.stats.record_fault(evicted);
        if let Some(text) = report.diagnostic() {
            self.console.print(&text);
        }
        Ok(())
    }

    fn requeue(&self, pcb: Pcb, insertion: Insertion) {
        trace!("pid {} requeued with {} lines left", pcb.pid, pcb.remaining());
        self.queue.lock().push(pcb, insertion);
    }

    fn terminate(&self, pcb: Pcb) {
        let freed = self.vm.lock().release(pcb.script);
        self.stats.record_completion();
        debug!("pid {} terminated (script freed: {})", pcb.pid, freed);
    }

    /// Stop the worker pool, if it was ever started
    pub fn join_all_threads(&self) {
        if self.pool.is_started() {
            debug!("joining worker threads");
        }
        self.pool.shutdown();
        info!("kernel stopped: {:?}", self.stats.snapshot());
    }

    /// Check memory and queue bookkeeping
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.queue.lock().check_links()?;
        self.vm.lock().check_invariants()
    }
}

/// How many pages a freshly loaded script gets before it first runs.
/// Never more than the store has frames, so a preload cannot push out a
/// page it just loaded.
struct PreloadPlan {
    pages: usize,
}

impl PreloadPlan {
    fn new(total_lines: usize, page_size: usize, pages_loaded: usize, frame_count: usize) -> Self {
        let pages = total_lines
            .div_ceil(page_size)
            .min(pages_loaded)
            .min(frame_count);
        PreloadPlan { pages }
    }
}
