use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kernel-wide counters, bumped from whichever thread is running
#[derive(Default)]
pub struct KernelStats {
    page_faults: AtomicU64,
    evictions: AtomicU64,
    prefaults: AtomicU64,
    completed: AtomicU64,
    lines_executed: AtomicU64,
}

impl KernelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fault(&self, evicted: bool) {
        self.page_faults.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_prefault(&self, evicted: bool) {
        self.prefaults.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line(&self) {
        self.lines_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            page_faults: self.page_faults.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            prefaults: self.prefaults.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            lines_executed: self.lines_executed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub page_faults: u64,
    pub evictions: u64,
    pub prefaults: u64,
    pub completed: u64,
    pub lines_executed: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Summary ===")?;
        writeln!(f, "| {:<20} | {:<20} |", "Metric", "Value")?;
        writeln!(f, "| {:-<20} | {:-<20} |", "-", "-")?;
        let rows: [(&str, u64); 5] = [
            ("Lines executed", self.lines_executed),
            ("Processes finished", self.completed),
            ("Pages preloaded", self.prefaults),
            ("Page faults", self.page_faults),
            ("Evictions", self.evictions),
        ];
        for (label, value) in rows {
            writeln!(f, "| {:<20} | {:<20} |", label, value)?;
        }
        Ok(())
    }
}
