use std::fmt;

use crate::registry::ScriptId;

/// Process identifier, unique for the lifetime of a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process control block
///
/// A PCB is moved into the ready queue while waiting and out of it while
/// running, so its own fields never need a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcb {
    pub pid: Pid,
    pub script: ScriptId,
    /// Total instruction lines of the script
    pub length: usize,
    /// Scheduling priority; starts at `length`, lowered by aging
    pub score: usize,
    /// Next virtual instruction to execute
    pub ip: usize,
}

impl Pcb {
    pub fn new(pid: Pid, script: ScriptId, length: usize) -> Self {
        Pcb {
            pid,
            script,
            length,
            score: length,
            ip: 0,
        }
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.ip >= self.length
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.length.saturating_sub(self.ip)
    }

    /// Lower the score by one, never below zero
    #[inline]
    pub fn age(&mut self) {
        self.score = self.score.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::io::ScriptSource;
    use crate::registry::ScriptMeta;

    fn pcb(length: usize) -> Pcb {
        let mut scripts = Arena::new();
        let id = scripts.insert(ScriptMeta::new(ScriptSource::inline("p", Vec::new()), length, 3));
        Pcb::new(Pid(1), id, length)
    }

    #[test]
    fn test_new_pcb_starts_at_zero() {
        let p = pcb(5);
        assert_eq!(p.ip, 0);
        assert_eq!(p.score, 5);
        assert_eq!(p.remaining(), 5);
        assert!(!p.is_finished());
    }

    #[test]
    fn test_empty_script_is_finished() {
        assert!(pcb(0).is_finished());
    }

    #[test]
    fn test_age_floors_at_zero() {
        let mut p = pcb(1);
        p.age();
        p.age();
        assert_eq!(p.score, 0);
    }
}
