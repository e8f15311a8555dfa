use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::constants::{RR30_QUANTUM, RR_QUANTUM};

/// Where a PCB lands when it enters the ready queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Tail,
    /// After the last PCB whose score is <= the new one
    Priority,
    Head,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    Fcfs,
    Sjf,
    RoundRobin,
    RoundRobin30,
    Aging,
    /// Sentinel for the shell's own pending input; never a scheduling
    /// discipline of its own
    Background,
}

impl Policy {
    /// Insertion rule for a freshly loaded PCB
    pub fn insertion(self) -> Insertion {
        match self {
            Policy::Fcfs | Policy::RoundRobin | Policy::RoundRobin30 => Insertion::Tail,
            Policy::Sjf | Policy::Aging => Insertion::Priority,
            Policy::Background => Insertion::Head,
        }
    }

    /// Insertion rule for a PCB coming back from a page fault
    pub fn fault_insertion(self) -> Insertion {
        match self {
            Policy::Sjf | Policy::Aging => Insertion::Priority,
            _ => Insertion::Tail,
        }
    }

    /// Lines a PCB may run per turn, `None` for run-to-completion. Aging
    /// re-decides after every line instead of using a quantum.
    pub fn quantum(self) -> Option<usize> {
        match self {
            Policy::RoundRobin => Some(RR_QUANTUM),
            Policy::RoundRobin30 => Some(RR30_QUANTUM),
            Policy::Fcfs | Policy::Sjf | Policy::Aging | Policy::Background => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Policy::Fcfs => "FCFS",
            Policy::Sjf => "SJF",
            Policy::RoundRobin => "RR",
            Policy::RoundRobin30 => "RR30",
            Policy::Aging => "AGING",
            Policy::Background => "NONE",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The name is not one of FCFS, SJF, RR, RR30, AGING
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown policy: {0}")]
pub struct UnknownPolicy(pub String);

impl FromStr for Policy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FCFS" => Ok(Policy::Fcfs),
            "SJF" => Ok(Policy::Sjf),
            "RR" => Ok(Policy::RoundRobin),
            "RR30" => Ok(Policy::RoundRobin30),
            "AGING" => Ok(Policy::Aging),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}
