//! Kernel process records (`/proc/[pid]/stat`).
//!
//! A record is one line of the form `pid (comm) state field field ...`.
//! [`AndroidProcess`] holds every positional field the kernel prints; see
//! `proc(5)` for their meaning.

pub mod parser;

pub use parser::{parse_batch, parse_bytes, parse_strict};

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::AdbError;

/// Scheduling state, the single character after the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "char")]
pub enum AndroidProcessState {
    /// R
    #[default]
    Running,
    /// S, interruptible sleep
    Sleeping,
    /// D, uninterruptible disk wait
    DiskWait,
    /// Z
    Zombie,
    /// T, stopped on a signal
    Stopped,
    /// t
    TracingStop,
    /// X and x
    Dead,
    /// K
    WakeKill,
    /// W, waking (2.6.33-3.13) or paging (before 2.6)
    Waking,
    /// P
    Parked,
    /// I
    Idle,
    /// Anything a vendor kernel invents
    Other(char),
}

impl AndroidProcessState {
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => Self::Running,
            'S' => Self::Sleeping,
            'D' => Self::DiskWait,
            'Z' => Self::Zombie,
            'T' => Self::Stopped,
            't' => Self::TracingStop,
            'X' | 'x' => Self::Dead,
            'K' => Self::WakeKill,
            'W' => Self::Waking,
            'P' => Self::Parked,
            'I' => Self::Idle,
            other => Self::Other(other),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Running => 'R',
            Self::Sleeping => 'S',
            Self::DiskWait => 'D',
            Self::Zombie => 'Z',
            Self::Stopped => 'T',
            Self::TracingStop => 't',
            Self::Dead => 'X',
            Self::WakeKill => 'K',
            Self::Waking => 'W',
            Self::Parked => 'P',
            Self::Idle => 'I',
            Self::Other(c) => c,
        }
    }
}

impl From<AndroidProcessState> for char {
    fn from(state: AndroidProcessState) -> char {
        state.as_char()
    }
}

impl fmt::Display for AndroidProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One parsed `/proc/[pid]/stat` record.
///
/// Fields after `ppid` are filled positionally; a record cut short leaves the
/// remaining fields at zero, and a `-` token also reads as zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AndroidProcess {
    pub pid: i32,
    /// The comm field, verbatim. May contain spaces and parentheses.
    pub name: String,
    pub state: AndroidProcessState,
    pub ppid: i32,
    pub pgrp: i32,
    pub session: i32,
    pub tty_nr: i32,
    pub tpgid: i32,
    pub flags: u64,
    pub minflt: u64,
    pub cminflt: u64,
    pub majflt: u64,
    pub cmajflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub cutime: i64,
    pub cstime: i64,
    pub priority: i64,
    pub nice: i64,
    pub num_threads: i64,
    pub itrealvalue: i64,
    pub starttime: u64,
    /// Virtual memory size in bytes
    pub vsize: u64,
    /// Resident set size in pages. Signed: old kernels print negatives.
    pub rss: i64,
    pub rsslim: u64,
    pub startcode: u64,
    pub endcode: u64,
    pub startstack: u64,
    pub kstkesp: u64,
    pub kstkeip: u64,
    pub signal: u64,
    pub blocked: u64,
    pub sigignore: u64,
    pub sigcatch: u64,
    /// Wait channel; `u64::MAX` (or `u32::MAX` on 32-bit kernels) when not
    /// waiting
    pub wchan: u64,
    pub nswap: u64,
    pub cnswap: u64,
    pub exit_signal: i32,
    pub processor: i32,
    pub rt_priority: u32,
    pub policy: u32,
    pub delayacct_blkio_ticks: u64,
    pub guest_time: u64,
    pub cguest_time: i64,
    pub start_data: u64,
    pub end_data: u64,
    pub start_brk: u64,
    pub arg_start: u64,
    pub arg_end: u64,
    pub env_start: u64,
    pub env_end: u64,
    pub exit_code: i32,
}

impl AndroidProcess {
    /// Parse a record, returning `None` for anything unparsable.
    pub fn parse(text: &str) -> Option<Self> {
        parser::parse(text)
    }

    /// Parse a record, failing with [`AdbError::Format`] when the pid, name,
    /// state or parent pid cannot be extracted.
    pub fn parse_strict(text: &str) -> Result<Self, AdbError> {
        parser::parse_strict(text)
    }

    /// Parse raw bytes as read from the device; invalid UTF-8 is replaced.
    pub fn parse_bytes(bytes: &[u8]) -> Option<Self> {
        parser::parse_bytes(bytes)
    }

    pub fn is_kernel_thread(&self) -> bool {
        // kthreadd is pid 2; its children have no user address space
        self.pid == 2 || self.ppid == 2
    }
}

impl FromStr for AndroidProcess {
    type Err = AdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_strict(s)
    }
}

impl fmt::Display for AndroidProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {} {}", self.pid, self.name, self.state, self.ppid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_chars() {
        for c in ['R', 'S', 'D', 'Z', 'T', 't', 'X', 'K', 'W', 'P', 'I'] {
            assert_eq!(AndroidProcessState::from_char(c).as_char(), c);
        }
        assert_eq!(AndroidProcessState::from_char('x'), AndroidProcessState::Dead);
        assert_eq!(
            AndroidProcessState::from_char('?'),
            AndroidProcessState::Other('?')
        );
    }

    #[test]
    fn test_from_str() {
        let process: AndroidProcess = "42 (sh) R 1".parse().unwrap();
        assert_eq!(process.pid, 42);
        assert_eq!(process.state, AndroidProcessState::Running);
        assert_eq!(process.to_string(), "42 (sh) R 1");
        assert!("not a record".parse::<AndroidProcess>().is_err());
    }

    #[test]
    fn test_serialize_state_as_char() {
        let process = AndroidProcess::parse("7 (kworker/0:1) I 2").unwrap();
        let json = serde_json::to_value(&process).unwrap();
        assert_eq!(json["state"], "I");
        assert_eq!(json["name"], "kworker/0:1");
        assert!(process.is_kernel_thread());
    }
}
