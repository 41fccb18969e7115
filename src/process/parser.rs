//! `/proc/[pid]/stat` line parser.
//!
//! The name field is delimited by parentheses but may itself contain them
//! (`irq/306-(null)`), so it is taken as everything between the first `(` and
//! the last `)`. Input read through `cat /proc/<pid>/cmdline /proc/<pid>/stat`
//! arrives with the NUL-separated command line in front of the record; only
//! the text after the last NUL is considered.

use crate::error::{AdbError, Result};
use crate::process::{AndroidProcess, AndroidProcessState};
use std::str::SplitWhitespace;

fn format_error(record: &str, reason: impl std::fmt::Display) -> AdbError {
    AdbError::Format(format!("{} in process record {:?}", reason, record))
}

/// Drop any NUL-separated preamble and surrounding padding.
fn strip_preamble(text: &str) -> &str {
    let text = text.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    match text.rfind('\0') {
        Some(i) => &text[i + 1..],
        None => text,
    }
}

/// Byte offsets of the first `(` and the last `)`.
fn comm_bounds(record: &str) -> Option<(usize, usize)> {
    let bytes = record.as_bytes();
    let open = bytes.iter().position(|&b| b == b'(')?;
    let close = bytes.iter().rposition(|&b| b == b')')?;
    if close > open {
        Some((open, close))
    } else {
        None
    }
}

fn parse_signed(token: &str) -> i64 {
    if token == "-" {
        return 0;
    }
    token
        .parse::<i64>()
        .or_else(|_| token.parse::<u64>().map(|v| v as i64))
        .unwrap_or(0)
}

fn parse_unsigned(token: &str) -> u64 {
    if token == "-" {
        return 0;
    }
    // Some kernels print unsigned fields with %ld, so -1 means u64::MAX
    token
        .parse::<u64>()
        .or_else(|_| token.parse::<i64>().map(|v| v as u64))
        .unwrap_or(0)
}

/// Whitespace-separated fields after the name.
struct Fields<'a> {
    tokens: SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            tokens: text.split_whitespace(),
        }
    }

    fn token(&mut self) -> Option<&'a str> {
        self.tokens.next()
    }

    fn signed(&mut self) -> Option<i64> {
        self.token().map(parse_signed)
    }

    fn unsigned(&mut self) -> Option<u64> {
        self.token().map(parse_unsigned)
    }

    /// Out-of-range values read as zero, like unparsable ones.
    fn signed32(&mut self) -> Option<i32> {
        self.signed().map(|v| i32::try_from(v).unwrap_or(0))
    }

    fn unsigned32(&mut self) -> Option<u32> {
        self.unsigned().map(|v| u32::try_from(v).unwrap_or(0))
    }
}

/// Fill everything after ppid, in kernel order. Stops at the first missing
/// field; later fields keep their zero value.
fn fill_positional(p: &mut AndroidProcess, f: &mut Fields<'_>) -> Option<()> {
    p.pgrp = f.signed32()?;
    p.session = f.signed32()?;
    p.tty_nr = f.signed32()?;
    p.tpgid = f.signed32()?;
    p.flags = f.unsigned()?;
    p.minflt = f.unsigned()?;
    p.cminflt = f.unsigned()?;
    p.majflt = f.unsigned()?;
    p.cmajflt = f.unsigned()?;
    p.utime = f.unsigned()?;
    p.stime = f.unsigned()?;
    p.cutime = f.signed()?;
    p.cstime = f.signed()?;
    p.priority = f.signed()?;
    p.nice = f.signed()?;
    p.num_threads = f.signed()?;
    p.itrealvalue = f.signed()?;
    p.starttime = f.unsigned()?;
    p.vsize = f.unsigned()?;
    p.rss = f.signed()?;
    p.rsslim = f.unsigned()?;
    p.startcode = f.unsigned()?;
    p.endcode = f.unsigned()?;
    p.startstack = f.unsigned()?;
    p.kstkesp = f.unsigned()?;
    p.kstkeip = f.unsigned()?;
    p.signal = f.unsigned()?;
    p.blocked = f.unsigned()?;
    p.sigignore = f.unsigned()?;
    p.sigcatch = f.unsigned()?;
    p.wchan = f.unsigned()?;
    p.nswap = f.unsigned()?;
    p.cnswap = f.unsigned()?;
    p.exit_signal = f.signed32()?;
    p.processor = f.signed32()?;
    p.rt_priority = f.unsigned32()?;
    p.policy = f.unsigned32()?;
    p.delayacct_blkio_ticks = f.unsigned()?;
    p.guest_time = f.unsigned()?;
    p.cguest_time = f.signed()?;
    p.start_data = f.unsigned()?;
    p.end_data = f.unsigned()?;
    p.start_brk = f.unsigned()?;
    p.arg_start = f.unsigned()?;
    p.arg_end = f.unsigned()?;
    p.env_start = f.unsigned()?;
    p.env_end = f.unsigned()?;
    p.exit_code = f.signed32()?;
    Some(())
}

/// Parse one record, failing when pid, name, state or ppid are unusable.
pub fn parse_strict(text: &str) -> Result<AndroidProcess> {
    let record = strip_preamble(text);

    let (open, close) = comm_bounds(record)
        .ok_or_else(|| format_error(record, "no parenthesised process name"))?;

    let pid_text = record[..open].trim();
    let pid = pid_text
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| format_error(record, format_args!("invalid pid {:?}", pid_text)))?;
    let name = record[open + 1..close].to_string();

    let mut fields = Fields::new(&record[close + 1..]);

    let state_text = fields
        .token()
        .ok_or_else(|| format_error(record, "missing state"))?;
    let mut chars = state_text.chars();
    let state = match (chars.next(), chars.next()) {
        (Some(c), None) => AndroidProcessState::from_char(c),
        _ => {
            return Err(format_error(
                record,
                format_args!("invalid state {:?}", state_text),
            ))
        }
    };

    let ppid_text = fields
        .token()
        .ok_or_else(|| format_error(record, "missing parent pid"))?;
    let ppid = if ppid_text == "-" {
        0
    } else {
        ppid_text
            .parse::<i32>()
            .map_err(|_| format_error(record, format_args!("invalid parent pid {:?}", ppid_text)))?
    };

    let mut process = AndroidProcess {
        pid,
        name,
        state,
        ppid,
        ..Default::default()
    };
    // Short records are fine: missing trailing fields stay zero
    let _ = fill_positional(&mut process, &mut fields);

    Ok(process)
}

/// Parse one record, yielding `None` instead of an error.
pub fn parse(text: &str) -> Option<AndroidProcess> {
    parse_strict(text).ok()
}

/// Parse raw bytes; invalid UTF-8 sequences are replaced.
pub fn parse_bytes(bytes: &[u8]) -> Option<AndroidProcess> {
    parse(&String::from_utf8_lossy(bytes))
}

/// Parse many records, skipping the ones that do not parse.
pub fn parse_batch<'a, I>(records: I) -> Vec<AndroidProcess>
where
    I: IntoIterator<Item = &'a str>,
{
    records
        .into_iter()
        .filter(|record| !strip_preamble(record).trim().is_empty())
        .filter_map(|record| match parse_strict(record) {
            Ok(process) => Some(process),
            Err(e) => {
                tracing::debug!(error = %e, "skipping process record");
                None
            }
        })
        .collect()
}
