//! Print a process table from `/proc/[pid]/stat` dumps.
//!
//! Typical input comes from something like
//! `adb shell 'for p in /proc/[0-9]*; do cat $p/cmdline $p/stat; done'`.

use adbsync::process::{parse_batch, parse_strict};
use adbsync::AndroidProcess;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "adb-ps")]
#[command(about = "Parse /proc/[pid]/stat dumps into a process table", long_about = None)]
#[command(version)]
struct Cli {
    /// Files holding one stat record per line (reads stdin when empty)
    files: Vec<PathBuf>,

    /// Fail on the first record that does not parse
    #[arg(long)]
    strict: bool,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Hide kernel threads
    #[arg(long)]
    no_kernel: bool,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn read_inputs(files: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    if files.is_empty() {
        let mut buf = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(vec![("<stdin>".to_string(), buf)]);
    }

    files
        .iter()
        .map(|path| {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok((path.display().to_string(), data))
        })
        .collect()
}

fn parse_input(source: &str, data: &[u8], strict: bool) -> Result<Vec<AndroidProcess>> {
    let text = String::from_utf8_lossy(data);
    if !strict {
        return Ok(parse_batch(text.lines()));
    }

    let mut processes = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim_matches(|c: char| c == '\0' || c.is_whitespace()).is_empty() {
            continue;
        }
        let process =
            parse_strict(line).with_context(|| format!("{}:{}", source, index + 1))?;
        processes.push(process);
    }
    Ok(processes)
}

fn print_table(processes: &[AndroidProcess]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{:>7} {:>7} {} {:>10} {:>8} {:>4} NAME",
        "PID", "PPID", "S", "VSZ", "RSS", "THR"
    )?;
    for p in processes {
        writeln!(
            out,
            "{:>7} {:>7} {} {:>10} {:>8} {:>4} {}",
            p.pid,
            p.ppid,
            p.state,
            p.vsize / 1024,
            p.rss,
            p.num_threads,
            p.name
        )?;
    }
    out.flush()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut processes = Vec::new();
    for (source, data) in read_inputs(&cli.files)? {
        let parsed = parse_input(&source, &data, cli.strict)?;
        tracing::debug!(source = %source, records = parsed.len(), "parsed input");
        processes.extend(parsed);
    }

    if cli.no_kernel {
        processes.retain(|p| !p.is_kernel_thread());
    }
    processes.sort_by_key(|p| p.pid);

    if cli.json {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, &processes).context("Failed to write JSON")?;
        writeln!(out)?;
    } else {
        print_table(&processes)?;
    }

    Ok(())
}
