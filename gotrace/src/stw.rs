//! Stop-the-world pause extraction.
//!
//! Walks the raw event stream, reconstructing absolute tick timestamps from
//! the per-batch anchors and pairing `GcStwStart`/`GcStwDone` events into
//! pauses. A final pass rescales ticks to nanoseconds relative to the
//! earliest timestamp in the trace, matching what the runtime's own tooling
//! reports.

use std::io::{self, Read, Write};
use std::fmt;
use std::time::Duration;

use gotrace_format::{DecodeError, Decoder, Event, EventType};
use thiserror::Error;

use crate::tables::write_table;

#[derive(Error, Debug)]
pub enum StwError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("non-positive ticks per second: {0}")]
    BadFrequency(i64),

    #[error("no frequency event in trace")]
    NoFrequency,

    #[error("world stopped twice without starting")]
    UnexpectedStart,

    #[error("world started without being stopped")]
    UnexpectedDone,

    #[error("stop-the-world ended on p {got}, started on p {want}")]
    PMismatch { want: u64, got: u64 },

    #[error("unknown stop-the-world kind {0}")]
    UnknownKind(u64),
}

/// Why the world was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StwKind {
    Unknown,
    MarkTermination,
    SweepTermination,
    WriteHeapDump,
    GoroutineProfile,
    GoroutineProfileCleanup,
    AllGoroutinesStackTrace,
    ReadMemStats,
    AllThreadsSyscall,
    Gomaxprocs,
    StartTrace,
    StopTrace,
    CountPagesInUse,
    ReadMetricsSlow,
    ReadMemStatsSlow,
    PageCachePagesLeaked,
    ResetDebugLog,
}

impl fmt::Display for StwKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StwKind::Unknown => "unknown",
            StwKind::MarkTermination => "mark termination",
            StwKind::SweepTermination => "sweep termination",
            StwKind::WriteHeapDump => "write heap dump",
            StwKind::GoroutineProfile => "goroutine profile",
            StwKind::GoroutineProfileCleanup => "goroutine profile cleanup",
            StwKind::AllGoroutinesStackTrace => "all goroutines stack trace",
            StwKind::ReadMemStats => "read mem stats",
            StwKind::AllThreadsSyscall => "AllThreadsSyscall",
            StwKind::Gomaxprocs => "GOMAXPROCS",
            StwKind::StartTrace => "start trace",
            StwKind::StopTrace => "stop trace",
            StwKind::CountPagesInUse => "CountPagesInUse (test)",
            StwKind::ReadMetricsSlow => "ReadMetricsSlow (test)",
            StwKind::ReadMemStatsSlow => "ReadMemStatsSlow (test)",
            StwKind::PageCachePagesLeaked => "PageCachePagesLeaked (test)",
            StwKind::ResetDebugLog => "ResetDebugLog (test)",
        };
        f.write_str(name)
    }
}

/// Stop-the-world kinds by their 1.21 reason index.
const KINDS_GO_1_21: [StwKind; 17] = [
    StwKind::Unknown,
    StwKind::MarkTermination,
    StwKind::SweepTermination,
    StwKind::WriteHeapDump,
    StwKind::GoroutineProfile,
    StwKind::GoroutineProfileCleanup,
    StwKind::AllGoroutinesStackTrace,
    StwKind::ReadMemStats,
    StwKind::AllThreadsSyscall,
    StwKind::Gomaxprocs,
    StwKind::StartTrace,
    StwKind::StopTrace,
    StwKind::CountPagesInUse,
    StwKind::ReadMetricsSlow,
    StwKind::ReadMemStatsSlow,
    StwKind::PageCachePagesLeaked,
    StwKind::ResetDebugLog,
];

/// One stop-the-world pause. Timestamps are nanoseconds relative to the
/// start of the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StwEvent {
    pub start: i64,
    pub end: i64,
    pub kind: StwKind,
    /// Processor that initiated the pause.
    pub p: u64,
}

impl StwEvent {
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }
}

/// Reads a trace from `r` and returns its stop-the-world pauses in stream
/// order.
pub fn events<R: Read>(r: R) -> Result<Vec<StwEvent>, StwError> {
    let mut dec = Decoder::new(r);
    let mut ev = Event::new();
    let mut events: Vec<StwEvent> = Vec::new();

    let mut ticks_per_sec: i64 = 0;
    let mut last_ts: i64 = 0;
    let mut last_p: u64 = 0;
    // 0 doubles as the "unseen" sentinel; a genuine minimum of zero keeps
    // the same meaning.
    let mut min_ts: i64 = 0;
    let mut world_stopped = false;

    loop {
        match dec.decode(&mut ev) {
            Ok(()) => {}
            Err(e) if e.is_eof() => break,
            Err(e) => return Err(e.into()),
        }

        match ev.typ {
            EventType::Batch => {
                last_p = ev.args.first().copied().unwrap_or(0);
                last_ts = ev.args.get(1).copied().unwrap_or(0) as i64;
            }
            EventType::Frequency => {
                ticks_per_sec = ev.args.first().copied().unwrap_or(0) as i64;
                if ticks_per_sec <= 0 {
                    return Err(StwError::BadFrequency(ticks_per_sec));
                }
            }
            // No timestamp in the first argument of these.
            EventType::TimerGoroutine | EventType::Stack | EventType::String => {}
            _ => {
                last_ts += ev.args.first().copied().unwrap_or(0) as i64;
                if min_ts == 0 || last_ts < min_ts {
                    min_ts = last_ts;
                }
            }
        }

        match ev.typ {
            EventType::GcStwStart => {
                if world_stopped {
                    return Err(StwError::UnexpectedStart);
                }
                let kind_arg = ev.args.get(1).copied().unwrap_or(u64::MAX);
                events.push(StwEvent {
                    start: last_ts,
                    end: 0,
                    kind: resolve_kind(dec.version(), kind_arg)?,
                    p: last_p,
                });
                world_stopped = true;
            }
            EventType::GcStwDone => {
                if !world_stopped {
                    return Err(StwError::UnexpectedDone);
                }
                let cur = events.last_mut().ok_or(StwError::UnexpectedDone)?;
                if cur.p != last_p {
                    return Err(StwError::PMismatch {
                        want: cur.p,
                        got: last_p,
                    });
                }
                cur.end = last_ts;
                world_stopped = false;
            }
            _ => {}
        }
    }

    if ticks_per_sec == 0 {
        return Err(StwError::NoFrequency);
    }

    tracing::debug!(pauses = events.len(), "extracted stop-the-world events");

    // Ticks to nanoseconds, relative to the start of the trace.
    let freq = 1e9 / ticks_per_sec as f64;
    for e in &mut events {
        e.start = ((e.start - min_ts) as f64 * freq) as i64;
        e.end = ((e.end - min_ts) as f64 * freq) as i64;
    }
    Ok(events)
}

/// Maps a `GcStwStart` kind argument to a [`StwKind`]. Before 1.21 the
/// runtime only distinguished mark and sweep termination; 1.21 indexes a
/// richer reason table.
fn resolve_kind(version: u16, value: u64) -> Result<StwKind, StwError> {
    if version < 1021 {
        match value {
            0 => Ok(StwKind::MarkTermination),
            1 => Ok(StwKind::SweepTermination),
            _ => Err(StwError::UnknownKind(value)),
        }
    } else {
        KINDS_GO_1_21
            .get(value as usize)
            .copied()
            .ok_or(StwError::UnknownKind(value))
    }
}

/// Writes the pauses as CSV, sorted by start time ascending, with
/// millisecond start and duration columns.
pub fn write_csv<W: Write>(events: &[StwEvent], w: &mut W) -> io::Result<()> {
    let mut events = events.to_vec();
    events.sort_by_key(|e| e.start);

    writeln!(w, "Start (ms),Duration (ms),Type")?;
    for e in &events {
        writeln!(
            w,
            "{:.6},{:.6},{}",
            e.start as f64 / 1e6,
            e.duration() as f64 / 1e6,
            e.kind
        )?;
    }
    Ok(())
}

/// Writes the pauses as a table sorted by descending duration, with a
/// percentile column.
pub fn write_top<W: Write>(events: &[StwEvent], w: &mut W) -> io::Result<()> {
    let mut events = events.to_vec();
    events.sort_by_key(|e| std::cmp::Reverse(e.duration()));

    let rows: Vec<Vec<String>> = events
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let percentile = 100.0 - i as f64 / events.len() as f64 * 100.0;
            vec![
                format_ns(e.duration()),
                format_ns(e.start),
                e.kind.to_string(),
                format!("{percentile:.2}"),
            ]
        })
        .collect();
    write_table(w, &["Duration", "Start", "Type", "Percentile"], &rows, None)
}

fn format_ns(ns: i64) -> String {
    format!("{:?}", Duration::from_nanos(ns.max(0) as u64))
}
