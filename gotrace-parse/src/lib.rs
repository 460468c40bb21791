//! Parsed Go 1.19 execution traces.
//!
//! [`parse`] consumes the raw event stream and produces a [`Trace`]: events
//! with absolute nanosecond timestamps and attributed processor, goroutine
//! and stack ids, plus the trace's stack, PC and string tables. Dictionary
//! events (batches, the clock frequency, stack and string table entries) are
//! folded into the tables rather than surfaced as events.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use gotrace_format::{DecodeError, Decoder, EventType, VERSION_GO_1_19};
use thiserror::Error;

mod descriptions;

pub use descriptions::{description, EventDescription};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Only the 1.19 wire format can be turned into a parsed trace.
    #[error("cannot parse trace version {0}")]
    UnsupportedVersion(u16),

    #[error("{typ} event has wrong number of arguments: want {want}, got {got}")]
    WrongArgCount {
        typ: EventType,
        want: usize,
        got: usize,
    },

    #[error("non-positive ticks per second: {0}")]
    BadFrequency(i64),

    #[error("no frequency event in trace")]
    NoFrequency,
}

/// One stack frame, with the function and file names already resolved
/// against the string table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub func: String,
    pub file: String,
    pub line: u64,
}

/// A parsed event. Timestamps are nanoseconds relative to the earliest
/// event in the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub typ: EventType,
    /// Byte offset of the event record in the input.
    pub off: u64,
    pub ts: i64,
    /// Processor the event happened on; -1 when unknown.
    pub p: i32,
    /// Goroutine the event concerns; 0 when none.
    pub g: u64,
    /// Stack id of the event's own stack trace; 0 when none.
    pub stk_id: u32,
    /// Remaining arguments, named by [`description`]: the leading tick delta
    /// and the trailing stack id are stripped.
    pub args: Vec<u64>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} p={} g={} off={}",
            self.ts, self.typ, self.p, self.g, self.off
        )?;
        let desc = description(self.typ);
        for (name, value) in desc.args.iter().zip(&self.args) {
            write!(f, " {name}={value}")?;
        }
        if desc.stack {
            write!(f, " stack={}", self.stk_id)?;
        }
        Ok(())
    }
}

/// A fully parsed trace.
#[derive(Debug, Default)]
pub struct Trace {
    /// All non-dictionary events, sorted by timestamp.
    pub events: Vec<Event>,
    /// Stack id to the PCs of its frames, outermost first.
    pub stacks: HashMap<u32, Vec<u64>>,
    /// PC to its resolved frame.
    pub pcs: HashMap<u64, Frame>,
    /// String id to string.
    pub strings: HashMap<u64, String>,
}

impl Trace {
    /// The frame PCs of `stack_id`, empty for unknown ids.
    pub fn stack(&self, stack_id: u32) -> &[u64] {
        self.stacks.get(&stack_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Reads a 1.19 trace from `r` and parses it into a [`Trace`].
pub fn parse<R: Read>(r: R) -> Result<Trace, ParseError> {
    let mut dec = Decoder::new(r);
    let mut raw = gotrace_format::Event::new();

    let mut trace = Trace::default();
    let mut raw_pcs: HashMap<u64, (u64, u64, u64)> = HashMap::new();
    let mut pending_logs: Vec<(usize, String)> = Vec::new();

    let mut ticks_per_sec: i64 = 0;
    let mut last_p: i32 = -1;
    let mut last_ts: i64 = 0;
    let mut last_gs: HashMap<i32, u64> = HashMap::new();

    loop {
        let off = dec.offset();
        match dec.decode(&mut raw) {
            Ok(()) => {}
            Err(e) if e.is_eof() => break,
            Err(e) => return Err(e.into()),
        }
        if dec.version() != VERSION_GO_1_19 {
            return Err(ParseError::UnsupportedVersion(dec.version()));
        }

        match raw.typ {
            EventType::Batch => {
                check_args(&raw, 2)?;
                last_p = raw.args[0] as i32;
                last_ts = raw.args[1] as i64;
            }
            EventType::Frequency => {
                check_args(&raw, 1)?;
                ticks_per_sec = raw.args[0] as i64;
                if ticks_per_sec <= 0 {
                    return Err(ParseError::BadFrequency(ticks_per_sec));
                }
            }
            EventType::String => {
                check_args(&raw, 1)?;
                trace
                    .strings
                    .insert(raw.args[0], String::from_utf8_lossy(&raw.str).into_owned());
            }
            EventType::Stack => {
                if raw.args.len() < 2 {
                    return Err(ParseError::WrongArgCount {
                        typ: raw.typ,
                        want: 2,
                        got: raw.args.len(),
                    });
                }
                let id = raw.args[0] as u32;
                let frames = raw.args[1] as usize;
                check_args(&raw, 2 + frames * 4)?;
                let mut pcs = Vec::with_capacity(frames);
                for frame in raw.args[2..].chunks_exact(4) {
                    pcs.push(frame[0]);
                    raw_pcs.insert(frame[0], (frame[1], frame[2], frame[3]));
                }
                trace.stacks.insert(id, pcs);
            }
            EventType::TimerGoroutine => {
                // Legacy event without a timestamp; nothing to keep.
            }
            EventType::CpuSample => {
                // Samples carry an absolute tick timestamp and their own
                // P/G/stack; they do not advance the batch clock.
                check_args(&raw, 5)?;
                trace.events.push(Event {
                    typ: raw.typ,
                    off,
                    ts: raw.args[0] as i64,
                    p: raw.args[2] as i32,
                    g: raw.args[3],
                    stk_id: raw.args[4] as u32,
                    args: raw.args[1..4].to_vec(),
                });
            }
            typ => {
                let desc = description(typ);
                let want = 1 + desc.args.len() + usize::from(desc.stack);
                check_args(&raw, want)?;

                last_ts += raw.args[0] as i64;
                let mut rest = &raw.args[1..];
                let stk_id = if desc.stack {
                    let stk = rest[rest.len() - 1] as u32;
                    rest = &rest[..rest.len() - 1];
                    stk
                } else {
                    0
                };

                let g = match typ {
                    EventType::GoStart | EventType::GoStartLocal | EventType::GoStartLabel => {
                        last_gs.insert(last_p, rest[0]);
                        rest[0]
                    }
                    EventType::GcStart
                    | EventType::GcDone
                    | EventType::GcStwStart
                    | EventType::GcStwDone => 0,
                    EventType::GoWaiting | EventType::GoInSyscall => rest[0],
                    _ => last_gs.get(&last_p).copied().unwrap_or(0),
                };
                if clears_running_goroutine(typ) {
                    last_gs.insert(last_p, 0);
                }

                let mut args = rest.to_vec();
                if typ == EventType::UserLog {
                    // The value payload is interned into the string table
                    // once all dictionary entries are known; reserve the
                    // argument slot now.
                    pending_logs.push((
                        trace.events.len(),
                        String::from_utf8_lossy(&raw.str).into_owned(),
                    ));
                    args.push(0);
                }

                trace.events.push(Event {
                    typ,
                    off,
                    ts: last_ts,
                    p: last_p,
                    g,
                    stk_id,
                    args,
                });
            }
        }
    }

    if ticks_per_sec == 0 {
        return Err(ParseError::NoFrequency);
    }

    let mut next_string_id = trace.strings.keys().max().copied().unwrap_or(0) + 1;
    for (idx, value) in pending_logs {
        trace.strings.insert(next_string_id, value);
        if let Some(slot) = trace.events[idx].args.last_mut() {
            *slot = next_string_id;
        }
        next_string_id += 1;
    }

    for (pc, (func_id, file_id, line)) in raw_pcs {
        trace.pcs.insert(
            pc,
            Frame {
                func: trace.strings.get(&func_id).cloned().unwrap_or_default(),
                file: trace.strings.get(&file_id).cloned().unwrap_or_default(),
                line,
            },
        );
    }

    // Rescale ticks to nanoseconds relative to the earliest event, then
    // order the merged per-P batches by time.
    let min_ts = trace.events.iter().map(|e| e.ts).min().unwrap_or(0);
    let freq = 1e9 / ticks_per_sec as f64;
    for ev in &mut trace.events {
        ev.ts = ((ev.ts - min_ts) as f64 * freq) as i64;
    }
    trace.events.sort_by_key(|e| e.ts);

    Ok(trace)
}

fn check_args(raw: &gotrace_format::Event, want: usize) -> Result<(), ParseError> {
    if raw.args.len() != want {
        return Err(ParseError::WrongArgCount {
            typ: raw.typ,
            want,
            got: raw.args.len(),
        });
    }
    Ok(())
}

/// Events after which the P no longer runs the goroutine that emitted them.
fn clears_running_goroutine(typ: EventType) -> bool {
    matches!(
        typ,
        EventType::GoEnd
            | EventType::GoStop
            | EventType::GoSched
            | EventType::GoPreempt
            | EventType::GoSleep
            | EventType::GoBlock
            | EventType::GoBlockSend
            | EventType::GoBlockRecv
            | EventType::GoBlockSelect
            | EventType::GoBlockSync
            | EventType::GoBlockCond
            | EventType::GoBlockNet
            | EventType::GoSysBlock
            | EventType::GoBlockGc
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotrace_format::Encoder;

    fn encode(events: &[gotrace_format::Event]) -> Vec<u8> {
        let mut enc = Encoder::new(Vec::new());
        for ev in events {
            enc.encode(ev).unwrap();
        }
        enc.into_inner()
    }

    fn raw(typ: EventType, args: &[u64]) -> gotrace_format::Event {
        gotrace_format::Event {
            typ,
            args: args.to_vec(),
            str: Vec::new(),
        }
    }

    fn raw_str(typ: EventType, args: &[u64], s: &str) -> gotrace_format::Event {
        gotrace_format::Event {
            typ,
            args: args.to_vec(),
            str: s.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_parse_tables_and_timestamps() {
        let input = encode(&[
            raw(EventType::Batch, &[0, 1000]),
            raw(EventType::Frequency, &[1_000_000_000]),
            raw_str(EventType::String, &[1], "main.main"),
            raw_str(EventType::String, &[2], "/src/main.go"),
            raw(EventType::Stack, &[1, 1, 0x100, 1, 2, 7]),
            // ts 1010, creates g 1 with start stack 1 from creation site 1.
            raw(EventType::GoCreate, &[10, 1, 1, 1]),
            // ts 1030, g 1 starts.
            raw(EventType::GoStart, &[20, 1, 0]),
            // ts 1090, g 1 blocks.
            raw(EventType::GoBlock, &[60, 1]),
        ]);

        let trace = parse(input.as_slice()).unwrap();
        assert_eq!(trace.strings[&1], "main.main");
        assert_eq!(trace.stack(1), [0x100]);
        assert_eq!(
            trace.pcs[&0x100],
            Frame {
                func: "main.main".into(),
                file: "/src/main.go".into(),
                line: 7,
            }
        );

        let kinds: Vec<_> = trace.events.iter().map(|e| e.typ).collect();
        assert_eq!(
            kinds,
            [EventType::GoCreate, EventType::GoStart, EventType::GoBlock]
        );

        // Timestamps are nanoseconds relative to the earliest event.
        let create = &trace.events[0];
        assert_eq!(create.ts, 0);
        assert_eq!(create.p, 0);
        assert_eq!(create.args, [1, 1]);
        assert_eq!(create.stk_id, 1);

        let start = &trace.events[1];
        assert_eq!(start.ts, 20);
        assert_eq!(start.g, 1);

        // GoBlock is attributed to the goroutine the P was running.
        let block = &trace.events[2];
        assert_eq!(block.ts, 80);
        assert_eq!(block.g, 1);
        assert_eq!(block.stk_id, 1);
    }

    #[test]
    fn test_parse_cpu_sample() {
        let input = encode(&[
            raw(EventType::Batch, &[0, 500]),
            raw(EventType::Frequency, &[1_000_000_000]),
            raw(EventType::ProcStart, &[10, 3]),
            raw(EventType::CpuSample, &[520, 99, u64::MAX, 4, 2]),
        ]);

        let trace = parse(input.as_slice()).unwrap();
        let sample = trace
            .events
            .iter()
            .find(|e| e.typ == EventType::CpuSample)
            .unwrap();
        assert_eq!(sample.p, -1);
        assert_eq!(sample.g, 4);
        assert_eq!(sample.stk_id, 2);
        // ts 520 against a minimum of 510 from the ProcStart event.
        assert_eq!(sample.ts, 10);
    }

    #[test]
    fn test_parse_user_log_interns_payload() {
        let input = encode(&[
            raw(EventType::Batch, &[0, 100]),
            raw(EventType::Frequency, &[1_000_000_000]),
            raw_str(EventType::String, &[5], "key"),
            raw_str(EventType::UserLog, &[1, 9, 5, 0], "hello world"),
        ]);

        let trace = parse(input.as_slice()).unwrap();
        let log = trace
            .events
            .iter()
            .find(|e| e.typ == EventType::UserLog)
            .unwrap();
        assert_eq!(log.args.len(), 3);
        assert_eq!(trace.strings[&log.args[2]], "hello world");
    }

    #[test]
    fn test_parse_requires_frequency() {
        let input = encode(&[
            raw(EventType::Batch, &[0, 100]),
            raw(EventType::ProcStop, &[1]),
        ]);
        assert!(matches!(
            parse(input.as_slice()),
            Err(ParseError::NoFrequency)
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_arg_count() {
        let input = encode(&[
            raw(EventType::Batch, &[0, 100]),
            raw(EventType::Frequency, &[1_000_000_000]),
            raw(EventType::GoStart, &[1, 2]),
        ]);
        assert!(matches!(
            parse(input.as_slice()),
            Err(ParseError::WrongArgCount {
                typ: EventType::GoStart,
                want: 3,
                got: 2,
            })
        ));
    }

    #[test]
    fn test_event_display() {
        let ev = Event {
            typ: EventType::GoUnblock,
            off: 20,
            ts: 123,
            p: 1,
            g: 7,
            stk_id: 3,
            args: vec![9, 0],
        };
        assert_eq!(ev.to_string(), "123 GoUnblock p=1 g=7 off=20 g=9 seq=0 stack=3");
    }
}
