//! CPU-sample export in the perf script text format FlameScope reads.
//!
//! One pass over the stream collects the string table, the stack table and
//! the CPU samples; a second pass over the collected samples emits one
//! stack-sample record each, with timestamps in seconds since the earliest
//! sample.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use gotrace_format::{DecodeError, Decoder, Event, EventType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlamescopeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("missing or bad frequency event")]
    MissingFrequency,

    #[error(transparent)]
    Io(#[from] io::Error),
}

struct CpuSample {
    timestamp: u64,
    stack_id: u64,
}

struct StackFrame {
    pc: u64,
    func_id: u64,
}

/// Reads a trace from `r` and writes its CPU samples to `w` as textual
/// stack-sample records.
pub fn export<R: Read, W: Write>(r: R, mut w: W) -> Result<(), FlamescopeError> {
    let mut dec = Decoder::new(r);
    let mut ev = Event::new();

    let mut ticks_per_sec: i64 = 0;
    let mut min_ts: u64 = 0;
    let mut samples: Vec<CpuSample> = Vec::new();
    let mut stacks: HashMap<u64, Vec<StackFrame>> = HashMap::new();
    let mut strings: HashMap<u64, String> = HashMap::new();

    loop {
        match dec.decode(&mut ev) {
            Ok(()) => {}
            Err(e) if e.is_eof() => break,
            Err(e) => return Err(e.into()),
        }

        match ev.typ {
            EventType::CpuSample => {
                // [timestamp, real timestamp, real P id, goroutine id, stack]
                let sample = CpuSample {
                    timestamp: ev.args.get(1).copied().unwrap_or(0),
                    stack_id: ev.args.get(4).copied().unwrap_or(0),
                };
                if min_ts == 0 || sample.timestamp < min_ts {
                    min_ts = sample.timestamp;
                }
                samples.push(sample);
            }
            EventType::Stack => {
                // [stack id, frame count, {pc, func string id, file string id, line}...]
                if ev.args.len() < 2 {
                    continue;
                }
                let frames = ev.args[2..]
                    .chunks_exact(4)
                    .map(|frame| StackFrame {
                        pc: frame[0],
                        func_id: frame[1],
                    })
                    .collect();
                stacks.insert(ev.args[0], frames);
            }
            EventType::String => {
                strings.insert(
                    ev.args[0],
                    String::from_utf8_lossy(&ev.str).into_owned(),
                );
            }
            EventType::Frequency => {
                ticks_per_sec = ev.args.first().copied().unwrap_or(0) as i64;
            }
            _ => {}
        }
    }

    if ticks_per_sec <= 0 {
        return Err(FlamescopeError::MissingFrequency);
    }

    tracing::debug!(samples = samples.len(), stacks = stacks.len(), "collected cpu samples");

    for sample in &samples {
        let ts = (sample.timestamp - min_ts) as f64 / ticks_per_sec as f64;
        writeln!(w, "go 0 [0] {ts:.6}: cpu-clock:")?;
        let frames = stacks
            .get(&sample.stack_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for frame in frames {
            let func = strings.get(&frame.func_id).map(String::as_str).unwrap_or("");
            writeln!(w, "\t{:x} {} (go)", frame.pc, func)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotrace_format::Encoder;

    fn raw(typ: EventType, args: &[u64]) -> Event {
        Event {
            typ,
            args: args.to_vec(),
            str: Vec::new(),
        }
    }

    fn string_event(id: u64, s: &str) -> Event {
        Event {
            typ: EventType::String,
            args: vec![id],
            str: s.as_bytes().to_vec(),
        }
    }

    fn encode(events: &[Event]) -> Vec<u8> {
        let mut enc = Encoder::new(Vec::new());
        for ev in events {
            enc.encode(ev).unwrap();
        }
        enc.into_inner()
    }

    #[test]
    fn test_export() {
        // One million ticks per second, so 250k ticks is 0.25s.
        let input = encode(&[
            raw(EventType::Batch, &[0, 0]),
            raw(EventType::Frequency, &[1_000_000]),
            string_event(1, "main.work"),
            string_event(2, "runtime.mcall"),
            raw(EventType::Stack, &[1, 2, 0xabc, 1, 3, 10, 0xdef, 2, 3, 20]),
            raw(EventType::CpuSample, &[0, 1_000_000, 0, 1, 1]),
            raw(EventType::CpuSample, &[0, 1_250_000, 0, 1, 1]),
            raw(EventType::CpuSample, &[0, 1_500_000, 0, 1, 99]),
        ]);

        let mut out = Vec::new();
        export(input.as_slice(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "go 0 [0] 0.000000: cpu-clock:\n\
             \tabc main.work (go)\n\
             \tdef runtime.mcall (go)\n\
             \n\
             go 0 [0] 0.250000: cpu-clock:\n\
             \tabc main.work (go)\n\
             \tdef runtime.mcall (go)\n\
             \n\
             go 0 [0] 0.500000: cpu-clock:\n\
             \n"
        );
    }

    #[test]
    fn test_missing_frequency() {
        let input = encode(&[
            raw(EventType::Batch, &[0, 0]),
            raw(EventType::CpuSample, &[0, 100, 0, 1, 1]),
        ]);
        assert!(matches!(
            export(input.as_slice(), Vec::new()),
            Err(FlamescopeError::MissingFrequency)
        ));
    }

    #[test]
    fn test_samples_keep_collection_order() {
        // Later timestamp first; records are emitted in stream order.
        let input = encode(&[
            raw(EventType::Frequency, &[1_000_000]),
            raw(EventType::CpuSample, &[0, 2_000_000, 0, 1, 1]),
            raw(EventType::CpuSample, &[0, 1_000_000, 0, 1, 1]),
        ]);
        let mut out = Vec::new();
        export(input.as_slice(), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let first = out.find("1.000000").unwrap();
        let second = out.find("0.000000").unwrap();
        assert!(first < second);
    }
}
