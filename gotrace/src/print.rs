//! Plain-text views of a parsed trace.

use std::io::{self, Read, Write};

use gotrace_format::EventType;
use gotrace_parse::{description, parse, Event, ParseError, Trace};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrintError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Filter for [`events`]. The defaults match everything.
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Only events with a timestamp >= `min_ts` (nanoseconds).
    pub min_ts: i64,
    /// Only events with a timestamp <= `max_ts`; -1 means no upper limit.
    pub max_ts: i64,
    /// Only events from this processor; -1 means all.
    pub p: i64,
    /// Only events concerning this goroutine, either as the event's own
    /// goroutine or as a goroutine argument; -1 means all.
    pub g: i64,
    /// Print the stack contents after each event.
    pub verbose: bool,
    /// Only events referencing one of these stack ids; empty means all.
    pub stack_ids: Vec<u32>,
}

impl Default for EventFilter {
    fn default() -> Self {
        EventFilter {
            min_ts: 0,
            max_ts: -1,
            p: -1,
            g: -1,
            verbose: false,
            stack_ids: Vec::new(),
        }
    }
}

/// Prints all events in `r` matching `filter` to `w`, one per line.
pub fn events<R: Read, W: Write>(r: R, w: &mut W, filter: &EventFilter) -> Result<(), PrintError> {
    let trace = parse(r)?;
    for e in &trace.events {
        if !matches_event(e, filter) {
            continue;
        }
        write_event(w, &trace, e)?;
        writeln!(w)?;
        if filter.verbose {
            write_event_stacks(w, &trace, e)?;
        }
    }
    Ok(())
}

fn matches_event(e: &Event, filter: &EventFilter) -> bool {
    e.ts >= filter.min_ts
        && (filter.max_ts == -1 || e.ts <= filter.max_ts)
        && (filter.p == -1 || i64::from(e.p) == filter.p)
        && matches_g(e, filter.g)
        && matches_stack_ids(e, &filter.stack_ids)
}

fn matches_g(e: &Event, g: i64) -> bool {
    if g == -1 || e.g == g as u64 {
        return true;
    }
    named_args(e, "g").any(|v| v == g as u64)
}

fn matches_stack_ids(e: &Event, stack_ids: &[u32]) -> bool {
    if stack_ids.is_empty() || stack_ids.contains(&e.stk_id) {
        return true;
    }
    named_args(e, "stack").any(|v| stack_ids.contains(&(v as u32)))
}

/// The values of `e`'s arguments labelled `name` by its description.
fn named_args<'a>(e: &'a Event, name: &'a str) -> impl Iterator<Item = u64> + 'a {
    description(e.typ)
        .args
        .iter()
        .zip(&e.args)
        .filter(move |(label, _)| **label == name)
        .map(|(_, value)| *value)
}

fn write_event<W: Write>(w: &mut W, t: &Trace, e: &Event) -> io::Result<()> {
    write!(w, "{e}")?;
    // Resolve the string arguments of user annotations.
    match e.typ {
        EventType::UserTaskCreate => {
            if let Some(name) = e.args.get(2).and_then(|id| t.strings.get(id)) {
                write!(w, " category={name}")?;
            }
        }
        EventType::UserLog => {
            if let Some(category) = e.args.get(1).and_then(|id| t.strings.get(id)) {
                write!(w, " category={category}")?;
            }
            if let Some(message) = e.args.get(2).and_then(|id| t.strings.get(id)) {
                write!(w, " message={message}")?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn write_event_stacks<W: Write>(w: &mut W, t: &Trace, e: &Event) -> io::Result<()> {
    let mut stack_ids = Vec::new();
    if e.stk_id != 0 {
        stack_ids.push(e.stk_id);
    }
    stack_ids.extend(named_args(e, "stack").map(|v| v as u32));

    for (i, stack_id) in stack_ids.iter().enumerate() {
        if i > 0 {
            writeln!(w)?;
        }
        write_stack(w, t, *stack_id)?;
    }
    Ok(())
}

/// Filter for [`stacks`]. The default matches everything.
#[derive(Debug, Clone, Default)]
pub struct StackFilter {
    /// Only stacks with one of these ids; empty means all.
    pub stack_ids: Vec<u32>,
}

/// Prints all stacks in `r` matching `filter` to `w`, ordered by id.
pub fn stacks<R: Read, W: Write>(r: R, w: &mut W, filter: &StackFilter) -> Result<(), PrintError> {
    let trace = parse(r)?;
    let mut stack_ids: Vec<u32> = trace.stacks.keys().copied().collect();
    stack_ids.sort_unstable();

    let mut printed = 0;
    for id in stack_ids {
        if !filter.stack_ids.is_empty() && !filter.stack_ids.contains(&id) {
            continue;
        }
        if printed > 0 {
            writeln!(w)?;
        }
        printed += 1;
        write_stack(w, &trace, id)?;
    }
    Ok(())
}

fn write_stack<W: Write>(w: &mut W, t: &Trace, id: u32) -> io::Result<()> {
    writeln!(w, "stack {id}:")?;
    for pc in t.stack(id) {
        if let Some(frame) = t.pcs.get(pc) {
            writeln!(w, "\t{}()", frame.func)?;
            writeln!(w, "\t\t{}:{}", frame.file, frame.line)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotrace_format::Encoder;

    fn raw(typ: EventType, args: &[u64]) -> gotrace_format::Event {
        gotrace_format::Event {
            typ,
            args: args.to_vec(),
            str: Vec::new(),
        }
    }

    fn string_event(id: u64, s: &str) -> gotrace_format::Event {
        gotrace_format::Event {
            typ: EventType::String,
            args: vec![id],
            str: s.as_bytes().to_vec(),
        }
    }

    fn example_trace() -> Vec<u8> {
        let mut enc = Encoder::new(Vec::new());
        for ev in [
            raw(EventType::Batch, &[0, 1000]),
            raw(EventType::Frequency, &[1_000_000_000]),
            string_event(1, "main.work"),
            string_event(2, "/src/main.go"),
            string_event(3, "reqid"),
            raw(EventType::Stack, &[1, 1, 0x100, 1, 2, 7]),
            raw(EventType::GoCreate, &[10, 1, 1, 1]),
            raw(EventType::GoStart, &[10, 1, 0]),
            gotrace_format::Event {
                typ: EventType::UserLog,
                args: vec![10, 1, 3, 1],
                str: b"hello".to_vec(),
            },
            raw(EventType::GoBlock, &[10, 1]),
        ] {
            enc.encode(&ev).unwrap();
        }
        enc.into_inner()
    }

    fn printed(filter: &EventFilter) -> String {
        let mut out = Vec::new();
        events(example_trace().as_slice(), &mut out, filter).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_print_all_events() {
        let out = printed(&EventFilter::default());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("GoCreate"));
        assert!(lines[1].contains("GoStart"));
        assert!(lines[2].contains("UserLog"));
        assert!(lines[2].contains("category=reqid"));
        assert!(lines[2].contains("message=hello"));
        assert!(lines[3].contains("GoBlock"));
    }

    #[test]
    fn test_ts_filter() {
        let filter = EventFilter {
            min_ts: 10,
            max_ts: 20,
            ..Default::default()
        };
        let out = printed(&filter);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("GoStart"));
        assert!(lines[1].contains("UserLog"));
    }

    #[test]
    fn test_g_filter_matches_arguments() {
        // GoCreate's own g is 0 (it runs before any goroutine starts), but
        // its "g" argument names goroutine 1.
        let filter = EventFilter {
            g: 1,
            ..Default::default()
        };
        let out = printed(&filter);
        assert!(out.contains("GoCreate"));
        assert!(out.contains("GoStart"));
        assert!(out.contains("GoBlock"));

        let filter = EventFilter {
            g: 9,
            ..Default::default()
        };
        assert!(printed(&filter).is_empty());
    }

    #[test]
    fn test_stack_id_filter() {
        let filter = EventFilter {
            stack_ids: vec![1],
            ..Default::default()
        };
        let out = printed(&filter);
        // GoCreate, UserLog and GoBlock reference stack 1; GoStart carries
        // no stack at all.
        assert_eq!(out.lines().count(), 3);
        assert!(!out.contains("GoStart"));

        let filter = EventFilter {
            stack_ids: vec![42],
            ..Default::default()
        };
        assert!(printed(&filter).is_empty());
    }

    #[test]
    fn test_verbose_prints_stacks() {
        let filter = EventFilter {
            verbose: true,
            ..Default::default()
        };
        let out = printed(&filter);
        assert!(out.contains("stack 1:"));
        assert!(out.contains("\tmain.work()"));
        assert!(out.contains("\t\t/src/main.go:7"));
    }

    #[test]
    fn test_print_stacks() {
        let mut out = Vec::new();
        stacks(
            example_trace().as_slice(),
            &mut out,
            &StackFilter::default(),
        )
        .unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(
            out,
            "stack 1:\n\tmain.work()\n\t\t/src/main.go:7\n"
        );

        let mut out = Vec::new();
        stacks(
            example_trace().as_slice(),
            &mut out,
            &StackFilter {
                stack_ids: vec![99],
            },
        )
        .unwrap();
        assert!(out.is_empty());
    }
}
