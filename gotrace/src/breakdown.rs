//! Per-event-type size and count statistics.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use gotrace_format::{DecodeError, Decoder, Event, EventType};

use crate::tables::write_table;

/// Count and cumulative encoded size of one event type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTypeSummary {
    pub count: u64,
    pub bytes: u64,
}

/// Breakdown of a trace by event type.
pub type EventTypeBreakdown = BTreeMap<EventType, EventTypeSummary>;

/// Reads a trace from `r` and folds every event into a per-type summary.
/// The byte counts add up to the input size: the 16-byte file header is
/// attributed to the first decoded event's type.
pub fn by_event_type<R: Read>(r: R) -> Result<EventTypeBreakdown, DecodeError> {
    let mut dec = Decoder::new(r);
    let mut ev = Event::new();
    let mut breakdown = EventTypeBreakdown::new();
    loop {
        let start = dec.offset();
        match dec.decode(&mut ev) {
            Ok(()) => {}
            Err(e) if e.is_eof() => break,
            Err(e) => return Err(e),
        }
        let summary = breakdown.entry(ev.typ).or_default();
        summary.count += 1;
        summary.bytes += dec.offset() - start;
    }
    Ok(breakdown)
}

/// Writes the breakdown as CSV with `Event Type,Count,Bytes` columns, in
/// event type order.
pub fn write_csv<W: Write>(breakdown: &EventTypeBreakdown, w: &mut W) -> io::Result<()> {
    writeln!(w, "Event Type,Count,Bytes")?;
    for (typ, summary) in breakdown {
        writeln!(w, "{typ},{},{}", summary.count, summary.bytes)?;
    }
    Ok(())
}

/// Writes a table of event types sorted by descending size, with
/// human-readable byte values and a percentage column.
pub fn write_bytes_table<W: Write>(breakdown: &EventTypeBreakdown, w: &mut W) -> io::Result<()> {
    let total: u64 = breakdown.values().map(|s| s.bytes).sum();
    let mut entries: Vec<_> = breakdown.iter().collect();
    entries.sort_by(|a, b| b.1.bytes.cmp(&a.1.bytes));

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|(typ, s)| {
            vec![
                typ.to_string(),
                human_bytes(s.bytes),
                format!("{:.2}%", percentage(s.bytes, total)),
            ]
        })
        .collect();
    let footer = vec![
        "Total".to_string(),
        human_bytes(total),
        "100.00%".to_string(),
    ];
    write_table(w, &["Event Type", "Bytes", "%"], &rows, Some(&footer))
}

/// Writes a table of event types sorted by descending count, with a
/// percentage column.
pub fn write_count_table<W: Write>(breakdown: &EventTypeBreakdown, w: &mut W) -> io::Result<()> {
    let total: u64 = breakdown.values().map(|s| s.count).sum();
    let mut entries: Vec<_> = breakdown.iter().collect();
    entries.sort_by(|a, b| b.1.count.cmp(&a.1.count));

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|(typ, s)| {
            vec![
                typ.to_string(),
                s.count.to_string(),
                format!("{:.2}%", percentage(s.count, total)),
            ]
        })
        .collect();
    let footer = vec![
        "Total".to_string(),
        total.to_string(),
        "100.00%".to_string(),
    ];
    write_table(w, &["Event Type", "Count", "%"], &rows, Some(&footer))
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

/// Formats a byte count with metric prefixes, e.g. `1.7 kB`.
fn human_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, b"kMGTPE"[exp] as char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotrace_format::Encoder;

    #[test]
    fn test_by_event_type_sums_to_input_size() {
        let mut enc = Encoder::new(Vec::new());
        let events = [
            Event {
                typ: EventType::Batch,
                args: vec![0, 1000],
                str: Vec::new(),
            },
            Event {
                typ: EventType::Frequency,
                args: vec![1_000_000_000],
                str: Vec::new(),
            },
            Event {
                typ: EventType::String,
                args: vec![1],
                str: b"main.main".to_vec(),
            },
            Event {
                typ: EventType::String,
                args: vec![2],
                str: b"pkg.go".to_vec(),
            },
            Event {
                typ: EventType::ProcStop,
                args: vec![5],
                str: Vec::new(),
            },
        ];
        for ev in &events {
            enc.encode(ev).unwrap();
        }
        let input = enc.into_inner();

        let breakdown = by_event_type(input.as_slice()).unwrap();
        assert_eq!(breakdown.len(), 4);
        assert_eq!(breakdown[&EventType::String].count, 2);

        let total: u64 = breakdown.values().map(|s| s.bytes).sum();
        assert_eq!(total, input.len() as u64);

        // The header lands in the first event's bucket.
        let batch = breakdown[&EventType::Batch];
        assert_eq!(batch.count, 1);
        assert!(batch.bytes > 16);
    }

    #[test]
    fn test_write_csv() {
        let mut breakdown = EventTypeBreakdown::new();
        breakdown.insert(
            EventType::Batch,
            EventTypeSummary {
                count: 2,
                bytes: 40,
            },
        );
        breakdown.insert(
            EventType::String,
            EventTypeSummary {
                count: 41,
                bytes: 1694,
            },
        );

        let mut out = Vec::new();
        write_csv(&breakdown, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Event Type,Count,Bytes\nBatch,2,40\nString,41,1694\n"
        );
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(999), "999 B");
        assert_eq!(human_bytes(1000), "1.0 kB");
        assert_eq!(human_bytes(1694), "1.7 kB");
        assert_eq!(human_bytes(2_500_000), "2.5 MB");
        assert_eq!(human_bytes(3_200_000_000), "3.2 GB");
    }
}
