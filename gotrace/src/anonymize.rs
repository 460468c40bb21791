//! Streaming trace anonymization.
//!
//! Decodes events one by one, rewrites their string payloads and re-encodes
//! them immediately. Only strings are touched; every other field passes
//! through, so the output stays a valid trace of the same shape.
//!
//! A string is kept when it is one of the GC worker-mode literals the
//! runtime emits near trace start, a `pkg.func` symbol from the standard
//! library, or a file path whose `/src/`-relative tail is a stdlib source
//! file (only the prefix is obfuscated then). Everything else collapses to
//! `XXX`, keeping a `.go` suffix where one exists.

use std::io::{Read, Write};

use gotrace_format::{DecodeError, Decoder, EncodeError, Encoder, Event};
use thiserror::Error;

use crate::stdlib::StdlibIndex;

#[derive(Error, Debug)]
pub enum AnonymizeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Replacement for anything that needs obfuscation.
const REPLACEMENT: &[u8] = b"XXX";

const SRC_SEP: &[u8] = b"/src/";

/// Fixed strings emitted by the runtime's GC workers; every trace contains
/// them and they identify nothing, so they stay readable.
const GC_MARK_WORKER_MODES: [&[u8]; 4] = [
    b"Not worker",
    b"GC (dedicated)",
    b"GC (fractional)",
    b"GC (idle)",
];

/// Reads a trace from `r` and writes the anonymized version to `w`. The
/// caller should buffer `w`; one event is written per decoded event.
pub fn anonymize_trace<R: Read, W: Write>(
    r: R,
    w: W,
    index: &StdlibIndex,
) -> Result<(), AnonymizeError> {
    let mut dec = Decoder::new(r);
    let mut enc = Encoder::new(w);
    let mut ev = Event::new();
    loop {
        match dec.decode(&mut ev) {
            Ok(()) => {}
            Err(e) if e.is_eof() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        if let Some(replacement) = anonymize_string(&ev.str, index) {
            ev.str = replacement;
        }
        enc.encode(&ev)?;
    }
}

/// Returns the obfuscated form of `s`, or `None` when it passes through
/// unchanged.
fn anonymize_string(s: &[u8], index: &StdlibIndex) -> Option<Vec<u8>> {
    if s.is_empty() || GC_MARK_WORKER_MODES.contains(&s) {
        return None;
    }
    if s[0] != b'/' {
        // Probably a pkg.func symbol.
        anonymize_func(s, index)
    } else {
        // Probably a file path.
        Some(anonymize_path(s, index))
    }
}

fn anonymize_func(s: &[u8], index: &StdlibIndex) -> Option<Vec<u8>> {
    let Some(dot) = s.iter().position(|&b| b == b'.') else {
        return Some(REPLACEMENT.to_vec());
    };
    if index.is_package(&s[..dot]) {
        None
    } else {
        Some(REPLACEMENT.to_vec())
    }
}

fn anonymize_path(s: &[u8], index: &StdlibIndex) -> Vec<u8> {
    let Some((_, tail)) = split_at_last(s, SRC_SEP) else {
        return REPLACEMENT.to_vec();
    };
    if index.is_source_file(tail) {
        // A stdlib file: keep the tail, obfuscate the machine-specific
        // prefix.
        let mut out = Vec::with_capacity(REPLACEMENT.len() + SRC_SEP.len() + tail.len());
        out.extend_from_slice(REPLACEMENT);
        out.extend_from_slice(SRC_SEP);
        out.extend_from_slice(tail);
        out
    } else if s.ends_with(b".go") {
        let mut out = REPLACEMENT.to_vec();
        out.extend_from_slice(b".go");
        out
    } else {
        REPLACEMENT.to_vec()
    }
}

/// Splits `s` around the last occurrence of `sep`.
fn split_at_last<'a>(s: &'a [u8], sep: &[u8]) -> Option<(&'a [u8], &'a [u8])> {
    if sep.is_empty() || s.len() < sep.len() {
        return None;
    }
    (0..=s.len() - sep.len())
        .rev()
        .find(|&i| &s[i..i + sep.len()] == sep)
        .map(|i| (&s[..i], &s[i + sep.len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotrace_format::EventType;

    fn index() -> StdlibIndex {
        StdlibIndex::with_goroot(None)
    }

    fn anonymized(s: &[u8]) -> Vec<u8> {
        anonymize_string(s, &index())
            .unwrap_or_else(|| s.to_vec())
    }

    #[test]
    fn test_gc_worker_modes_pass_through() {
        for s in GC_MARK_WORKER_MODES {
            assert_eq!(anonymize_string(s, &index()), None);
        }
    }

    #[test]
    fn test_func_symbols() {
        assert_eq!(anonymized(b"encoding/json.Marshal"), b"encoding/json.Marshal");
        assert_eq!(anonymized(b"runtime.gcBgMarkWorker"), b"runtime.gcBgMarkWorker");
        assert_eq!(anonymized(b"main.main"), b"XXX");
        assert_eq!(anonymized(b"my/encoding/json.Marshal"), b"XXX");
        assert_eq!(anonymized(b"nodots"), b"XXX");
    }

    #[test]
    fn test_paths() {
        // A stdlib tail keeps everything after /src/.
        assert_eq!(
            anonymized(b"/home/Bob/src/runtime/proc.go"),
            b"XXX/src/runtime/proc.go"
        );
        // A non-stdlib .go path keeps only the suffix.
        assert_eq!(anonymized(b"/home/Bob/src/runtime/foo/proc.go"), b"XXX.go");
        assert_eq!(anonymized(b"/home/Bob/work/app/main.go"), b"XXX.go");
        // No /src/, no .go: gone entirely.
        assert_eq!(anonymized(b"/home/Bob/secrets"), b"XXX");
        assert_eq!(anonymized(b"/home/Bob/src/runtime"), b"XXX");
        assert_eq!(anonymized(b"/home/Bob/src/"), b"XXX");
    }

    #[test]
    fn test_empty_string_passes_through() {
        assert_eq!(anonymize_string(b"", &index()), None);
    }

    fn encode(events: &[Event]) -> Vec<u8> {
        let mut enc = Encoder::new(Vec::new());
        for ev in events {
            enc.encode(ev).unwrap();
        }
        enc.into_inner()
    }

    fn string_event(id: u64, s: &[u8]) -> Event {
        Event {
            typ: EventType::String,
            args: vec![id],
            str: s.to_vec(),
        }
    }

    fn decode_strings(trace: &[u8]) -> Vec<Vec<u8>> {
        let mut dec = Decoder::new(trace);
        let mut ev = Event::new();
        let mut strings = Vec::new();
        loop {
            match dec.decode(&mut ev) {
                Ok(()) => {
                    if !ev.str.is_empty() {
                        strings.push(ev.str.clone());
                    }
                }
                Err(e) if e.is_eof() => return strings,
                Err(e) => panic!("decode failed: {e}"),
            }
        }
    }

    #[test]
    fn test_anonymize_trace_leaks_nothing() {
        let input = encode(&[
            Event {
                typ: EventType::Batch,
                args: vec![0, 100],
                str: Vec::new(),
            },
            string_event(1, b"GC (dedicated)"),
            string_event(2, b"github.com/acme/app.Handler"),
            string_event(3, b"/Users/felix.geisendoerfer/go/src/app/main.go"),
            string_event(4, b"encoding/json.Marshal"),
            Event {
                typ: EventType::UserLog,
                args: vec![5, 1, 2, 0],
                str: b"user secret /Users/felix.geisendoerfer/".to_vec(),
            },
        ]);

        let mut out = Vec::new();
        anonymize_trace(input.as_slice(), &mut out, &index()).unwrap();

        let strings = decode_strings(&out);
        for secret in ["/Users/", "felix.geisendoerfer", "acme"] {
            for s in &strings {
                let s = String::from_utf8_lossy(s);
                assert!(!s.contains(secret), "leaked {secret:?} in {s:?}");
            }
        }
        assert!(strings.iter().any(|s| s == b"GC (dedicated)"));
        assert!(strings.iter().any(|s| s == b"encoding/json.Marshal"));
    }

    #[test]
    fn test_anonymize_trace_is_idempotent() {
        let input = encode(&[
            Event {
                typ: EventType::Batch,
                args: vec![0, 100],
                str: Vec::new(),
            },
            string_event(1, b"Not worker"),
            string_event(2, b"main.main"),
            string_event(3, b"/home/Bob/secrets"),
            string_event(4, b"runtime.mallocgc"),
        ]);

        let mut once = Vec::new();
        anonymize_trace(input.as_slice(), &mut once, &index()).unwrap();
        let mut twice = Vec::new();
        anonymize_trace(once.as_slice(), &mut twice, &index()).unwrap();
        assert_eq!(once, twice);
    }
}
