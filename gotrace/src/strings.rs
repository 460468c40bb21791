//! Dump of every string payload in a trace.

use std::io::{self, Read, Write};

use gotrace_format::{DecodeError, Decoder, Event};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StringsError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Prints every non-empty event string in `r` to `w`, one per line, in
/// stream order. This covers the string dictionary as well as user log
/// payloads.
pub fn dump<R: Read, W: Write>(r: R, w: &mut W) -> Result<(), StringsError> {
    let mut dec = Decoder::new(r);
    let mut ev = Event::new();
    loop {
        match dec.decode(&mut ev) {
            Ok(()) => {}
            Err(e) if e.is_eof() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        if !ev.str.is_empty() {
            writeln!(w, "{}", String::from_utf8_lossy(&ev.str))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotrace_format::{Encoder, EventType};

    #[test]
    fn test_dump() {
        let mut enc = Encoder::new(Vec::new());
        for ev in [
            Event {
                typ: EventType::Batch,
                args: vec![0, 100],
                str: Vec::new(),
            },
            Event {
                typ: EventType::String,
                args: vec![1],
                str: b"main.main".to_vec(),
            },
            Event {
                typ: EventType::UserLog,
                args: vec![5, 1, 1, 0],
                str: b"note".to_vec(),
            },
        ] {
            enc.encode(&ev).unwrap();
        }
        let input = enc.into_inner();

        let mut out = Vec::new();
        dump(input.as_slice(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "main.main\nnote\n");
    }
}
