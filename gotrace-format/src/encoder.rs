use std::io::{self, Write};

use crate::error::EncodeError;
use crate::event::{Event, EventType};
use crate::varint;

/// The header every encoded trace starts with.
const HEADER: [u8; 16] = *b"go 1.19 trace\0\0\0";

/// Streaming encoder for trace events, the inverse of [`crate::Decoder`].
///
/// Decoding a supported trace and feeding every event back through
/// [`Encoder::encode`] reproduces the input byte for byte, including the
/// padded 10-byte length prefix of stack records.
///
/// The caller should hand in a buffered writer; the encoder issues many
/// small writes. Write errors are sticky: after the first failure every
/// subsequent call fails with the same error without touching the writer.
pub struct Encoder<W: Write> {
    w: W,
    sticky: Option<(io::ErrorKind, String)>,
    // Packed argument block of the current event, reused across records.
    buf: Vec<u8>,
    header_written: bool,
}

impl<W: Write> Encoder<W> {
    pub fn new(w: W) -> Self {
        Encoder {
            w,
            sticky: None,
            buf: Vec::with_capacity(1 << 10),
            header_written: false,
        }
    }

    /// Writes `ev` to the underlying writer, preceded by the trace header on
    /// the first call.
    ///
    /// For [`EventType::String`] events `ev.args` must hold the string id as
    /// its only element; for [`EventType::UserLog`] events `ev.str` carries
    /// the value payload.
    pub fn encode(&mut self, ev: &Event) -> Result<(), EncodeError> {
        if let Some((kind, msg)) = &self.sticky {
            return Err(EncodeError::Io(io::Error::new(*kind, msg.clone())));
        }
        match self.encode_event(ev) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.sticky = Some((e.kind(), e.to_string()));
                Err(EncodeError::Io(e))
            }
        }
    }

    /// Consumes the encoder, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.w
    }

    fn encode_event(&mut self, ev: &Event) -> io::Result<()> {
        if !self.header_written {
            self.w.write_all(&HEADER)?;
            self.header_written = true;
        }

        // An empty argument list takes the packed form, which represents it
        // unambiguously as a zero-length block.
        let narg: u8 = match ev.args.len() {
            0 => 3,
            n => (n - 1).min(3) as u8,
        };
        self.w.write_all(&[ev.typ.raw() | (narg << 6)])?;

        if ev.typ == EventType::String {
            varint::write(&mut self.w, ev.args[0])?;
            varint::write(&mut self.w, ev.str.len() as u64)?;
            self.w.write_all(&ev.str)?;
            return Ok(());
        } else if narg < 3 {
            for &arg in &ev.args {
                varint::write(&mut self.w, arg)?;
            }
        } else {
            self.buf.clear();
            for &arg in &ev.args {
                varint::write(&mut self.buf, arg)?;
            }
            if ev.typ == EventType::Stack {
                // The runtime pads stack length prefixes to 10 bytes so it
                // can patch them in place; reproduce that for byte-exact
                // round trips.
                varint::write_padded(&mut self.w, self.buf.len() as u64)?;
            } else {
                varint::write(&mut self.w, self.buf.len() as u64)?;
            }
            self.w.write_all(&self.buf)?;
        }

        if ev.typ == EventType::UserLog {
            varint::write(&mut self.w, ev.str.len() as u64)?;
            self.w.write_all(&ev.str)?;
        }

        Ok(())
    }
}
