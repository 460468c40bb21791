use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    /// The first 16 bytes did not look like a trace header.
    #[error("invalid trace header {0:?}")]
    InvalidHeader(String),

    /// The header named a trace format version this decoder cannot read.
    #[error("unsupported trace version {0}")]
    UnsupportedVersion(u16),

    /// An event record used an unassigned type tag.
    #[error("invalid event type {0}")]
    InvalidEventType(u8),

    /// The input ended in the middle of a record.
    #[error("unexpected end of trace stream")]
    UnexpectedEof,

    /// The input ended cleanly at a record boundary. A signal for the
    /// caller's decode loop, not a failure.
    #[error("end of trace stream")]
    Eof,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// True for the clean end-of-stream signal that terminates a decode
    /// loop.
    pub fn is_eof(&self) -> bool {
        matches!(self, DecodeError::Eof)
    }

    pub(crate) fn from_io_mid_record(err: io::Error) -> DecodeError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::UnexpectedEof
        } else {
            DecodeError::Io(err)
        }
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error(transparent)]
    Io(#[from] io::Error),
}
