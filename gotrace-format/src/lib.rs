//! # Go Trace Format
//!
//! This crate provides a streaming decoder and encoder for the binary trace
//! format emitted by the Go runtime's execution tracer (`runtime/trace`),
//! version 1.19 of the wire format.
//!
//! ## Format Overview
//!
//! A trace file starts with a fixed 16-byte header (`"go 1.19 trace"` padded
//! with NUL bytes) followed by a flat sequence of event records. Each record
//! begins with a single byte that packs the event type into its low 6 bits
//! and an inline-argument count code into its high 2 bits:
//!
//! - an argument count code below 3 means the arguments follow directly as
//!   base-128 varints,
//! - code 3 means the arguments are "packed": a varint byte length followed
//!   by that many bytes of concatenated varints,
//! - [`EventType::String`] records carry a varint string id followed by a
//!   length-prefixed byte payload instead,
//! - [`EventType::UserLog`] records append a trailing length-prefixed byte
//!   payload after their regular arguments.
//!
//! The one irregularity worth knowing about: the runtime writes the packed
//! byte length of [`EventType::Stack`] records as a fixed-width 10-byte
//! varint so it can patch the length after the fact. [`Encoder`] reproduces
//! that quirk, which makes a decode→encode round trip byte-identical to its
//! input.
//!
//! ## Usage
//!
//! [`Decoder::decode`] fills a caller-supplied [`Event`] so the argument and
//! string buffers are reused across records; a steady-state decode loop does
//! not allocate.

mod decoder;
mod encoder;
mod error;
mod event;
pub mod varint;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{DecodeError, EncodeError};
pub use event::{Event, EventType};

/// Version number encoded in a `go 1.19 trace` header.
pub const VERSION_GO_1_19: u16 = 1019;

/// Version number encoded in a `go 1.21 trace` header. The framing of 1.21
/// traces is not understood by [`Decoder`]; the version is accepted only so
/// stop-the-world kind tables can be resolved against it.
pub const VERSION_GO_1_21: u16 = 1021;
