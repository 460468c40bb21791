//! Toolkit for Go runtime execution traces.
//!
//! Every operation takes a byte reader over a 1.19 trace and produces a
//! derived view of it:
//!
//! - [`anonymize`]: a re-encoded copy with host-specific strings obfuscated
//! - [`breakdown`]: per-event-type size and count statistics
//! - [`stw`]: the trace's stop-the-world pauses
//! - [`flamescope`]: CPU samples in a perf-script-like text format
//! - [`profile`]: a sampled wall-clock profile in pprof format
//! - [`print`]: parsed events and stacks as plain text
//! - [`strings`]: the raw string payloads
//!
//! The `gotrace` binary wires these up behind subcommands.

pub mod anonymize;
pub mod breakdown;
pub mod flamescope;
pub mod print;
pub mod profile;
pub mod stdlib;
pub mod strings;
pub mod stw;

mod tables;
