//! Conversion of a trace into a sampled wall-clock pprof profile.
//!
//! A per-goroutine scheduling state machine attributes every interval of a
//! goroutine's life to its scheduling state and the stack it held when it
//! entered that state. Intervals aggregate into one pprof sample per
//! (state, stack) pair, labelled with the state name. Time spent running is
//! not attributed directly; instead the trace's CPU samples split the total
//! running time uniformly between them, which reconstructs where the
//! running time actually went.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};

use gotrace_format::EventType;
use gotrace_parse::{parse, Event, ParseError, Trace};
use pprof_format::{Function, Label, Line, Location, Profile, Sample, StringTable, ValueType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("cannot profile a trace without events")]
    EmptyTrace,

    #[error("goroutine {g}: expected state {want}, got {got}: {event}")]
    BadTransition {
        g: u64,
        want: SchedState,
        got: SchedState,
        event: String,
    },

    #[error("goroutine {g}: no stack: {event}")]
    NoStack { g: u64, event: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scheduling states of a goroutine as far as the profile is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedState {
    Init,
    Runnable,
    Running,
    Waiting,
}

impl SchedState {
    fn as_str(self) -> &'static str {
        match self {
            SchedState::Init => "init",
            SchedState::Runnable => "runnable",
            SchedState::Running => "running",
            SchedState::Waiting => "waiting",
        }
    }
}

impl fmt::Display for SchedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-goroutine machine state: current sched state, when it was entered,
/// and the stack held at that point.
#[derive(Debug, Clone, Copy)]
struct GState {
    sched: SchedState,
    since: i64,
    stack: Option<u64>,
}

impl Default for GState {
    fn default() -> Self {
        // Stack id 0 is the empty stack; a goroutine first observed without
        // an explicit stack attributes to it.
        GState {
            sched: SchedState::Init,
            since: 0,
            stack: Some(0),
        }
    }
}

/// Reads a trace from `r` and writes it to `w` as a pprof profile with a
/// single `wall-time/nanoseconds` sample type.
pub fn convert<R: Read, W: Write>(r: R, w: &mut W) -> Result<(), ProfileError> {
    let trace = parse(r)?;
    let profile = build(&trace)?;
    profile.write_to(w)?;
    Ok(())
}

/// Builds the pprof profile for an already-parsed trace.
pub fn build(trace: &Trace) -> Result<Profile, ProfileError> {
    let (first, last) = match (trace.events.first(), trace.events.last()) {
        (Some(first), Some(last)) => (first.ts, last.ts),
        _ => return Err(ProfileError::EmptyTrace),
    };

    let mut builder = Builder::new(trace);
    let mut gstates: HashMap<u64, GState> = HashMap::new();
    let mut cpu_samples: i64 = 0;

    for e in &trace.events {
        // The create/unblock family reports on another goroutine, named by
        // the first argument rather than the event's own context.
        let g = match e.typ {
            EventType::GoCreate
            | EventType::GoUnblock
            | EventType::GoUnblockLocal
            | EventType::GoSysExit
            | EventType::GoSysExitLocal => e.args[0],
            _ => e.g,
        };
        let mut s = gstates.get(&g).copied().unwrap_or_default();

        use SchedState::*;
        match e.typ {
            EventType::GoCreate => {
                s = builder.transition(s, Init, Runnable, g, e)?;
                s.stack = Some(e.args[1]);
            }
            EventType::GoStart | EventType::GoStartLocal | EventType::GoStartLabel => {
                s = builder.transition(s, Runnable, Running, g, e)?;
            }
            EventType::GoSysCall => {
                // The goroutine keeps running through a syscall; only the
                // stack moves.
                s.stack = Some(e.stk_id.into());
            }
            EventType::GoSched | EventType::GoPreempt => {
                s = builder.transition(s, Running, Runnable, g, e)?;
                s.stack = Some(e.stk_id.into());
            }
            EventType::GoBlock
            | EventType::GoBlockSend
            | EventType::GoBlockRecv
            | EventType::GoBlockSelect
            | EventType::GoBlockSync
            | EventType::GoBlockCond
            | EventType::GoBlockNet
            | EventType::GoBlockGc
            | EventType::GoSysBlock
            | EventType::GoSleep => {
                s = builder.transition(s, Running, Waiting, g, e)?;
                if e.typ != EventType::GoSysBlock {
                    s.stack = Some(e.stk_id.into());
                }
            }
            EventType::GoUnblock
            | EventType::GoUnblockLocal
            | EventType::GoSysExit
            | EventType::GoSysExitLocal => {
                s = builder.transition(s, Waiting, Runnable, g, e)?;
            }
            EventType::GoWaiting | EventType::GoInSyscall => {
                s = builder.transition(s, Runnable, Waiting, g, e)?;
            }
            EventType::CpuSample => {
                cpu_samples += 1;
                continue;
            }
            _ => continue,
        }
        gstates.insert(g, s);
    }

    // Split the total observed running time uniformly across the CPU
    // samples; each one lands in the running bucket of its stack.
    if cpu_samples > 0 {
        let weight = builder.total_running / cpu_samples;
        for e in &trace.events {
            if e.typ == EventType::CpuSample {
                builder.add_sample(e.stk_id.into(), SchedState::Running, weight);
            }
        }
    }

    tracing::debug!(
        samples = builder.samples.len(),
        cpu_samples,
        running_ns = builder.total_running,
        "built profile"
    );

    Ok(builder.finish(last - first))
}

struct Builder<'a> {
    trace: &'a Trace,
    strings: StringTable,
    state_key: i64,
    total_running: i64,

    samples: Vec<Sample>,
    sample_idx: HashMap<(SchedState, u64), usize>,

    locations: Vec<Location>,
    location_idx: HashMap<u64, u64>,
    stack_locations: HashMap<u64, Vec<u64>>,

    functions: Vec<Function>,
    function_idx: HashMap<(String, String), u64>,
}

impl<'a> Builder<'a> {
    fn new(trace: &'a Trace) -> Self {
        let mut strings = StringTable::new();
        let state_key = strings.intern("state");
        Builder {
            trace,
            strings,
            state_key,
            total_running: 0,
            samples: Vec::new(),
            sample_idx: HashMap::new(),
            locations: Vec::new(),
            location_idx: HashMap::new(),
            stack_locations: HashMap::new(),
            functions: Vec::new(),
            function_idx: HashMap::new(),
        }
    }

    /// Moves a goroutine from `from` to `to`, attributing the time spent in
    /// the prior state.
    fn transition(
        &mut self,
        mut s: GState,
        from: SchedState,
        to: SchedState,
        g: u64,
        e: &Event,
    ) -> Result<GState, ProfileError> {
        if s.sched != from {
            return Err(ProfileError::BadTransition {
                g,
                want: from,
                got: s.sched,
                event: e.to_string(),
            });
        }
        let Some(stack) = s.stack else {
            return Err(ProfileError::NoStack {
                g,
                event: e.to_string(),
            });
        };

        let dt = e.ts - s.since;
        if s.sched == SchedState::Running {
            // Running time is reconstructed from CPU samples afterwards.
            self.total_running += dt;
        } else if s.sched != SchedState::Init {
            self.add_sample(stack, s.sched, dt);
        }

        s.sched = to;
        s.since = e.ts;
        Ok(s)
    }

    fn add_sample(&mut self, stack: u64, state: SchedState, dt: i64) {
        let key = (state, stack);
        let idx = match self.sample_idx.get(&key) {
            Some(&idx) => idx,
            None => {
                let location_id = self.stack_location_ids(stack);
                let label = Label {
                    key: self.state_key,
                    str: self.strings.intern(state.as_str()),
                    num: 0,
                    num_unit: 0,
                };
                self.samples.push(Sample {
                    location_id,
                    value: vec![0],
                    label: vec![label],
                });
                let idx = self.samples.len() - 1;
                self.sample_idx.insert(key, idx);
                idx
            }
        };
        self.samples[idx].value[0] += dt;
    }

    /// Location ids of a stack's frames, trampoline frames dropped.
    fn stack_location_ids(&mut self, stack: u64) -> Vec<u64> {
        if let Some(ids) = self.stack_locations.get(&stack) {
            return ids.clone();
        }
        let mut ids = Vec::new();
        for &pc in self.trace.stack(stack as u32) {
            let id = self.location_id(pc);
            let func = self
                .trace
                .pcs
                .get(&pc)
                .map(|frame| frame.func.as_str())
                .unwrap_or("");
            if !is_trampoline(func) {
                ids.push(id);
            }
        }
        self.stack_locations.insert(stack, ids.clone());
        ids
    }

    fn location_id(&mut self, pc: u64) -> u64 {
        if let Some(&id) = self.location_idx.get(&pc) {
            return id;
        }
        let frame = self.trace.pcs.get(&pc).cloned().unwrap_or_default();
        let function_id = self.function_id(&frame.func, &frame.file);
        let id = self.locations.len() as u64 + 1;
        self.locations.push(Location {
            id,
            mapping_id: 0,
            address: pc,
            line: vec![Line {
                function_id,
                line: frame.line as i64,
            }],
            is_folded: false,
        });
        self.location_idx.insert(pc, id);
        id
    }

    fn function_id(&mut self, name: &str, file: &str) -> u64 {
        let key = (name.to_owned(), file.to_owned());
        if let Some(&id) = self.function_idx.get(&key) {
            return id;
        }
        let id = self.functions.len() as u64 + 1;
        let name_idx = self.strings.intern(name);
        self.functions.push(Function {
            id,
            name: name_idx,
            system_name: name_idx,
            filename: self.strings.intern(file),
            start_line: 0,
        });
        self.function_idx.insert(key, id);
        id
    }

    fn finish(mut self, duration_nanos: i64) -> Profile {
        let wall = self.strings.intern("wall-time");
        let nanos = self.strings.intern("nanoseconds");
        Profile {
            sample_type: vec![ValueType {
                r#type: wall,
                unit: nanos,
            }],
            default_sample_type: wall,
            duration_nanos,
            sample: self.samples,
            location: self.locations,
            function: self.functions,
            string_table: self.strings.finish(),
            ..Default::default()
        }
    }
}

/// Frames that bracket every goroutine stack without saying anything about
/// it.
fn is_trampoline(func: &str) -> bool {
    matches!(func, "runtime.goexit" | "runtime.main")
}
