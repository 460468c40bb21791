use std::fmt;

/// One record in the binary trace stream.
///
/// The same record is reused across [`crate::Decoder::decode`] calls; the
/// decoder truncates `args` and `str` before refilling them so their backing
/// allocations stick around at the high-water mark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// The event kind from the low 6 bits of the record's first byte.
    pub typ: EventType,
    /// Raw unsigned arguments in wire order. For most events the first
    /// argument is a tick-delta timestamp relative to the enclosing batch.
    pub args: Vec<u64>,
    /// Byte payload. Non-empty only for [`EventType::String`] (the string
    /// table entry) and [`EventType::UserLog`] (the logged value).
    pub str: Vec<u8>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Event kinds of the 1.19 trace format. The wire encoding reserves 6 bits
/// for the type, so values range over `0..=63`; only `0..=49` are assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventType {
    /// Unused.
    #[default]
    None = 0,
    /// Start of a per-P batch of events [pid, timestamp].
    Batch = 1,
    /// Tracer timer frequency [frequency (ticks per second)].
    Frequency = 2,
    /// Stack table entry [stack id, number of PCs, {PC, func string id, file string id, line}...].
    Stack = 3,
    /// Current value of GOMAXPROCS [timestamp, GOMAXPROCS, stack id].
    Gomaxprocs = 4,
    /// Start of a P [timestamp, thread id].
    ProcStart = 5,
    /// Stop of a P [timestamp].
    ProcStop = 6,
    /// GC start [timestamp, seq, stack id].
    GcStart = 7,
    /// GC done [timestamp].
    GcDone = 8,
    /// GC stop-the-world start [timestamp, kind].
    GcStwStart = 9,
    /// GC stop-the-world done [timestamp].
    GcStwDone = 10,
    /// GC sweep start [timestamp, stack id].
    GcSweepStart = 11,
    /// GC sweep done [timestamp, swept, reclaimed].
    GcSweepDone = 12,
    /// Goroutine creation [timestamp, new goroutine id, new stack id, stack id].
    GoCreate = 13,
    /// Goroutine starts running [timestamp, goroutine id, seq].
    GoStart = 14,
    /// Goroutine ends [timestamp].
    GoEnd = 15,
    /// Goroutine stops, like in `select {}` [timestamp, stack].
    GoStop = 16,
    /// Goroutine calls Gosched [timestamp, stack].
    GoSched = 17,
    /// Goroutine is preempted [timestamp, stack].
    GoPreempt = 18,
    /// Goroutine calls Sleep [timestamp, stack].
    GoSleep = 19,
    /// Goroutine blocks [timestamp, stack].
    GoBlock = 20,
    /// Goroutine is unblocked [timestamp, goroutine id, seq, stack].
    GoUnblock = 21,
    /// Goroutine blocks on chan send [timestamp, stack].
    GoBlockSend = 22,
    /// Goroutine blocks on chan recv [timestamp, stack].
    GoBlockRecv = 23,
    /// Goroutine blocks on select [timestamp, stack].
    GoBlockSelect = 24,
    /// Goroutine blocks on Mutex/RWMutex [timestamp, stack].
    GoBlockSync = 25,
    /// Goroutine blocks on Cond [timestamp, stack].
    GoBlockCond = 26,
    /// Goroutine blocks on network [timestamp, stack].
    GoBlockNet = 27,
    /// Syscall enter [timestamp, stack].
    GoSysCall = 28,
    /// Syscall exit [timestamp, goroutine id, seq, real timestamp].
    GoSysExit = 29,
    /// Syscall blocks [timestamp].
    GoSysBlock = 30,
    /// Goroutine is blocked when tracing starts [timestamp, goroutine id].
    GoWaiting = 31,
    /// Goroutine is in a syscall when tracing starts [timestamp, goroutine id].
    GoInSyscall = 32,
    /// Live heap change [timestamp, heap live bytes].
    HeapAlloc = 33,
    /// Heap goal change [timestamp, heap goal bytes].
    HeapGoal = 34,
    /// Not currently used; previously denoted the timer goroutine [timer goroutine id].
    TimerGoroutine = 35,
    /// The previous wakeup of this goroutine was futile [timestamp].
    FutileWakeup = 36,
    /// String table entry [id, length, string].
    String = 37,
    /// Goroutine starts running on the same P as the last event [timestamp, goroutine id].
    GoStartLocal = 38,
    /// Goroutine is unblocked on the same P as the last event [timestamp, goroutine id, stack].
    GoUnblockLocal = 39,
    /// Syscall exit on the same P as the last event [timestamp, goroutine id, real timestamp].
    GoSysExitLocal = 40,
    /// Goroutine starts running with a label [timestamp, goroutine id, seq, label string id].
    GoStartLabel = 41,
    /// Goroutine blocks on GC assist [timestamp, stack].
    GoBlockGc = 42,
    /// GC mark assist start [timestamp, stack].
    GcMarkAssistStart = 43,
    /// GC mark assist done [timestamp].
    GcMarkAssistDone = 44,
    /// trace.NewTask [timestamp, task id, parent task id, stack, name string id].
    UserTaskCreate = 45,
    /// End of a task [timestamp, task id, stack].
    UserTaskEnd = 46,
    /// trace.WithRegion [timestamp, task id, mode (0 start, 1 end), stack, name string id].
    UserRegion = 47,
    /// trace.Log [timestamp, task id, key string id, stack, value string].
    UserLog = 48,
    /// CPU profiling sample [timestamp, real timestamp, real P id (-1 when absent), goroutine id, stack id].
    CpuSample = 49,
}

impl EventType {
    /// Number of assigned event kinds; valid wire tags are `1..COUNT`.
    pub const COUNT: u8 = 50;

    /// Maps a 6-bit wire tag to its event kind. Tags `50..=63` are
    /// unassigned and return `None`.
    pub fn from_raw(raw: u8) -> Option<EventType> {
        use EventType::*;
        Some(match raw {
            0 => EventType::None,
            1 => Batch,
            2 => Frequency,
            3 => Stack,
            4 => Gomaxprocs,
            5 => ProcStart,
            6 => ProcStop,
            7 => GcStart,
            8 => GcDone,
            9 => GcStwStart,
            10 => GcStwDone,
            11 => GcSweepStart,
            12 => GcSweepDone,
            13 => GoCreate,
            14 => GoStart,
            15 => GoEnd,
            16 => GoStop,
            17 => GoSched,
            18 => GoPreempt,
            19 => GoSleep,
            20 => GoBlock,
            21 => GoUnblock,
            22 => GoBlockSend,
            23 => GoBlockRecv,
            24 => GoBlockSelect,
            25 => GoBlockSync,
            26 => GoBlockCond,
            27 => GoBlockNet,
            28 => GoSysCall,
            29 => GoSysExit,
            30 => GoSysBlock,
            31 => GoWaiting,
            32 => GoInSyscall,
            33 => HeapAlloc,
            34 => HeapGoal,
            35 => TimerGoroutine,
            36 => FutileWakeup,
            37 => String,
            38 => GoStartLocal,
            39 => GoUnblockLocal,
            40 => GoSysExitLocal,
            41 => GoStartLabel,
            42 => GoBlockGc,
            43 => GcMarkAssistStart,
            44 => GcMarkAssistDone,
            45 => UserTaskCreate,
            46 => UserTaskEnd,
            47 => UserRegion,
            48 => UserLog,
            49 => CpuSample,
            _ => return Option::None,
        })
    }

    /// The 6-bit wire tag of this event kind.
    pub fn raw(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        for raw in 0..EventType::COUNT {
            let typ = EventType::from_raw(raw).unwrap();
            assert_eq!(typ.raw(), raw);
        }
        for raw in EventType::COUNT..=63 {
            assert!(EventType::from_raw(raw).is_none());
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(EventType::Batch.to_string(), "Batch");
        assert_eq!(EventType::GcStwStart.to_string(), "GcStwStart");
        assert_eq!(EventType::CpuSample.to_string(), "CpuSample");
    }
}
