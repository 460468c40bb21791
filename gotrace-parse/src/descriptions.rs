//! Static argument metadata for every event kind.
//!
//! The wire format stores arguments positionally; this table names them and
//! records which events carry a trailing stack id, so consumers can find the
//! goroutine or stack arguments of an event without hardcoding offsets.

use gotrace_format::EventType;

/// Argument metadata for one event kind. `args` names the arguments that
/// remain after the leading tick delta and, when `stack` is set, the
/// trailing stack id have been stripped by the parser. `str_args` names
/// string values resolved out of band (dictionary references or inline
/// payloads).
pub struct EventDescription {
    pub stack: bool,
    pub args: &'static [&'static str],
    pub str_args: &'static [&'static str],
}

/// Returns the description for `typ`.
pub fn description(typ: EventType) -> &'static EventDescription {
    &DESCRIPTIONS[typ.raw() as usize]
}

const fn desc(
    stack: bool,
    args: &'static [&'static str],
    str_args: &'static [&'static str],
) -> EventDescription {
    EventDescription {
        stack,
        args,
        str_args,
    }
}

static DESCRIPTIONS: [EventDescription; EventType::COUNT as usize] = [
    desc(false, &[], &[]),                            // None
    desc(false, &["p", "ticks"], &[]),                // Batch
    desc(false, &["freq"], &[]),                      // Frequency
    desc(false, &["id", "siz"], &[]),                 // Stack
    desc(true, &["procs"], &[]),                      // Gomaxprocs
    desc(false, &["thread"], &[]),                    // ProcStart
    desc(false, &[], &[]),                            // ProcStop
    desc(true, &["seq"], &[]),                        // GcStart
    desc(false, &[], &[]),                            // GcDone
    desc(false, &["kindid"], &["kind"]),              // GcStwStart
    desc(false, &[], &[]),                            // GcStwDone
    desc(true, &[], &[]),                             // GcSweepStart
    desc(false, &["swept", "reclaimed"], &[]),        // GcSweepDone
    desc(true, &["g", "stack"], &[]),                 // GoCreate
    desc(false, &["g", "seq"], &[]),                  // GoStart
    desc(false, &[], &[]),                            // GoEnd
    desc(true, &[], &[]),                             // GoStop
    desc(true, &[], &[]),                             // GoSched
    desc(true, &[], &[]),                             // GoPreempt
    desc(true, &[], &[]),                             // GoSleep
    desc(true, &[], &[]),                             // GoBlock
    desc(true, &["g", "seq"], &[]),                   // GoUnblock
    desc(true, &[], &[]),                             // GoBlockSend
    desc(true, &[], &[]),                             // GoBlockRecv
    desc(true, &[], &[]),                             // GoBlockSelect
    desc(true, &[], &[]),                             // GoBlockSync
    desc(true, &[], &[]),                             // GoBlockCond
    desc(true, &[], &[]),                             // GoBlockNet
    desc(true, &[], &[]),                             // GoSysCall
    desc(false, &["g", "seq", "ts"], &[]),            // GoSysExit
    desc(false, &[], &[]),                            // GoSysBlock
    desc(false, &["g"], &[]),                         // GoWaiting
    desc(false, &["g"], &[]),                         // GoInSyscall
    desc(false, &["mem"], &[]),                       // HeapAlloc
    desc(false, &["mem"], &[]),                       // HeapGoal
    desc(false, &["g"], &[]),                         // TimerGoroutine
    desc(false, &[], &[]),                            // FutileWakeup
    desc(false, &[], &[]),                            // String
    desc(false, &["g"], &[]),                         // GoStartLocal
    desc(true, &["g"], &[]),                          // GoUnblockLocal
    desc(false, &["g", "ts"], &[]),                   // GoSysExitLocal
    desc(false, &["g", "seq", "labelid"], &["label"]), // GoStartLabel
    desc(true, &[], &[]),                             // GoBlockGc
    desc(true, &[], &[]),                             // GcMarkAssistStart
    desc(false, &[], &[]),                            // GcMarkAssistDone
    desc(true, &["taskid", "pid", "typeid"], &["name"]), // UserTaskCreate
    desc(true, &["taskid"], &[]),                     // UserTaskEnd
    desc(true, &["taskid", "mode", "typeid"], &["name"]), // UserRegion
    desc(true, &["id", "keyid"], &["category", "message"]), // UserLog
    desc(true, &["ts", "p", "g"], &[]),               // CpuSample
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_dense() {
        for raw in 0..EventType::COUNT {
            let typ = EventType::from_raw(raw).unwrap();
            // Every kind resolves without panicking.
            let _ = description(typ);
        }
        assert!(description(EventType::GoCreate).stack);
        assert_eq!(description(EventType::GoUnblock).args, ["g", "seq"]);
        assert_eq!(
            description(EventType::UserLog).str_args,
            ["category", "message"]
        );
    }
}
