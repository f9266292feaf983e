use core::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// Every thread control block is in use.
    PoolExhausted,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::PoolExhausted => f.write_str("thread pool exhausted"),
        }
    }
}

/// Conditions the kernel cannot continue from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Fault {
    PoolExhausted,
    /// Something had to be dispatched but no thread is ready.
    NoReadyThread,
    /// An interrupt handler tried to wait for a mutex.
    BlockedInInterrupt,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Fault::PoolExhausted => "kernel fault: thread pool exhausted",
            Fault::NoReadyThread => "kernel fault: no thread ready to run",
            Fault::BlockedInInterrupt => "kernel fault: interrupt handler blocked on a mutex",
        })
    }
}

impl From<SpawnError> for Fault {
    fn from(err: SpawnError) -> Self {
        match err {
            SpawnError::PoolExhausted => Fault::PoolExhausted,
        }
    }
}

/// Halts on an unrecoverable condition.
///
/// Interrupts are still masked here, so nothing touches the scheduler after
/// the panic handler takes over.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn fault(fault: Fault) -> ! {
    panic!("{}", fault)
}
