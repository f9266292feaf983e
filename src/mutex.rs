use core::cell::UnsafeCell;
use core::ptr;

use crate::thread_list::ThreadList;

/// A binary lock with a queue of waiting threads.
///
/// Locking and unlocking go through the kernel
/// ([`Kernel::lock`](crate::Kernel::lock),
/// [`Kernel::unlock`](crate::Kernel::unlock)). The mutex has no owner: any
/// thread or interrupt handler may unlock it, which makes a locked mutex
/// usable as a wake-up signal from an interrupt.
///
/// A mutex belongs to the one kernel whose threads wait on it.
pub struct Mutex {
    state: UnsafeCell<MutexState>,
}

pub(crate) struct MutexState {
    pub locked: bool,
    pub waiters: ThreadList,
}

// the state is only touched with interrupts masked on a single core
unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    /// An unlocked mutex nobody waits on.
    pub const fn new() -> Self {
        Self::with_locked(false)
    }

    /// A mutex that is already held, so the first `lock` blocks until
    /// someone unlocks it.
    pub const fn locked() -> Self {
        Self::with_locked(true)
    }

    const fn with_locked(locked: bool) -> Self {
        Mutex {
            state: UnsafeCell::new(MutexState {
                locked,
                waiters: ThreadList::new(),
            }),
        }
    }

    pub fn is_locked(&self) -> bool {
        // safety: a single byte read, writers run masked
        unsafe { ptr::read_volatile(ptr::addr_of!((*self.state.get()).locked)) }
    }

    /// Number of threads blocked on this mutex.
    pub fn waiters(&self) -> usize {
        // safety: as above
        unsafe { ptr::read_volatile(ptr::addr_of!((*self.state.get()).waiters)).len() }
    }

    /// # Safety
    /// Interrupts must be masked and no other reference to the state alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn state(&self) -> &mut MutexState {
        &mut *self.state.get()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
