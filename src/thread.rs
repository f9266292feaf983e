use core::{fmt, ptr};

use crate::context::Context;

/// Smallest private stack the kernel accepts, in bytes.
pub const MIN_STACK_SIZE: usize = 256;

/// Byte the private stacks are filled with before first use.
pub(crate) const STACK_PAINT: u8 = 0xA5;

const BOOTSTRAP_INDEX: u8 = u8::MAX;

/// Handle to one thread control block.
///
/// Pool threads are numbered from zero. The bootstrap thread, the context the
/// program was started on, has an id of its own.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(u8);

impl ThreadId {
    pub const BOOTSTRAP: ThreadId = ThreadId(BOOTSTRAP_INDEX);

    pub(crate) const fn new(index: u8) -> Self {
        ThreadId(index)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    pub fn is_bootstrap(&self) -> bool {
        self.0 == BOOTSTRAP_INDEX
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bootstrap() {
            f.write_str("bootstrap")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Where a thread control block currently is.
///
/// A block is in at most one queue, and never queued while it is running.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ThreadState {
    /// In the free queue, no thread attached.
    Free,
    /// In the ready queue.
    Ready,
    /// The thread that is executing.
    Running,
    /// In the wait queue of a mutex.
    Blocked,
}

/// Thread control block.
pub(crate) struct Tcb {
    pub entry: Option<fn(i32)>,
    pub arg: i32,
    /// Queue link. Only meaningful while the block sits in a queue.
    pub next: Option<ThreadId>,
    pub state: ThreadState,
    /// Set while an interrupt handler runs on top of this thread.
    pub in_interrupt: bool,
    pub context: Context,
}

impl Tcb {
    pub const fn new(state: ThreadState) -> Self {
        Tcb {
            entry: None,
            arg: 0,
            next: None,
            state,
            in_interrupt: false,
            context: Context::new(),
        }
    }
}

/// Private stack of one pool thread.
///
/// Only ever touched through raw pointers: while a thread runs, its frames
/// live in here.
#[repr(C, align(16))]
pub(crate) struct Stack<const SIZE: usize>([u8; SIZE]);

impl<const SIZE: usize> Stack<SIZE> {
    pub const EMPTY: Stack<SIZE> = Stack([0; SIZE]);

    /// # Safety
    /// No thread may be running on the stack.
    pub unsafe fn paint(stack: *mut Self) {
        ptr::write_bytes(stack as *mut u8, STACK_PAINT, SIZE);
    }

    /// One past the highest address of the stack.
    pub fn top(stack: *mut Self) -> *mut u8 {
        (stack as *mut u8).wrapping_add(SIZE)
    }

    /// Bytes that have been written since the stack was painted.
    ///
    /// Stacks grow down, so the untouched paint is at the bottom.
    ///
    /// # Safety
    /// `stack` must point to a live stack.
    pub unsafe fn high_water(stack: *const Self) -> usize {
        let base = stack as *const u8;
        let untouched = (0..SIZE)
            .take_while(|&i| base.add(i).read_volatile() == STACK_PAINT)
            .count();
        SIZE - untouched
    }
}
