//! The kernel: thread pool, ready queue and dispatch.
//!
//! Scheduling is cooperative. The running thread keeps the core until it
//! blocks on a contended mutex, hands a mutex over with `unlock`, yields, or
//! returns from its entry function. Interrupt handlers run on top of whatever
//! thread they interrupted and may switch threads through `unlock` and
//! `yield_now`.
//!
//! ```no_run
//! use coop_threads::{Kernel, Mutex, SoftMask};
//!
//! static KERNEL: Kernel<SoftMask, 2, 4096> = Kernel::new(SoftMask::new());
//! static TICK: Mutex = Mutex::locked();
//!
//! fn worker(id: i32) {
//!     loop {
//!         KERNEL.lock(&TICK);
//!         // one unit of work per tick
//!         let _ = id;
//!     }
//! }
//!
//! KERNEL.spawn(worker, 0);
//! // the bootstrap thread is a thread like any other
//! KERNEL.interrupt(|k| {
//!     k.unlock(&TICK);
//!     k.yield_now();
//! });
//! ```

use core::cell::UnsafeCell;
use core::mem;
use core::ptr::addr_of_mut;

use log::{debug, trace};

use crate::arch::Arch;
use crate::context::{self, Context};
use crate::error::{fault, Fault, SpawnError};
use crate::mutex::Mutex;
use crate::thread::{Stack, Tcb, ThreadId, ThreadState, MIN_STACK_SIZE};
use crate::thread_list::{Discipline, Links, ThreadList};

pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_STACK_SIZE: usize = 1024;

/// A cooperative kernel with `N` threads of `STACK` bytes of stack each, on
/// top of the thread the program started on.
///
/// The kernel has to live in a `static`: spawned threads keep pointers into
/// it. It assumes a single core; all shared state is protected by masking
/// interrupts through `A`.
pub struct Kernel<A: Arch, const N: usize = DEFAULT_THREADS, const STACK: usize = DEFAULT_STACK_SIZE>
{
    arch: A,
    discipline: Discipline,
    state: UnsafeCell<State<N>>,
    stacks: UnsafeCell<[Stack<STACK>; N]>,
}

// every access to `state` happens with interrupts masked on the one core
unsafe impl<A: Arch + Sync, const N: usize, const STACK: usize> Sync for Kernel<A, N, STACK> {}

struct State<const N: usize> {
    initialized: bool,
    current: ThreadId,
    free: ThreadList,
    ready: ThreadList,
    pool: Pool<N>,
}

struct Pool<const N: usize> {
    threads: [Tcb; N],
    bootstrap: Tcb,
}

impl<const N: usize> Pool<N> {
    fn tcb_mut(&mut self, thread: ThreadId) -> &mut Tcb {
        if thread.is_bootstrap() {
            &mut self.bootstrap
        } else {
            &mut self.threads[thread.index()]
        }
    }

    /// # Safety
    /// `pool` must be valid for writes.
    unsafe fn context_ptr(pool: *mut Self, thread: ThreadId) -> *mut Context {
        if thread.is_bootstrap() {
            addr_of_mut!((*pool).bootstrap.context)
        } else {
            addr_of_mut!((*pool).threads[thread.index()].context)
        }
    }
}

impl<const N: usize> Links for Pool<N> {
    fn next_mut(&mut self, thread: ThreadId) -> &mut Option<ThreadId> {
        &mut self.tcb_mut(thread).next
    }
}

impl<A: Arch, const N: usize, const STACK: usize> Kernel<A, N, STACK> {
    /// A kernel whose queues hand out the most recently queued thread first.
    pub const fn new(arch: A) -> Self {
        Self::with_discipline(arch, Discipline::Lifo)
    }

    pub const fn with_discipline(arch: A, discipline: Discipline) -> Self {
        assert!(N > 0 && N < u8::MAX as usize, "thread pool size must be in 1..=254");
        assert!(STACK >= MIN_STACK_SIZE, "thread stack size below MIN_STACK_SIZE");

        Kernel {
            arch,
            discipline,
            state: UnsafeCell::new(State {
                initialized: false,
                current: ThreadId::BOOTSTRAP,
                free: ThreadList::new(),
                ready: ThreadList::new(),
                pool: Pool {
                    threads: [const { Tcb::new(ThreadState::Free) }; N],
                    bootstrap: Tcb::new(ThreadState::Running),
                },
            }),
            stacks: UnsafeCell::new([const { Stack::EMPTY }; N]),
        }
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Creates a thread that will run `entry(arg)` on its own stack.
    ///
    /// The thread is queued as ready but does not run before it is
    /// dispatched. When `entry` returns, the thread's control block goes back
    /// to the pool.
    ///
    /// # Panics
    /// Halts the kernel if every thread control block is in use.
    pub fn spawn(&'static self, entry: fn(i32), arg: i32) {
        if let Err(err) = self.try_spawn(entry, arg) {
            fault(err.into());
        }
    }

    /// Like [`spawn`](Self::spawn), but reports an exhausted pool instead of
    /// halting.
    pub fn try_spawn(&'static self, entry: fn(i32), arg: i32) -> Result<ThreadId, SpawnError> {
        let was_masked = self.arch.mask();
        let spawned = unsafe { self.spawn_masked(entry, arg) };
        self.arch.restore(was_masked);
        spawned
    }

    unsafe fn spawn_masked(&'static self, entry: fn(i32), arg: i32) -> Result<ThreadId, SpawnError> {
        self.initialize();

        let state = self.state();
        let thread = state
            .free
            .pop(&mut state.pool)
            .ok_or(SpawnError::PoolExhausted)?;

        let stack_top = Stack::top(self.stack(thread));
        let tcb = state.pool.tcb_mut(thread);
        tcb.entry = Some(entry);
        tcb.arg = arg;
        tcb.in_interrupt = false;
        tcb.state = ThreadState::Ready;
        // the first switch to this context lands in `trampoline` on the
        // thread's own stack, not back in here
        tcb.context
            .prepare(stack_top, Self::trampoline, self as *const Self as usize);

        state.ready.push(&mut state.pool, thread, self.discipline);
        debug!("spawned thread {} with argument {}", thread, arg);
        Ok(thread)
    }

    /// Gives other ready threads a chance to run.
    ///
    /// The caller goes back into the ready queue and the queue's next thread
    /// is dispatched. With [`Discipline::Lifo`] that is the caller itself, so
    /// the call returns straight away. Interrupt handlers call this after an
    /// `unlock` to reschedule before returning.
    ///
    /// The interrupt mask comes back the way the caller had it: masked in a
    /// handler, unmasked in a thread. It is not left masked for a thread.
    pub fn yield_now(&self) {
        let was_masked = self.arch.mask();
        unsafe {
            let state = self.state();
            let current = state.current;
            state.pool.tcb_mut(current).state = ThreadState::Ready;
            state.ready.push(&mut state.pool, current, self.discipline);

            let next = self.next_ready();
            self.dispatch(next);
        }
        self.arch.restore(was_masked);
    }

    /// Takes `mutex`, waiting in its queue while someone else has it.
    ///
    /// Returns with the caller's interrupt mask restored rather than always
    /// unmasked, so a masked section may take an uncontended mutex.
    ///
    /// # Panics
    /// Halts the kernel if the mutex is held and no other thread is ready,
    /// or if called from an interrupt handler on a held mutex.
    pub fn lock(&self, mutex: &Mutex) {
        let was_masked = self.arch.mask();
        unsafe {
            let lock = mutex.state();
            if !lock.locked {
                lock.locked = true;
            } else {
                let state = self.state();
                let current = state.current;
                let tcb = state.pool.tcb_mut(current);
                if tcb.in_interrupt {
                    fault(Fault::BlockedInInterrupt);
                }
                tcb.state = ThreadState::Blocked;
                lock.waiters.push(&mut state.pool, current, self.discipline);
                trace!("thread {} waits for a mutex", current);

                let next = self.next_ready();
                self.dispatch(next);
                // we own the mutex now, `unlock` handed it over
            }
        }
        self.arch.restore(was_masked);
    }

    /// Takes `mutex` if nobody holds it. Never blocks.
    pub fn try_lock(&self, mutex: &Mutex) -> bool {
        let was_masked = self.arch.mask();
        let taken = unsafe {
            let lock = mutex.state();
            !mem::replace(&mut lock.locked, true)
        };
        self.arch.restore(was_masked);
        taken
    }

    /// Releases `mutex`.
    ///
    /// If threads are waiting, the next one gets the mutex directly (it stays
    /// locked) and runs immediately; the caller is queued as ready and
    /// returns from here once it is dispatched again. Unlocking an unlocked
    /// mutex does nothing.
    pub fn unlock(&self, mutex: &Mutex) {
        let was_masked = self.arch.mask();
        unsafe {
            let state = self.state();
            let lock = mutex.state();
            match lock.waiters.pop(&mut state.pool) {
                Some(waiter) => {
                    let current = state.current;
                    state.pool.tcb_mut(current).state = ThreadState::Ready;
                    state.ready.push(&mut state.pool, current, self.discipline);
                    trace!("thread {} hands a mutex to {}", current, waiter);
                    self.dispatch(waiter);
                }
                None => lock.locked = false,
            }
        }
        self.arch.restore(was_masked);
    }

    /// Runs an interrupt handler.
    ///
    /// Call this first thing in the hardware handler. `handler` runs with
    /// interrupts masked and may `unlock`, `try_lock` and `yield_now`, but
    /// must not wait on a held mutex.
    pub fn interrupt<F: FnOnce(&Self)>(&self, handler: F) {
        let was_masked = self.arch.mask();
        let (thread, nested) = unsafe {
            let state = self.state();
            let thread = state.current;
            let tcb = state.pool.tcb_mut(thread);
            (thread, mem::replace(&mut tcb.in_interrupt, true))
        };

        handler(self);

        unsafe {
            let state = self.state();
            debug_assert_eq!(state.current, thread);
            state.pool.tcb_mut(thread).in_interrupt = nested;
        }
        self.arch.restore(was_masked);
    }

    /// The running thread.
    pub fn current(&self) -> ThreadId {
        self.with_state(|state| state.current)
    }

    /// # Panics
    /// If `thread` does not belong to this kernel.
    pub fn thread_state(&self, thread: ThreadId) -> ThreadState {
        self.with_state(|state| state.pool.tcb_mut(thread).state)
    }

    /// Every thread control block of this kernel: the pool in order, then
    /// the bootstrap thread.
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> {
        (0..N)
            .map(|index| ThreadId::new(index as u8))
            .chain(core::iter::once(ThreadId::BOOTSTRAP))
    }

    /// Thread control blocks available to `spawn`.
    pub fn free_threads(&self) -> usize {
        self.with_state(|state| {
            if state.initialized {
                state.free.len()
            } else {
                N
            }
        })
    }

    /// Threads waiting in the ready queue, not counting the running one.
    pub fn ready_threads(&self) -> usize {
        self.with_state(|state| state.ready.len())
    }

    /// Deepest use of a pool thread's stack so far, in bytes.
    ///
    /// `None` for the bootstrap thread, whose stack the kernel does not own,
    /// and before the first `spawn`.
    pub fn stack_usage(&self, thread: ThreadId) -> Option<usize> {
        if thread.is_bootstrap() || thread.index() >= N {
            return None;
        }
        let initialized = self.with_state(|state| state.initialized);
        // safety: only reads bytes, the stack outlives the kernel's users
        initialized.then(|| unsafe { Stack::high_water(self.stack(thread)) })
    }

    /// Sets up the free queue on first use. The bootstrap thread is already
    /// `current`.
    unsafe fn initialize(&self) {
        let state = self.state();
        if state.initialized {
            return;
        }
        // queued in reverse so that thread 0 is handed out first
        for index in (0..N).rev() {
            let thread = ThreadId::new(index as u8);
            state.free.push(&mut state.pool, thread, Discipline::Lifo);
            Stack::paint(self.stack(thread));
        }
        state.initialized = true;
        debug!("kernel initialized: {} threads, {} byte stacks", N, STACK);
    }

    /// Entry of every spawned thread, running on the thread's own stack.
    unsafe extern "C" fn trampoline(kernel: usize) -> ! {
        let kernel = &*(kernel as *const Self);

        // we arrive here from a dispatch, so interrupts are masked
        let (entry, arg) = {
            let state = kernel.state();
            let tcb = state.pool.tcb_mut(state.current);
            (tcb.entry, tcb.arg)
        };
        kernel.arch.unmask();

        if let Some(entry) = entry {
            entry(arg);
        }

        kernel.arch.mask();
        kernel.exit()
    }

    /// Returns the running thread to the pool and dispatches the next one.
    unsafe fn exit(&self) -> ! {
        let state = self.state();
        let thread = state.current;
        let tcb = state.pool.tcb_mut(thread);
        tcb.entry = None;
        tcb.state = ThreadState::Free;
        state.free.push(&mut state.pool, thread, Discipline::Lifo);
        debug!("thread {} finished", thread);

        let next = self.next_ready();
        self.dispatch(next);
        unreachable!("finished thread {} was resumed", thread)
    }

    /// Takes the next thread off the ready queue.
    ///
    /// # Safety
    /// Interrupts must be masked.
    unsafe fn next_ready(&self) -> ThreadId {
        let state = self.state();
        match state.ready.pop(&mut state.pool) {
            Some(thread) => thread,
            None => fault(Fault::NoReadyThread),
        }
    }

    /// Saves the running thread and resumes `next`.
    ///
    /// Returns when the saved thread is dispatched again.
    ///
    /// # Safety
    /// Interrupts must be masked. `next` must already be out of whatever
    /// queue held it, and the running thread must already be queued wherever
    /// it belongs.
    unsafe fn dispatch(&self, next: ThreadId) {
        let state = self.state.get();
        let prev = mem::replace(&mut (*state).current, next);
        (*state).pool.tcb_mut(next).state = ThreadState::Running;
        trace!("dispatch {} -> {}", prev, next);

        let pool = addr_of_mut!((*state).pool);
        let from = Pool::context_ptr(pool, prev);
        let to = Pool::context_ptr(pool, next);
        context::switch(from, to);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<N>) -> R) -> R {
        let was_masked = self.arch.mask();
        let result = unsafe { f(self.state()) };
        self.arch.restore(was_masked);
        result
    }

    /// # Safety
    /// Interrupts must be masked and no other reference to the state alive.
    #[allow(clippy::mut_from_ref)]
    unsafe fn state(&self) -> &mut State<N> {
        &mut *self.state.get()
    }

    fn stack(&self, thread: ThreadId) -> *mut Stack<STACK> {
        (self.stacks.get() as *mut Stack<STACK>).wrapping_add(thread.index())
    }
}
