//! Thread creation, dispatch order and thread exit.
//!
//! Every test owns a kernel. The test's own thread is the kernel's bootstrap
//! thread; it gets the core back by waiting on a locked `GATE` that the last
//! spawned thread opens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use coop_threads::{Arch, Discipline, Kernel, Mutex, SoftMask, SpawnError, ThreadId, ThreadState};

type TestKernel = Kernel<SoftMask, 4, 65536>;

#[test]
fn spawned_threads_wait_to_be_dispatched() {
    static KERNEL: TestKernel = Kernel::new(SoftMask::new());
    static RAN: AtomicBool = AtomicBool::new(false);

    fn body(_: i32) {
        RAN.store(true, Ordering::SeqCst);
    }

    assert_eq!(KERNEL.free_threads(), 4);
    let thread = KERNEL.try_spawn(body, 0).unwrap();

    assert!(!RAN.load(Ordering::SeqCst));
    assert_eq!(KERNEL.thread_state(thread), ThreadState::Ready);
    assert_eq!(KERNEL.ready_threads(), 1);
    assert_eq!(KERNEL.free_threads(), 3);
    assert_eq!(KERNEL.current(), ThreadId::BOOTSTRAP);
    assert_eq!(KERNEL.thread_state(ThreadId::BOOTSTRAP), ThreadState::Running);
    assert!(!KERNEL.arch().is_masked());
}

// The ready queue is LIFO: the most recently readied thread runs first. This
// is the kernel's default and not a fairness guarantee.
#[test]
fn lifo_ready_queue_runs_latest_spawn_first() {
    static KERNEL: TestKernel = Kernel::new(SoftMask::new());
    static GATE: Mutex = Mutex::locked();
    static SEEN: StdMutex<Vec<i32>> = StdMutex::new(Vec::new());

    fn record(arg: i32) {
        SEEN.lock().unwrap().push(arg);
    }
    fn open_gate(arg: i32) {
        record(arg);
        KERNEL.unlock(&GATE);
    }

    KERNEL.spawn(open_gate, 10);
    KERNEL.spawn(record, 20);
    KERNEL.spawn(record, 30);
    assert!(SEEN.lock().unwrap().is_empty());

    KERNEL.lock(&GATE);

    assert_eq!(*SEEN.lock().unwrap(), vec![30, 20, 10]);
    // the gate opener is parked in `unlock`, the others finished
    assert_eq!(KERNEL.ready_threads(), 1);
    assert_eq!(KERNEL.free_threads(), 3);
    assert!(GATE.is_locked());
}

#[test]
fn fifo_ready_queue_runs_oldest_spawn_first() {
    static KERNEL: TestKernel = Kernel::with_discipline(SoftMask::new(), Discipline::Fifo);
    static GATE: Mutex = Mutex::locked();
    static SEEN: StdMutex<Vec<i32>> = StdMutex::new(Vec::new());

    fn record(arg: i32) {
        SEEN.lock().unwrap().push(arg);
    }
    fn open_gate(arg: i32) {
        record(arg);
        KERNEL.unlock(&GATE);
    }

    KERNEL.spawn(record, 10);
    KERNEL.spawn(record, 20);
    KERNEL.spawn(open_gate, 30);

    KERNEL.lock(&GATE);

    assert_eq!(*SEEN.lock().unwrap(), vec![10, 20, 30]);
}

// With LIFO, `yield_now` puts the caller at the head of the ready queue and
// takes it straight back off.
#[test]
fn lifo_yield_resumes_the_caller() {
    static KERNEL: TestKernel = Kernel::new(SoftMask::new());
    static RAN: AtomicBool = AtomicBool::new(false);

    fn body(_: i32) {
        RAN.store(true, Ordering::SeqCst);
    }

    KERNEL.spawn(body, 0);
    KERNEL.yield_now();

    assert!(!RAN.load(Ordering::SeqCst));
    assert_eq!(KERNEL.current(), ThreadId::BOOTSTRAP);
    assert_eq!(KERNEL.ready_threads(), 1);
}

#[test]
fn fifo_yield_round_robins_and_keeps_locals_private() {
    static KERNEL: TestKernel = Kernel::with_discipline(SoftMask::new(), Discipline::Fifo);
    static TRACE: StdMutex<Vec<(i32, u32)>> = StdMutex::new(Vec::new());

    fn counter(id: i32) {
        // lives on this thread's stack across every switch
        let mut count = 0u32;
        for _ in 0..3 {
            count += 1;
            TRACE.lock().unwrap().push((id, count));
            KERNEL.yield_now();
        }
    }

    let a = KERNEL.try_spawn(counter, 1).unwrap();
    let b = KERNEL.try_spawn(counter, 2).unwrap();

    let mut rounds = 0;
    while KERNEL.free_threads() < 4 {
        KERNEL.yield_now();
        rounds += 1;
        assert!(rounds < 100, "threads never finished");
    }

    assert_eq!(
        *TRACE.lock().unwrap(),
        vec![(1, 1), (2, 1), (1, 2), (2, 2), (1, 3), (2, 3)]
    );
    assert_eq!(KERNEL.thread_state(a), ThreadState::Free);
    assert_eq!(KERNEL.thread_state(b), ThreadState::Free);
    assert!(KERNEL.stack_usage(a).unwrap() > 0);
    assert!(KERNEL.stack_usage(b).unwrap() > 0);
    assert_eq!(KERNEL.stack_usage(ThreadId::BOOTSTRAP), None);
}

#[test]
fn threads_start_with_interrupts_unmasked() {
    static KERNEL: TestKernel = Kernel::new(SoftMask::new());
    static GATE: Mutex = Mutex::locked();
    static MASKED: AtomicBool = AtomicBool::new(true);

    fn body(_: i32) {
        MASKED.store(KERNEL.arch().is_masked(), Ordering::SeqCst);
        KERNEL.unlock(&GATE);
    }

    KERNEL.spawn(body, 0);
    KERNEL.lock(&GATE);

    assert!(!MASKED.load(Ordering::SeqCst));
    assert!(!KERNEL.arch().is_masked());
}

#[test]
fn yield_keeps_the_callers_mask() {
    static KERNEL: TestKernel = Kernel::new(SoftMask::new());

    let was_masked = KERNEL.arch().mask();
    KERNEL.yield_now();
    assert!(KERNEL.arch().is_masked());
    KERNEL.arch().restore(was_masked);
    assert!(!KERNEL.arch().is_masked());

    // and an unmasked caller is not handed back a masked core
    KERNEL.yield_now();
    assert!(!KERNEL.arch().is_masked());
}

#[test]
fn threads_lists_the_pool_then_bootstrap() {
    static KERNEL: Kernel<SoftMask, 3, 4096> = Kernel::new(SoftMask::new());

    let raw: Vec<u8> = KERNEL.threads().map(|thread| thread.raw()).collect();
    assert_eq!(raw, vec![0, 1, 2, ThreadId::BOOTSTRAP.raw()]);
}

#[test]
fn finished_threads_return_to_the_pool() {
    static KERNEL: TestKernel = Kernel::with_discipline(SoftMask::new(), Discipline::Fifo);
    static SEEN: StdMutex<Vec<i32>> = StdMutex::new(Vec::new());

    fn record(arg: i32) {
        SEEN.lock().unwrap().push(arg);
    }

    for round in 0..3 {
        let spawned: Vec<ThreadId> = (1..=4)
            .map(|i| KERNEL.try_spawn(record, round * 10 + i).unwrap())
            .collect();
        assert_eq!(KERNEL.free_threads(), 0);

        while KERNEL.free_threads() < 4 {
            KERNEL.yield_now();
        }
        assert_eq!(KERNEL.ready_threads(), 0);
        for thread in spawned {
            assert_eq!(KERNEL.thread_state(thread), ThreadState::Free);
        }
    }

    assert_eq!(
        *SEEN.lock().unwrap(),
        vec![1, 2, 3, 4, 11, 12, 13, 14, 21, 22, 23, 24]
    );
}

#[test]
fn exhausted_pool_rejects_without_touching_threads() {
    static KERNEL: TestKernel = Kernel::new(SoftMask::new());

    fn idle(_: i32) {}

    let spawned: Vec<ThreadId> = (0..4)
        .map(|i| KERNEL.try_spawn(idle, i).unwrap())
        .collect();
    assert_eq!(KERNEL.try_spawn(idle, 4), Err(SpawnError::PoolExhausted));

    assert_eq!(KERNEL.ready_threads(), 4);
    for thread in spawned {
        assert_eq!(KERNEL.thread_state(thread), ThreadState::Ready);
    }
    assert!(!KERNEL.arch().is_masked());
}

#[test]
#[should_panic(expected = "thread pool exhausted")]
fn spawn_past_the_pool_halts() {
    static KERNEL: Kernel<SoftMask, 2, 4096> = Kernel::new(SoftMask::new());

    fn idle(_: i32) {}

    KERNEL.spawn(idle, 0);
    KERNEL.spawn(idle, 1);
    KERNEL.spawn(idle, 2);
}
