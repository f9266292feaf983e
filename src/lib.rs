//! A tiny cooperative thread kernel for single-core microcontrollers.
//!
//! A fixed pool of threads, each with its own statically allocated stack,
//! shares the core with the thread the program started on. Threads switch
//! only when they block on a [`Mutex`], hand one over, yield, or finish.
//! Interrupt handlers wake threads by unlocking mutexes (see
//! [`Kernel::interrupt`]).
//!
//! Nothing is allocated at run time. The pool size and the stack size are
//! const parameters of [`Kernel`].
#![cfg_attr(not(test), no_std)]

mod arch;
mod context;
mod error;
mod mutex;
mod scheduler;
mod thread;
mod thread_list;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use arch::CortexM;
pub use arch::{Arch, SoftMask};
pub use error::{Fault, SpawnError};
pub use mutex::Mutex;
pub use scheduler::{Kernel, DEFAULT_STACK_SIZE, DEFAULT_THREADS};
pub use thread::{ThreadId, ThreadState, MIN_STACK_SIZE};
pub use thread_list::Discipline;
