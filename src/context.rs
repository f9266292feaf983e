//! Saving and restoring the machine state of a thread.
//!
//! A [`Context`] holds the callee-saved registers and the stack pointer of a
//! suspended thread. [`switch`] stores the running thread into one context
//! and resumes another. A context resumed this way continues right after the
//! `switch` call that suspended it.
//!
//! A context that has never run is built with [`Context::prepare`]: its stack
//! pointer is pointed at a private stack and its resume point is a small
//! bootstrap shim that calls an [`Entry`] function. The first time such a
//! context is switched to, the entry function runs on the new stack instead
//! of returning from a `switch`.

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[path = "context/thumb.rs"]
mod imp;

#[cfg(target_arch = "x86_64")]
#[path = "context/x86_64.rs"]
mod imp;

#[cfg(target_arch = "aarch64")]
#[path = "context/aarch64.rs"]
mod imp;

#[cfg(not(any(
    all(target_arch = "arm", target_os = "none"),
    target_arch = "x86_64",
    target_arch = "aarch64"
)))]
compile_error!("coop-threads has no context switch for this target architecture");

pub use self::imp::Context;

/// First function run by a freshly prepared context. Must never return, there
/// is nothing on the stack to return to.
pub type Entry = unsafe extern "C" fn(usize) -> !;

/// Saves the running thread into `from` and resumes `to`.
///
/// Returns once something switches back to `from`.
///
/// # Safety
/// `to` must have been filled by an earlier `switch` or by
/// [`Context::prepare`], and the stack it refers to must still be alive.
/// `from` and `to` may be the same context.
#[inline]
pub unsafe fn switch(from: *mut Context, to: *const Context) {
    imp::switch(from, to)
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
