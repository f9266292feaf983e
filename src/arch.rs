//! Interrupt masking.
//!
//! Every kernel operation that touches the queues, `current` or a mutex runs
//! with interrupts masked. The kernel is generic over how that is done so the
//! same scheduler runs on a Cortex-M core and in hosted tests.

use core::sync::atomic::{AtomicBool, Ordering};

/// Interrupt mask of a single core.
///
/// The kernel never nests `mask` calls without a matching `restore`, so an
/// implementation only has to remember one bit.
pub trait Arch {
    /// Masks interrupts. Returns `true` if they were already masked.
    fn mask(&self) -> bool;

    /// Unmasks interrupts.
    ///
    /// # Safety
    /// Must not be called inside a critical section that relies on the mask
    /// staying set.
    unsafe fn unmask(&self);

    fn is_masked(&self) -> bool;

    /// Puts the mask back the way `mask` found it.
    #[inline]
    fn restore(&self, was_masked: bool) {
        if !was_masked {
            // safety: the caller entered the critical section unmasked
            unsafe { self.unmask() }
        }
    }
}

/// A mask flag with nothing behind it.
///
/// Used where there is no interrupt controller to talk to, e.g. when the
/// kernel runs as an ordinary process. Interrupt handlers are then run
/// explicitly through [`Kernel::interrupt`](crate::Kernel::interrupt).
pub struct SoftMask {
    masked: AtomicBool,
}

impl SoftMask {
    pub const fn new() -> Self {
        SoftMask {
            masked: AtomicBool::new(false),
        }
    }
}

impl Default for SoftMask {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch for SoftMask {
    fn mask(&self) -> bool {
        self.masked.swap(true, Ordering::SeqCst)
    }

    unsafe fn unmask(&self) {
        self.masked.store(false, Ordering::SeqCst);
    }

    fn is_masked(&self) -> bool {
        self.masked.load(Ordering::SeqCst)
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::cortex_m_mask::CortexM;

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod cortex_m_mask {
    use cortex_m::{interrupt, register::primask};

    /// PRIMASK of the running Cortex-M core.
    pub struct CortexM;

    impl super::Arch for CortexM {
        #[inline]
        fn mask(&self) -> bool {
            let was_masked = primask::read().is_inactive();
            interrupt::disable();
            was_masked
        }

        #[inline]
        unsafe fn unmask(&self) {
            interrupt::enable();
        }

        #[inline]
        fn is_masked(&self) -> bool {
            primask::read().is_inactive()
        }
    }
}
