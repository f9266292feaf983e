//! ARMv7-M / ARMv7E-M (Thumb-2), AAPCS.

use core::arch::naked_asm;

use static_assertions::const_assert_eq;

use super::Entry;

/// Callee-saved registers and stack pointer.
///
/// The layout is fixed, `switch` addresses the fields by offset. On hard
/// float targets s16-s31 are callee-saved as well.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct Context {
    pub sp: usize,
    /// r4 to r11
    pub r: [usize; 8],
    pub lr: usize,
    #[cfg(target_abi = "eabihf")]
    pub s: [u32; 16],
}

#[cfg(not(target_abi = "eabihf"))]
const_assert_eq!(core::mem::size_of::<Context>(), 40);
#[cfg(target_abi = "eabihf")]
const_assert_eq!(core::mem::size_of::<Context>(), 104);
const_assert_eq!(core::mem::offset_of!(Context, lr), 36);

impl Context {
    pub const fn new() -> Self {
        Context {
            sp: 0,
            r: [0; 8],
            lr: 0,
            #[cfg(target_abi = "eabihf")]
            s: [0; 16],
        }
    }

    /// Makes this context enter `entry(arg)` on the stack ending at
    /// `stack_top` the first time it is switched to.
    ///
    /// # Safety
    /// `stack_top` must be one past the end of a writable stack region that
    /// outlives every use of this context.
    pub unsafe fn prepare(&mut self, stack_top: *mut u8, entry: Entry, arg: usize) {
        *self = Context::new();
        self.r[0] = arg;
        self.r[1] = entry as usize;
        // function pointers already carry the thumb bit
        self.lr = bootstrap as *const () as usize;
        self.sp = stack_top as usize & !0x7;
    }
}

#[cfg(not(target_abi = "eabihf"))]
#[unsafe(naked)]
pub(super) unsafe extern "C" fn switch(_from: *mut Context, _to: *const Context) {
    naked_asm!(
        "mov r2, sp",
        "stmia r0, {{r2, r4-r11, lr}}",
        "ldmia r1, {{r2, r4-r11, lr}}",
        "mov sp, r2",
        "bx lr",
    );
}

#[cfg(target_abi = "eabihf")]
#[unsafe(naked)]
pub(super) unsafe extern "C" fn switch(_from: *mut Context, _to: *const Context) {
    naked_asm!(
        "mov r2, sp",
        "stmia r0!, {{r2, r4-r11, lr}}",
        "vstmia r0, {{s16-s31}}",
        "ldmia r1!, {{r2, r4-r11, lr}}",
        "vldmia r1, {{s16-s31}}",
        "mov sp, r2",
        "bx lr",
    );
}

// r4 = argument, r5 = entry
#[unsafe(naked)]
unsafe extern "C" fn bootstrap() -> ! {
    naked_asm!("mov r0, r4", "blx r5", "udf #0");
}
