//! AAPCS64.

use core::arch::naked_asm;

use static_assertions::const_assert_eq;

use super::Entry;

/// Callee-saved registers and stack pointer.
///
/// The layout is fixed, `switch` addresses the fields by offset.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct Context {
    pub sp: usize,
    /// x19 to x28
    pub x: [usize; 10],
    pub fp: usize,
    pub lr: usize,
    /// d8 to d15
    pub d: [u64; 8],
}

const_assert_eq!(core::mem::size_of::<Context>(), 168);
const_assert_eq!(core::mem::offset_of!(Context, fp), 88);
const_assert_eq!(core::mem::offset_of!(Context, d), 104);

impl Context {
    pub const fn new() -> Self {
        Context {
            sp: 0,
            x: [0; 10],
            fp: 0,
            lr: 0,
            d: [0; 8],
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
        self.x[0] = arg;
        self.x[1] = entry as usize;
        self.lr = bootstrap as *const () as usize;
        self.sp = stack_top as usize & !0xf;
    }
}

#[unsafe(naked)]
pub(super) unsafe extern "C" fn switch(_from: *mut Context, _to: *const Context) {
    naked_asm!(
        "mov x9, sp",
        "str x9, [x0]",
        "stp x19, x20, [x0, #8]",
        "stp x21, x22, [x0, #24]",
        "stp x23, x24, [x0, #40]",
        "stp x25, x26, [x0, #56]",
        "stp x27, x28, [x0, #72]",
        "stp x29, x30, [x0, #88]",
        "stp d8, d9, [x0, #104]",
        "stp d10, d11, [x0, #120]",
        "stp d12, d13, [x0, #136]",
        "stp d14, d15, [x0, #152]",
        "ldr x9, [x1]",
        "mov sp, x9",
        "ldp x19, x20, [x1, #8]",
        "ldp x21, x22, [x1, #24]",
        "ldp x23, x24, [x1, #40]",
        "ldp x25, x26, [x1, #56]",
        "ldp x27, x28, [x1, #72]",
        "ldp x29, x30, [x1, #88]",
        "ldp d8, d9, [x1, #104]",
        "ldp d10, d11, [x1, #120]",
        "ldp d12, d13, [x1, #136]",
        "ldp d14, d15, [x1, #152]",
        "ret",
    );
}

// x19 = argument, x20 = entry
#[unsafe(naked)]
unsafe extern "C" fn bootstrap() -> ! {
    naked_asm!("mov x0, x19", "blr x20", "brk #0x1");
}
