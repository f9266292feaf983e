//! System V x86_64.

use core::arch::naked_asm;

use static_assertions::const_assert_eq;

use super::Entry;

/// MXCSR after reset: all exceptions masked, round to nearest.
const MXCSR_DEFAULT: u32 = 0x1f80;
/// x87 control word after `fninit`.
const FPU_CW_DEFAULT: u16 = 0x037f;

/// Callee-saved registers and stack pointer, plus the floating point control
/// state (rounding mode, exception masks) that every thread keeps to itself.
///
/// The layout is fixed, `switch` addresses the fields by offset.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct Context {
    pub sp: usize,
    pub r15: usize,
    pub r14: usize,
    pub r13: usize,
    pub r12: usize,
    pub rbx: usize,
    pub rbp: usize,
    pub mxcsr: u32,
    pub fpu_cw: u16,
}

const_assert_eq!(core::mem::size_of::<Context>(), 64);
const_assert_eq!(core::mem::offset_of!(Context, rbp), 0x30);
const_assert_eq!(core::mem::offset_of!(Context, mxcsr), 0x38);
const_assert_eq!(core::mem::offset_of!(Context, fpu_cw), 0x3c);

impl Context {
    pub const fn new() -> Self {
        Context {
            sp: 0,
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            mxcsr: MXCSR_DEFAULT,
            fpu_cw: FPU_CW_DEFAULT,
        }
    }

    /// Makes this context enter `entry(arg)` on the stack ending at
    /// `stack_top` the first time it is switched to.
    ///
    /// # Safety
    /// `stack_top` must be one past the end of a writable stack region that
    /// outlives every use of this context.
    pub unsafe fn prepare(&mut self, stack_top: *mut u8, entry: Entry, arg: usize) {
        // `ret` in switch pops the shim address and leaves rsp 16-byte
        // aligned, which is what the shim's `call` expects
        let top = stack_top as usize & !0xf;
        let sp = (top - 8) as *mut usize;
        sp.write(bootstrap as *const () as usize);

        *self = Context::new();
        self.rbx = arg;
        self.r12 = entry as usize;
        self.sp = sp as usize;
    }
}

#[unsafe(naked)]
pub(super) unsafe extern "C" fn switch(_from: *mut Context, _to: *const Context) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], r15",
        "mov [rdi + 0x10], r14",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], rbx",
        "mov [rdi + 0x30], rbp",
        "stmxcsr dword ptr [rdi + 0x38]",
        "fnstcw word ptr [rdi + 0x3c]",
        "mov rsp, [rsi + 0x00]",
        "mov r15, [rsi + 0x08]",
        "mov r14, [rsi + 0x10]",
        "mov r13, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov rbx, [rsi + 0x28]",
        "mov rbp, [rsi + 0x30]",
        "ldmxcsr dword ptr [rsi + 0x38]",
        "fldcw word ptr [rsi + 0x3c]",
        "ret",
    );
}

// rbx = argument, r12 = entry
#[unsafe(naked)]
unsafe extern "C" fn bootstrap() -> ! {
    naked_asm!("mov rdi, rbx", "call r12", "ud2");
}
