//! Three cooperative activities on an nRF52832 DK.
//!
//! - a prime counter that runs whenever nothing else wants the core
//! - a press counter woken by the button interrupt
//! - an LED blinker, on the bootstrap thread, woken by SysTick
//!
//! Both interrupt handlers only unlock a mutex and yield; the woken thread
//! does the work and blocks again, which hands the core back to the thread
//! the interrupt landed on.
#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use coop_threads::{CortexM, Kernel, Mutex};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::{entry, exception};
use cortex_m_semihosting::hprintln;
use embedded_hal::digital::v2::{OutputPin, StatefulOutputPin};
use nrf52832_hal::{
    gpio::{p0, Level, Output, Pin, PushPull},
    gpiote::Gpiote,
    pac::{self, interrupt},
};
use panic_semihosting as _;

static KERNEL: Kernel<CortexM, 4, 2048> = Kernel::new(CortexM);

// both start locked: the threads sleep on them until an interrupt fires
static BLINK: Mutex = Mutex::locked();
static BUTTON: Mutex = Mutex::locked();

static PRESSES: AtomicU32 = AtomicU32::new(0);

/// Stands in for a two digit display at position `pos`.
fn show(value: u32, pos: i32) {
    let _ = hprintln!("[{}] {:02}", pos, value % 100);
}

fn is_prime(n: u32) -> bool {
    n >= 2 && (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

fn primes(pos: i32) {
    for n in 1.. {
        if is_prime(n) {
            show(n, pos);
        }
    }
}

fn presses(pos: i32) {
    loop {
        KERNEL.lock(&BUTTON);
        show(PRESSES.load(Ordering::Relaxed), pos);
    }
}

fn blink(mut led: Pin<Output<PushPull>>) -> ! {
    // SysTick fires twice per toggle
    let mut half = true;
    loop {
        KERNEL.lock(&BLINK);
        half = !half;
        if half {
            continue;
        }
        if led.is_set_high().unwrap_or(false) {
            let _ = led.set_low();
        } else {
            let _ = led.set_high();
        }
    }
}

#[entry]
fn main() -> ! {
    let _ = hprintln!("started!");

    let core = pac::CorePeripherals::take().unwrap();
    let p = pac::Peripherals::take().unwrap();

    let port0 = p0::Parts::new(p.P0);
    let led = port0.p0_17.into_push_pull_output(Level::High).degrade();
    let button = port0.p0_13.into_pullup_input().degrade();

    let gpiote = Gpiote::new(p.GPIOTE);
    gpiote
        .channel0()
        .input_pin(&button)
        .hi_to_lo()
        .enable_interrupt();

    let mut syst = core.SYST;
    syst.set_clock_source(SystClkSource::Core);
    // half a second at 64 MHz does not fit in 24 bits, this is ~0.26 s
    syst.set_reload(0x00ff_ffff);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();

    KERNEL.spawn(primes, 0);
    KERNEL.spawn(presses, 3);

    // safety: the handler only uses the kernel, which is ready now
    unsafe { pac::NVIC::unmask(pac::Interrupt::GPIOTE) };

    blink(led)
}

#[exception]
fn SysTick() {
    KERNEL.interrupt(|k| {
        k.unlock(&BLINK);
        k.yield_now();
    });
}

#[interrupt]
fn GPIOTE() {
    // safety: nothing else touches channel 0's event
    let gpiote = unsafe { &*pac::GPIOTE::ptr() };
    gpiote.events_in[0].reset();

    PRESSES.fetch_add(1, Ordering::Relaxed);
    KERNEL.interrupt(|k| {
        k.unlock(&BUTTON);
        k.yield_now();
    });
}
