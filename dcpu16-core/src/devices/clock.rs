//! Generic clock: a 60Hz-derived tick counter with an optional interrupt.
//!
//! Unlike the keyboard and monitor, the clock has to do something even when
//! the CPU isn't talking to it, so [`Device::run`] spawns a second thread
//! that sleeps and ticks while the main one parks in
//! [`DeviceContext::wait_for_trigger`] waiting for `HWI`.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::interrupt::{Device, DeviceContext, DeviceInfo};

const TICKS_PER_SECOND: u64 = 60;
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct ClockState {
    divisor: AtomicU16,
    message: AtomicU16,
    ticks: AtomicU16,
}

pub struct Clock;

impl Clock {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Clock {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: 0x12D0_B402,
            manufacturer: 0,
            version: 1,
        }
    }

    fn run(self: Box<Self>, ctx: DeviceContext) {
        let state = Arc::new(ClockState::default());

        let ticker_ctx = ctx.clone();
        let ticker_state = Arc::clone(&state);
        let ticker = thread::spawn(move || run_ticker(&ticker_ctx, &ticker_state));

        while ctx.wait_for_trigger() {
            let a = ctx.cpu.with_registers(|r| r.a);
            match a {
                0 => {
                    let divisor = ctx.cpu.with_registers(|r| r.b);
                    state.divisor.store(divisor, Ordering::Relaxed);
                    state.ticks.store(0, Ordering::Relaxed);
                }
                1 => {
                    let ticks = state.ticks.load(Ordering::Relaxed);
                    ctx.cpu.with_registers(|r| r.c = ticks);
                }
                2 => {
                    let message = ctx.cpu.with_registers(|r| r.b);
                    state.message.store(message, Ordering::Relaxed);
                }
                _ => {}
            }
            ctx.respond();
        }

        let _ = ticker.join();
    }
}

fn run_ticker(ctx: &DeviceContext, state: &ClockState) {
    while ctx.is_active() {
        let divisor = state.divisor.load(Ordering::Relaxed);
        if divisor == 0 {
            thread::sleep(IDLE_POLL);
            continue;
        }

        let period = Duration::from_secs_f64(f64::from(divisor) / TICKS_PER_SECOND as f64);
        thread::sleep(period);
        if !ctx.is_active() {
            return;
        }

        state.ticks.fetch_add(1, Ordering::Relaxed);
        let message = state.message.load(Ordering::Relaxed);
        if message != 0 {
            ctx.raise_interrupt(message);
        }
    }
}
