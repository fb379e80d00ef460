//! The CPU-facing half of the interrupt protocol: a cheap, cloneable handle
//! onto shared processor state, and the two-phase trigger/respond rendezvous
//! that lets a device pause the CPU and inspect it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::Error;
use crate::memory::Memory;
use crate::registers::Registers;
use crate::Word;

/// A cheap handle onto the processor's shared registers and memory.
///
/// Cloning a `Cpu` clones two `Arc`s, not the underlying state — every clone
/// sees the same registers and the same memory. This is what's handed to a
/// device during its turn: the device reads/writes through the handle while
/// the CPU thread blocks in [`InterruptChannel::trigger`].
#[derive(Clone)]
pub struct Cpu {
    registers: Arc<Mutex<Registers>>,
    pub memory: Arc<Memory>,
}

impl Cpu {
    #[must_use]
    pub fn new(memory: Arc<Memory>) -> Self {
        Self {
            registers: Arc::new(Mutex::new(Registers::default())),
            memory,
        }
    }

    /// A point-in-time copy of the registers.
    #[must_use]
    pub fn registers(&self) -> Registers {
        *self.lock()
    }

    /// Run `f` with exclusive access to the registers.
    pub fn with_registers<R>(&self, f: impl FnOnce(&mut Registers) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registers> {
        self.registers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Read the word at PC, advance PC by one, and tick one cycle — the
    /// "next word" every variable-length addressing mode consumes.
    pub fn fetch_next_word(&self) -> Result<Word, Error> {
        let pc = self.with_registers(|r| {
            let pc = r.pc;
            r.pc = r.pc.wrapping_add(1);
            r.cycles += 1;
            pc
        });
        self.memory.read(pc)
    }

    /// Read the word at PC and advance PC by one, without ticking — used for
    /// the instruction word itself, whose cost is already folded into the
    /// opcode's base cycle count.
    pub fn fetch_instruction_word(&self) -> Result<Word, Error> {
        let pc = self.with_registers(|r| {
            let pc = r.pc;
            r.pc = r.pc.wrapping_add(1);
            pc
        });
        self.memory.read(pc)
    }

    pub fn tick(&self, cycles: u16) {
        self.with_registers(|r| r.cycles += u64::from(cycles));
    }
}

/// A device's identity, reported to the CPU by `HWQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: u32,
    pub manufacturer: u32,
    pub version: u16,
}

/// Linear states of a single trigger/respond rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Idle,
    Triggered,
    Active,
    Responded,
}

/// A two-phase rendezvous between the CPU thread and one device thread.
///
/// The CPU calls [`trigger`](Self::trigger) and blocks; the device calls
/// [`wait_for_trigger`](Self::wait_for_trigger), does its work, then calls
/// [`respond`](Self::respond) to wake the CPU back up. Only one device turn
/// can be in flight on a channel at a time.
pub struct InterruptChannel {
    state: Mutex<ChannelState>,
    cv: Condvar,
}

impl InterruptChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState::Idle),
            cv: Condvar::new(),
        }
    }

    /// CPU side: wake the device and block until it responds, or until
    /// `active` goes false.
    pub fn trigger(&self, active: &AtomicBool) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = ChannelState::Triggered;
        self.cv.notify_all();

        state = self
            .cv
            .wait_while(state, |s| {
                !matches!(s, ChannelState::Responded) && active.load(Ordering::Relaxed)
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        *state = ChannelState::Idle;
    }

    /// Device side: block until the CPU triggers this channel, or until
    /// `active` goes false (in which case this returns `false` and the
    /// device should exit its run loop).
    pub fn wait_for_trigger(&self, active: &AtomicBool) -> bool {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state = self
            .cv
            .wait_while(state, |s| {
                !matches!(s, ChannelState::Triggered) && active.load(Ordering::Relaxed)
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if matches!(*state, ChannelState::Triggered) {
            *state = ChannelState::Active;
            true
        } else {
            false
        }
    }

    /// Device side: signal completion and wake the waiting CPU.
    pub fn respond(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = ChannelState::Responded;
        self.cv.notify_all();
    }

    /// Wake anyone parked in [`trigger`](Self::trigger) or
    /// [`wait_for_trigger`](Self::wait_for_trigger) without changing state —
    /// used on shutdown so a device blocked waiting for work notices the
    /// `active` flag went false.
    pub fn notify_all(&self) {
        self.cv.notify_all();
    }
}

impl Default for InterruptChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a [`Device`]'s run loop needs: the CPU handle for its turn,
/// the channel it's triggered through, the shared shutdown flag, and a
/// mailbox for raising unsolicited (device-initiated) interrupts.
///
/// The mailbox, not the CPU's own interrupt queue, is what a device thread
/// is allowed to touch — the real queue is drained into only by the CPU
/// thread between instructions, keeping it free of cross-thread races.
#[derive(Clone)]
pub struct DeviceContext {
    pub cpu: Cpu,
    channel: Arc<InterruptChannel>,
    active: Arc<AtomicBool>,
    mailbox: Arc<Mutex<Vec<Word>>>,
}

impl DeviceContext {
    pub(crate) fn new(
        cpu: Cpu,
        channel: Arc<InterruptChannel>,
        active: Arc<AtomicBool>,
        mailbox: Arc<Mutex<Vec<Word>>>,
    ) -> Self {
        Self {
            cpu,
            channel,
            active,
            mailbox,
        }
    }

    /// Block until the CPU triggers this device's channel. Returns `false`
    /// once the machine is shutting down, at which point the run loop
    /// should return.
    #[must_use]
    pub fn wait_for_trigger(&self) -> bool {
        self.channel.wait_for_trigger(&self.active)
    }

    /// Signal that this device's turn is over.
    pub fn respond(&self) {
        self.channel.respond();
    }

    /// Post an interrupt message that the CPU will pick up and queue the
    /// next time it checks between instructions.
    pub fn raise_interrupt(&self, message: Word) {
        self.mailbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// A hardware device attached to a [`crate::Computer`].
///
/// Each attached device runs `run` on its own thread, parking in
/// [`DeviceContext::wait_for_trigger`] until the CPU executes `HWI` against
/// it. The device may read any register and read/write memory during its
/// turn; the CPU thread is fully paused until the device calls
/// [`DeviceContext::respond`].
pub trait Device: Send {
    fn info(&self) -> DeviceInfo;

    fn run(self: Box<Self>, ctx: DeviceContext);
}
