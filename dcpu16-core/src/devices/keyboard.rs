//! Generic keyboard: a key buffer and a pressed-key set that a runner feeds
//! through [`KeyboardInput`] instead of this crate doing any OS input
//! capture itself.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::interrupt::{Device, DeviceContext, DeviceInfo};
use crate::Word;

#[derive(Default)]
struct KeyboardState {
    buffer: VecDeque<Word>,
    pressed: HashSet<Word>,
    interrupt_message: Word,
    ctx: Option<DeviceContext>,
}

/// The `HWI`-facing half of the keyboard device.
pub struct Keyboard {
    state: Arc<Mutex<KeyboardState>>,
}

/// A handle a runner uses to feed synthetic key-down/key-up events into an
/// attached [`Keyboard`].
#[derive(Clone)]
pub struct KeyboardInput {
    state: Arc<Mutex<KeyboardState>>,
}

impl Keyboard {
    #[must_use]
    pub fn new() -> (Self, KeyboardInput) {
        let state = Arc::new(Mutex::new(KeyboardState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            KeyboardInput { state },
        )
    }
}

impl KeyboardInput {
    fn lock(&self) -> std::sync::MutexGuard<'_, KeyboardState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record `key` as pressed and append it to the typed-key buffer,
    /// raising an interrupt if the keyboard has one enabled.
    pub fn key_down(&self, key: Word) {
        let mut state = self.lock();
        state.pressed.insert(key);
        state.buffer.push_back(key);
        if state.interrupt_message != 0 {
            if let Some(ctx) = state.ctx.clone() {
                ctx.raise_interrupt(state.interrupt_message);
            }
        }
    }

    /// Record `key` as released.
    pub fn key_up(&self, key: Word) {
        self.lock().pressed.remove(&key);
    }
}

impl Device for Keyboard {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: 0x30CF_7406,
            manufacturer: 0,
            version: 1,
        }
    }

    fn run(self: Box<Self>, ctx: DeviceContext) {
        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.ctx = Some(ctx.clone());
        }

        while ctx.wait_for_trigger() {
            let a = ctx.cpu.with_registers(|r| r.a);
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match a {
                0 => {
                    state.buffer.clear();
                }
                1 => {
                    let key = state.buffer.pop_front().unwrap_or(0);
                    drop(state);
                    ctx.cpu.with_registers(|r| r.c = key);
                }
                2 => {
                    let b = ctx.cpu.with_registers(|r| r.b);
                    let pressed = state.pressed.contains(&b);
                    drop(state);
                    ctx.cpu.with_registers(|r| r.c = Word::from(pressed));
                }
                3 => {
                    let b = ctx.cpu.with_registers(|r| r.b);
                    state.interrupt_message = b;
                }
                _ => {}
            }
            ctx.respond();
        }
    }
}
