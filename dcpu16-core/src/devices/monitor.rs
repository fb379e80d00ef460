//! Generic LEM1802-style monitor: tracks the mapped video memory offset the
//! way the original does, without any pixel rendering (out of scope here —
//! a runner that wants to actually draw the screen reads through
//! [`MonitorHandle`]).

use std::sync::{Arc, Mutex};

use crate::interrupt::{Device, DeviceContext, DeviceInfo};
use crate::Word;

#[derive(Default)]
struct MonitorState {
    connected: bool,
    video_offset: Word,
}

/// The `HWI`-facing half of the monitor device.
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
}

/// A handle a runner can use to find out where video memory is mapped, so it
/// can read and render it itself.
#[derive(Clone)]
pub struct MonitorHandle {
    state: Arc<Mutex<MonitorState>>,
}

impl Monitor {
    #[must_use]
    pub fn new() -> (Self, MonitorHandle) {
        let state = Arc::new(Mutex::new(MonitorState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MonitorHandle { state },
        )
    }
}

impl MonitorHandle {
    /// The address video memory is mapped at, or `None` if the monitor has
    /// been disconnected (or never connected).
    #[must_use]
    pub fn video_offset(&self) -> Option<Word> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.connected.then_some(state.video_offset)
    }
}

impl Device for Monitor {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: 0x7349_F615,
            manufacturer: 0x1C6C_8B36,
            version: 0x1802,
        }
    }

    fn run(self: Box<Self>, ctx: DeviceContext) {
        while ctx.wait_for_trigger() {
            let a = ctx.cpu.with_registers(|r| r.a);
            if a == 0 {
                // MEM_MAP_SCREEN: B = video memory offset, 0 disconnects.
                let b = ctx.cpu.with_registers(|r| r.b);
                let mut state = self
                    .state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if b == 0 {
                    state.connected = false;
                } else {
                    state.connected = true;
                    state.video_offset = b;
                }
            }
            ctx.respond();
        }
    }
}
