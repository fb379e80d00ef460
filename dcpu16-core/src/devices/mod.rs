//! Concrete [`Device`](crate::Device) implementations for the generic
//! clock, keyboard and monitor devices in the DCPU-16 hardware spec.
//!
//! Each one is modeled only to the depth its CPU-facing contract requires:
//! an identity triple and a `match a { ... }` dispatch against the value
//! the CPU left in register A before `HWI`. Pixel rendering and host
//! keyboard capture are explicitly out of scope and live, if anywhere, in a
//! runner binary that wires a [`Device`](crate::Device) impl to a real
//! window.

mod clock;
mod keyboard;
mod monitor;

pub use clock::Clock;
pub use keyboard::{Keyboard, KeyboardInput};
pub use monitor::{Monitor, MonitorHandle};
