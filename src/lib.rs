//! Hexboot implements the device side of the STK500v1 serial programming
//! protocol: the resident bootloader engine that lets a host reprogram a
//! small AVR-class device over a UART link, without a dedicated hardware
//! programmer. The engine does the command framing and dispatch, the
//! page-granular flash erase/fill/commit sequencing, byte-wise EEPROM
//! access, and the timeout/error escape hatch that guarantees a stalled or
//! confused host can never permanently strand the device in bootloader
//! mode.
//!
//! The actual non-volatile memory sits behind the [`Nvm`] trait, so the
//! same engine drives either real self-programming hardware or the bundled
//! [`SimNvm`] simulation. Likewise the serial line sits behind [`Link`],
//! with a `serialport`-backed implementation for real ttys and a scripted
//! one for tests. The bundled binary uses both to emulate a bootloader on
//! one end of a serial link (a pty works fine), which is handy for
//! exercising avrdude-style hosts without a board on the desk.
//!
//! Most of the functionality in `hexboot` is implemented as state machines.
//! State machines are implemented in terms of **states** and **transitions**
//! between them with the following characteristics:
//!
//! * Can only be in one state at any time.
//! * Each state can have its own associated data if needed.
//! * It is possible to have some shared data between **all** states.
//! * Transitions between states are triggered via typed **events** and
//!   follow defined semantics.
//! * Only explicitly defined transitions should be permitted and as many
//!   errors as possible should be detected at **compile-time**.
//! * Transitioning from one state to another consumes the original state
//!   and renders it unusable. Any transition back to that state would
//!   create a new state.
//! * Data can be transferred from one state to the next by attaching it to
//!   the transition event. Such data is statically defined as part of the
//!   event type.
//!
//! The implementation of state transitions leverages `rust`'s `From` and
//! `Into` pattern. The `From` trait allows for a type to define how to
//! create itself from another type, hence providing us an intuitive and
//! simple mechanism for converting `events` into new `states`. Only
//! transitions for which the `From` trait is implemented are authorized and
//! any other transition would be detected at compile-time as an error.

pub mod engine;
mod device;
mod link;
mod nvm;
mod settings;
mod utils;

pub use device::{singleton, DeviceServer};
pub use link::{Link, ScriptedLink, SerialLink};
pub use nvm::{Nvm, PageOp, SimNvm};
pub use settings::{Settings, SettingsBuilder};
