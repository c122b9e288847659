//! The bootloader protocol engine.
//!
//! One engine run models one power-on session of the device: the power-on
//! decision (bootloader or straight to the application), the command
//! dispatch loop, optionally the interactive monitor, and finally the
//! unconditional handoff to the resident application. The handoff is the
//! escape hatch of the whole design — on a real device it is a
//! non-returning jump, here it is the value [`run`](BootEngine::run)
//! returns, so callers (and tests) can observe exactly why the session
//! ended.
//!
//! **Example** - Running one session against simulated memory:
//! ```ignore
//! let settings = SettingsBuilder::new().finalize();
//! let mut link = ScriptedLink::new(&[0x30, 0x20]);
//! let mut nvm = SimNvm::from_settings(&settings);
//! let mut engine = engine::factory(settings, &mut link, &mut nvm, ResetCause::External);
//! let outcome = engine.run();
//! ```

#[macro_use]
mod macros;

mod dispatch;
mod events;
mod monitor;
mod session;
mod state_machine;
mod states;
pub mod wire;

pub use session::Session;
pub use state_machine::{factory, BootEngine};

use std::io;

/// Why a power-on session was started. On the real chip this is the MCU
/// status register; the device server synthesizes it between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    /// First power applied.
    PowerOn,
    /// The reset line was pulled (a host toggling DTR, or a button).
    External,
    /// The watchdog fired, normally armed by `LEAVE_PROGMODE`.
    Watchdog,
    /// Supply dipped below the brown-out threshold.
    BrownOut,
}

/// Why the engine handed control to the resident application.
///
/// Every variant is a normal success path, not a failure; in particular
/// `ErrorLimit` and `IdleTimeout` exist so that a disconnected or
/// misbehaving host can never permanently strand the device in bootloader
/// mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// The power-on decision skipped the bootloader.
    AtReset,
    /// Too many protocol errors in one session.
    ErrorLimit,
    /// No host byte arrived within the idle-poll budget.
    IdleTimeout,
    /// `LEAVE_PROGMODE` armed the watchdog for a clean restart.
    WatchdogRestart,
    /// The monitor's explicit jump-to-application command.
    MonitorJump,
}

/// The terminal result of one engine session.
#[derive(Debug)]
pub enum Outcome {
    /// Control was handed to the application for the given reason.
    Launched(Handoff),
    /// The serial link itself failed; there is no one left to talk to.
    LinkFailed(io::Error),
}
