//! Events for the bootloader engine state machine.
//!
//! This module is private and restricted to the [`engine`](crate::engine)
//! scope. The public interface of the engine is provided by
//! [`engine`](crate::engine).
//!
//! ```ignore
//! use super::events::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::fmt;

use crate::link::Link;
use crate::nvm::Nvm;
use crate::settings::Settings;

use super::session::Session;
use super::Outcome;

// =============================================================================
// Crate-Public Interface
// =============================================================================

// EnterServeEvent =============================================================

/// Event fired to trigger a transition to [`ServeState`].
///
/// Happens while at the [`ResetState`] when the power-on decision keeps the
/// device in the bootloader: external reset, or a blank flash that leaves
/// nothing to launch into.
pub(crate) struct EnterServeEvent<'m> {
    pub settings: Settings,
    /// The fresh session record for this power-on.
    pub session: Session,
    /// The serial line, moved from state to state for the whole session.
    pub link: &'m mut dyn Link,
    /// The non-volatile memory backend, moved along with the link.
    pub nvm: &'m mut dyn Nvm,
}
impl fmt::Debug for EnterServeEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_fmt_engine_parts!("EnterServeEvent", self.link.name(), f)
            .field("session", &self.session)
            .finish()
    }
}

// EnterMonitorEvent ===========================================================

/// Event fired to trigger a transition to [`MonitorState`].
///
/// Happens while at the [`ServeState`] upon reception of the three-mark
/// monitor trigger, when the monitor extension is enabled.
pub(crate) struct EnterMonitorEvent<'m> {
    pub settings: Settings,
    /// The running session record, carried over from the dispatch loop.
    pub session: Session,
    pub link: &'m mut dyn Link,
    pub nvm: &'m mut dyn Nvm,
}
impl fmt::Debug for EnterMonitorEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_fmt_engine_parts!("EnterMonitorEvent", self.link.name(), f)
            .field("session", &self.session)
            .finish()
    }
}

// LaunchEvent =================================================================

/// The last event of a session: control leaves the bootloader. It triggers
/// a transition to the terminal `Launch` state, whose outcome the engine
/// event loop returns to the caller.
///
/// On the real chip this is a non-returning jump to the application's entry
/// point; here the jump is modeled as the carried [`Outcome`] so that
/// callers and tests can observe why the session ended.
#[derive(Debug)]
pub(crate) struct LaunchEvent {
    pub settings: Settings,
    pub outcome: Outcome,
}

// Events enum =================================================================

/// Events that can be triggered within the bootloader engine state machine.
///
/// Each possible value holds an `event`, which in turn carries the data for
/// the state transition: the session record and the link/memory borrows
/// travel from the origin state to the target state.
#[derive(Debug)]
pub(crate) enum Event<'m> {
    EnterServe(EnterServeEvent<'m>),
    EnterMonitor(EnterMonitorEvent<'m>),
    Launch(LaunchEvent),
}
