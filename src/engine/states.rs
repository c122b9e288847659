//! States for the bootloader engine state machine.
//!
//! This module is private and restricted to the [`engine`](crate::engine)
//! scope. The public interface of the engine is provided by
//! [`engine`](crate::engine).
//!
//! ```ignore
//! use super::states::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::fmt;

use log::{debug, info};

use crate::link::Link;
use crate::nvm::Nvm;
use crate::settings::Settings;

use super::dispatch::{Dispatcher, ServeEnd};
use super::events::*;
use super::session::Session;
use super::{Handoff, Outcome, ResetCause};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into
/// it.
pub(crate) trait Runnable<'m> {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state can do any work that needs to be done and
    /// when finished, requests a transition to a `new state` by returning
    /// the appropriate `event`. The `state` and the `event` are consumed to
    /// create the `new state` using the corresponding [`From`] trait
    /// implementation (provided such implementation exists).
    fn run(&mut self, settings: &Settings) -> Event<'m>;
}

// Reset State =================================================================

/// The initial state of every power-on session: the power-on decision.
///
/// A watchdog or power-on reset with a programmed flash means a previous
/// session finished its work (or nobody is updating today), so control goes
/// straight to the application. An external reset is the host pulling the
/// reset line to start programming, and a blank flash has nothing to launch
/// into; both enter the bootloader.
///
/// From the `ResetState`, the state machine can evolve via the following
/// transitions:
///
///  * **[`EnterServeEvent`] => [`ServeState`]** to start the dispatch loop,
///  * **[`LaunchEvent`] => [`LaunchState`]** when the decision skips the
///    bootloader entirely.
pub(crate) struct ResetState<'m> {
    /// The serial line. Consumed and moved upon the transition out.
    pub link: Option<&'m mut dyn Link>,
    /// The memory backend. Consumed and moved upon the transition out.
    pub nvm: Option<&'m mut dyn Nvm>,
    /// Why this session started.
    pub cause: ResetCause,
}
impl<'m> Runnable<'m> for ResetState<'m> {
    fn run(&mut self, settings: &Settings) -> Event<'m> {
        info!("=> Reset ({:?})", self.cause);

        if let (Some(link), Some(nvm)) = (self.link.take(), self.nvm.take()) {
            if settings.watchdog_restart
                && self.cause != ResetCause::External
                && nvm.read_flash(0) != 0xFF
            {
                debug!("flash programmed, launching application at reset");
                return Event::Launch(LaunchEvent {
                    settings: settings.clone(),
                    outcome: Outcome::Launched(Handoff::AtReset),
                });
            }

            return Event::EnterServe(EnterServeEvent {
                settings: settings.clone(),
                session: Session::new(),
                link,
                nvm,
            });
        }

        // We should never reach here!
        unreachable!()
    }
}
impl fmt::Debug for ResetState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link_name = self.link.as_ref().and_then(|link| link.name());
        debug_fmt_engine_parts!("ResetState", link_name, f)
            .field("cause", &self.cause)
            .finish()
    }
}

// Serve State =================================================================

/// A `state` of the engine where the dispatch loop owns the serial line:
/// commands in, responses out, pages programmed, until something ends the
/// session.
///
/// This state can transition to another state as following:
///
///  * **[`EnterMonitorEvent`] => [`MonitorState`]** upon reception of the
///    monitor trigger,
///  * **[`LaunchEvent`] => [`LaunchState`]** on any handoff to the
///    application or a link failure.
pub(crate) struct ServeState<'m> {
    /// The running session record.
    pub session: Session,
    /// The serial line. Consumed and moved upon the transition out.
    pub link: Option<&'m mut dyn Link>,
    /// The memory backend. Consumed and moved upon the transition out.
    pub nvm: Option<&'m mut dyn Nvm>,
}
impl<'m> Runnable<'m> for ServeState<'m> {
    fn run(&mut self, settings: &Settings) -> Event<'m> {
        info!("=> Serve");

        if let (Some(link), Some(nvm)) = (self.link.take(), self.nvm.take()) {
            let mut session = self.session;
            let end = {
                let mut dispatcher =
                    Dispatcher::new(&mut *link, &mut *nvm, settings, &mut session);
                dispatcher.serve()
            };
            self.session = session;

            return match end {
                ServeEnd::Monitor => Event::EnterMonitor(EnterMonitorEvent {
                    settings: settings.clone(),
                    session,
                    link,
                    nvm,
                }),
                ServeEnd::Launch(handoff) => Event::Launch(LaunchEvent {
                    settings: settings.clone(),
                    outcome: Outcome::Launched(handoff),
                }),
                ServeEnd::LinkDown(err) => Event::Launch(LaunchEvent {
                    settings: settings.clone(),
                    outcome: Outcome::LinkFailed(err),
                }),
            };
        }

        // We should never reach here!
        unreachable!()
    }
}
impl fmt::Debug for ServeState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link_name = self.link.as_ref().and_then(|link| link.name());
        debug_fmt_engine_parts!("ServeState", link_name, f)
            .field("session", &self.session)
            .finish()
    }
}

// Monitor State ===============================================================

/// A `state` of the engine where the interactive monitor owns the serial
/// line. The idle timeout is disarmed while here; the monitor exits only
/// through its explicit jump command, its echo mode rearming the timeout,
/// or a link failure.
///
///  * **[`LaunchEvent`] => [`LaunchState`]** on any of those exits.
pub(crate) struct MonitorState<'m> {
    /// The session record carried over from the dispatch loop.
    pub session: Session,
    /// The serial line. Consumed and moved upon the transition out.
    pub link: Option<&'m mut dyn Link>,
    /// The memory backend. Consumed and moved upon the transition out.
    pub nvm: Option<&'m mut dyn Nvm>,
}
impl<'m> Runnable<'m> for MonitorState<'m> {
    fn run(&mut self, settings: &Settings) -> Event<'m> {
        info!("=> Monitor");

        if let (Some(link), Some(nvm)) = (self.link.take(), self.nvm.take()) {
            let mut session = self.session;
            let end = {
                let mut dispatcher =
                    Dispatcher::new(&mut *link, &mut *nvm, settings, &mut session);
                dispatcher.monitor()
            };
            self.session = session;

            return match end {
                ServeEnd::Launch(handoff) => Event::Launch(LaunchEvent {
                    settings: settings.clone(),
                    outcome: Outcome::Launched(handoff),
                }),
                ServeEnd::LinkDown(err) => Event::Launch(LaunchEvent {
                    settings: settings.clone(),
                    outcome: Outcome::LinkFailed(err),
                }),
                ServeEnd::Monitor => unreachable!(),
            };
        }

        // We should never reach here!
        unreachable!()
    }
}
impl fmt::Debug for MonitorState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link_name = self.link.as_ref().and_then(|link| link.name());
        debug_fmt_engine_parts!("MonitorState", link_name, f)
            .field("session", &self.session)
            .finish()
    }
}

// Launch State ================================================================

/// Reached when control leaves the bootloader: the terminal state of the
/// engine. The carried [`Outcome`] is the modeled non-returning jump; the
/// engine event loop takes it and returns it to the caller.
#[derive(Debug)]
pub(crate) struct LaunchState {
    /// Why the session ended. Taken exactly once by the event loop.
    pub outcome: Option<Outcome>,
}
impl<'m> Runnable<'m> for LaunchState {
    fn run(&mut self, _settings: &Settings) -> Event<'m> {
        // Terminal: the event loop returns its outcome before ever running
        // this state again.
        unreachable!()
    }
}
