//! The bootloader engine state machine.
//!
//! One run of the machine is one power-on session of the device:
//!
//! ```text
//!            +-------+     EnterServe      +-------+
//!  cause --> | Reset | ------------------> | Serve | <---+
//!            +-------+                     +-------+     |
//!                |                           |   |       | (echo-mode
//!                | Launch(AtReset)           |   | EnterMonitor
//!                |                           |   v       |  timeout)
//!                |                           | +---------+
//!                |        Launch(...)        | | Monitor |
//!                v                           v +---------+
//!            +--------------------------------+  |
//!            |            Launch              | <+ Launch(MonitorJump)
//!            +--------------------------------+
//! ```
//!
//! `Launch` is terminal: its outcome is the modeled jump to the resident
//! application (or a link failure), returned to the caller.

use crate::link::Link;
use crate::nvm::Nvm;
use crate::settings::Settings;

use super::events::*;
use super::states::*;
use super::{Outcome, ResetCause};

// =============================================================================
// Public Interface
// =============================================================================

/// Represents the bootloader engine state machine. Use the `factory()`
/// function to get an instance then run it by calling its `run()` method.
pub struct BootEngine<'m> {
    sm: EngineStates<'m>,
}
impl<'m> BootEngine<'m> {
    /// The engine event loop runs until the terminal `Launch` state is
    /// reached, then returns its [`Outcome`]: the reason control was handed
    /// to the resident application, or the link failure that ended the
    /// session.
    pub fn run(&mut self) -> Outcome {
        loop {
            self.sm = self.sm.step();
            if let EngineStates::Launch(sm) = &mut self.sm {
                if let Some(outcome) = sm.state.outcome.take() {
                    return outcome;
                }
            }
        }
    }
}

/// Factory function for the bootloader engine state machine. Use it to get
/// an instance of the state machine for one power-on session, which you can
/// run by invoking its `run()` method.
pub fn factory<'m>(
    settings: Settings,
    link: &'m mut dyn Link,
    nvm: &'m mut dyn Nvm,
    cause: ResetCause,
) -> BootEngine<'m> {
    BootEngine {
        // The machine naturally starts in the `Reset` state.
        sm: EngineStates::Reset(EngineSM::new(settings, link, nvm, cause)),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine implementing the bootloader engine.
///
/// This is a private interface, abstracted for a simpler and more intuitive
/// use in the public `BootEngine` interface.
///
/// Note that using a generic type that holds the current state serves two
/// purposes. It allows for also having shared data by all states that is
/// not really part of state data (the engine settings). Additionally, it's
/// nicer when debugging to see the state machine and the current state it
/// is holding at any time.
#[derive(Debug)]
struct EngineSM<'m, S: Runnable<'m>> {
    settings: Settings,
    state: S,
    _lifetime: std::marker::PhantomData<&'m ()>,
}
impl<'m, S: Runnable<'m>> EngineSM<'m, S> {
    fn run(&mut self) -> Event<'m> {
        self.state.run(&self.settings)
    }
}

/// The state machine starts in the `ResetState`.
impl<'m> EngineSM<'m, ResetState<'m>> {
    fn new(
        settings: Settings,
        link: &'m mut dyn Link,
        nvm: &'m mut dyn Nvm,
        cause: ResetCause,
    ) -> Self {
        EngineSM {
            settings,
            state: ResetState {
                link: Some(link),
                nvm: Some(nvm),
                cause,
            },
            _lifetime: std::marker::PhantomData,
        }
    }
}

/// An enum wrapper around the states of the engine state machine. It
/// provides a simpler and more intuitive model for manipulating states and
/// their transitions.
enum EngineStates<'m> {
    Reset(EngineSM<'m, ResetState<'m>>),
    Serve(EngineSM<'m, ServeState<'m>>),
    Monitor(EngineSM<'m, MonitorState<'m>>),
    Launch(EngineSM<'m, LaunchState>),
}
impl<'m> EngineStates<'m> {
    /// The unit of work in the state machine event loop. It checks the
    /// current state and the current event and decides the next transition.
    /// State transitions from events are implemented using the rust
    /// `From`/`Into` pattern. Most of the potential errors of
    /// state/event/transition mismatches can be caught at compile time.
    fn step(&mut self) -> Self {
        match self {
            EngineStates::Reset(sm) => {
                let event = sm.run();
                match event {
                    Event::EnterServe(ev) => EngineStates::Serve(ev.into()),
                    Event::Launch(ev) => EngineStates::Launch(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            EngineStates::Serve(sm) => {
                let event = sm.run();
                match event {
                    Event::EnterMonitor(ev) => EngineStates::Monitor(ev.into()),
                    Event::Launch(ev) => EngineStates::Launch(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            EngineStates::Monitor(sm) => {
                let event = sm.run();
                match event {
                    Event::Launch(ev) => EngineStates::Launch(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            EngineStates::Launch(sm) => {
                unreachable!("terminal state stepped: {:#?}", sm)
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl<'m> From<EnterServeEvent<'m>> for EngineSM<'m, ServeState<'m>> {
    fn from(event: EnterServeEvent<'m>) -> EngineSM<'m, ServeState<'m>> {
        EngineSM {
            settings: event.settings,
            state: ServeState {
                session: event.session,
                link: Some(event.link),
                nvm: Some(event.nvm),
            },
            _lifetime: std::marker::PhantomData,
        }
    }
}

impl<'m> From<EnterMonitorEvent<'m>> for EngineSM<'m, MonitorState<'m>> {
    fn from(event: EnterMonitorEvent<'m>) -> EngineSM<'m, MonitorState<'m>> {
        EngineSM {
            settings: event.settings,
            state: MonitorState {
                session: event.session,
                link: Some(event.link),
                nvm: Some(event.nvm),
            },
            _lifetime: std::marker::PhantomData,
        }
    }
}

impl<'m> From<LaunchEvent> for EngineSM<'m, LaunchState> {
    fn from(event: LaunchEvent) -> EngineSM<'m, LaunchState> {
        EngineSM {
            settings: event.settings,
            state: LaunchState {
                outcome: Some(event.outcome),
            },
            _lifetime: std::marker::PhantomData,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::engine::{factory, Handoff, Outcome, ResetCause};
    use crate::link::ScriptedLink;
    use crate::nvm::SimNvm;
    use crate::settings::{Settings, SettingsBuilder};

    fn settings() -> Settings {
        SettingsBuilder::new().max_idle_ticks(8).finalize()
    }

    fn programmed_nvm(settings: &Settings) -> SimNvm {
        let mut nvm = SimNvm::from_settings(settings);
        // A minimal application image: anything but erased-state bytes.
        nvm.load_flash(&[0x0C, 0x94, 0x34, 0x00]);
        nvm
    }

    fn run_session(
        settings: &Settings,
        script: &[u8],
        nvm: &mut SimNvm,
        cause: ResetCause,
    ) -> (Outcome, Vec<u8>) {
        let mut link = ScriptedLink::new(script);
        let outcome = {
            let mut engine = factory(settings.clone(), &mut link, nvm, cause);
            engine.run()
        };
        (outcome, link.sent().to_vec())
    }

    #[test]
    fn power_on_with_programmed_flash_launches_at_reset() {
        let settings = settings();
        let mut nvm = programmed_nvm(&settings);
        let (outcome, sent) =
            run_session(&settings, &[0x30, 0x20], &mut nvm, ResetCause::PowerOn);
        assert!(matches!(outcome, Outcome::Launched(Handoff::AtReset)));
        // The bootloader never even answered the host.
        assert!(sent.is_empty());
    }

    #[test]
    fn watchdog_reset_with_programmed_flash_launches_at_reset() {
        // This is the back half of the LEAVE_PROGMODE restart: the watchdog
        // fires, the fresh session sees a programmed flash and launches.
        let settings = settings();
        let mut nvm = programmed_nvm(&settings);
        let (outcome, _) = run_session(&settings, &[], &mut nvm, ResetCause::Watchdog);
        assert!(matches!(outcome, Outcome::Launched(Handoff::AtReset)));
    }

    #[test]
    fn blank_flash_always_enters_the_bootloader() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let (outcome, sent) =
            run_session(&settings, &[0x30, 0x20], &mut nvm, ResetCause::PowerOn);
        assert_eq!(sent, &[0x14, 0x10]);
        assert!(matches!(outcome, Outcome::Launched(Handoff::IdleTimeout)));
    }

    #[test]
    fn external_reset_enters_the_bootloader_despite_programmed_flash() {
        let settings = settings();
        let mut nvm = programmed_nvm(&settings);
        let (_, sent) =
            run_session(&settings, &[0x30, 0x20], &mut nvm, ResetCause::External);
        assert_eq!(sent, &[0x14, 0x10]);
    }

    #[test]
    fn without_watchdog_restart_every_reset_enters_the_bootloader() {
        let settings = SettingsBuilder::new()
            .max_idle_ticks(8)
            .watchdog_restart(false)
            .finalize();
        let mut nvm = programmed_nvm(&settings);
        let (outcome, sent) =
            run_session(&settings, &[0x30, 0x20], &mut nvm, ResetCause::PowerOn);
        assert_eq!(sent, &[0x14, 0x10]);
        assert!(matches!(outcome, Outcome::Launched(Handoff::IdleTimeout)));
    }
}
