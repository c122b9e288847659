//! States for the device server state machine.
//!
//! This modules is private and restricted to the [`device`](crate::device)
//! scope. The public interface of the state machine is provided by
//! [`device`](crate::device).
//!
//! ```ignore
//! use super::events::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::time::Duration;

use console::style;
use log::info;

use crate::engine::{self, Outcome, ResetCause};
use crate::link::SerialLink;
use crate::nvm::SimNvm;
use crate::settings::Settings;
use crate::utils;

use super::events::*;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into
/// it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state can do any work that needs to be done and
    /// when finished, requests transition to a new state by returning the
    /// appropriate `event`. The `event` is then consumed to create the new
    /// `state` using the corresponding `From` trait implementation if
    /// available.
    fn run(&mut self, settings: &Settings) -> Event;
}

// Init State ==================================================================

/// Represents the initial state of the device server state machine.
///
/// From the `InitState`, the state machine can evolve via the following
/// transitions:
///
///  * **`WaitForPortEvent` => `WaitForPortState`** when a specific device
///    path was provided in the settings,
///  * **`SelectPortEvent` => `SelectPortState`** when no device path was
///    provided in the settings.
#[derive(Debug)]
pub(crate) struct InitState {}
impl Runnable for InitState {
    /// At the `Init` state, check if the provided `settings` have a device
    /// path, and if yes, transition to the `WaitForPort` state; otherwise
    /// transition to the `SelectPort` state.
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> Init");
        match settings.path {
            Some(_) => Event::WaitForPort(WaitForPortEvent {
                settings: settings.clone(),
            }),
            None => Event::SelectPort(SelectPortEvent {
                settings: settings.clone(),
            }),
        }
    }
}

// WaitForPortState ============================================================

#[derive(Debug)]
pub(crate) struct WaitForPortState {}
impl Runnable for WaitForPortState {
    fn run(&mut self, settings: &Settings) -> Event {
        let path = settings.path.as_ref().unwrap();
        info!("=> WaitForPort");
        let canceled = utils::wait_for_port(path);
        if canceled {
            Event::SelectPort(SelectPortEvent {
                settings: settings.clone(),
            })
        } else {
            // The wait for port to be ready completed without cancellation.
            // Fire the `PortReady` event to trigger the transition to the
            // next state.
            Event::PortReady(PortReadyEvent {
                settings: settings.clone(),
            })
        }
    }
}

// SelectPortState =============================================================

#[derive(Debug)]
pub(crate) struct SelectPortState {}
impl Runnable for SelectPortState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> SelectPort");
        let selection = utils::select_port();
        match selection {
            // We have a serial port device path that we now need to update in
            // the settings and then trigger the transition via the
            // `PortReady` event.
            Some(path) => {
                let mut cloned_settings = settings.clone();
                cloned_settings.path = Some(path);
                Event::PortReady(PortReadyEvent {
                    settings: cloned_settings,
                })
            }
            None => Event::SelectPort(SelectPortEvent {
                settings: settings.clone(),
            }),
        }
    }
}

// ServiceState ================================================================

/// The working state: one emulated device on one open serial port, serving
/// bootloader sessions until the port dies or the user exits.
///
/// Each pass through the session loop is one power-on of the device. The
/// programming host pulls the reset line before talking to the bootloader,
/// so every session starts from an external reset; the application
/// "running" between sessions is the server waiting for the next one. After
/// every handoff the flash contents are written back to the image file, so
/// the programmed application survives a restart of the server.
#[derive(Debug)]
pub(crate) struct ServiceState {}
impl Runnable for ServiceState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> Service");

        let port = match utils::open_and_setup_port(settings) {
            Ok(port) => port,
            Err(_) => {
                // The port came up but could not be opened; wait for it to
                // be ready again.
                return Event::PortError(PortErrorEvent {
                    settings: settings.clone(),
                });
            }
        };

        let mut link = SerialLink::new(port, Duration::from_millis(1));
        let mut nvm = SimNvm::from_settings(settings);
        if let Some(path) = &settings.image {
            match utils::load_image(path) {
                Ok(image) => nvm.load_flash(&image),
                Err(ref e) => {
                    info!("No flash image loaded from {}: {}", path, e);
                    println!(
                        "{}",
                        style(format!("[HB] 📄 Starting with blank flash ({})", e))
                            .yellow()
                    );
                }
            }
        }

        loop {
            let outcome = {
                let mut engine = engine::factory(
                    settings.clone(),
                    &mut link,
                    &mut nvm,
                    ResetCause::External,
                );
                engine.run()
            };

            match outcome {
                Outcome::Launched(handoff) => {
                    println!(
                        "{}",
                        style(format!("[HB] 🚀 Application launched ({:?})", handoff))
                            .green()
                    );
                    if let Some(path) = &settings.image {
                        if let Err(ref e) = utils::save_image(path, nvm.flash()) {
                            info!("error: {:?}", e.to_string());
                        }
                    }
                }
                Outcome::LinkFailed(ref e) => {
                    info!("error: {:?}", e.to_string());
                    return Event::PortError(PortErrorEvent {
                        settings: settings.clone(),
                    });
                }
            }

            // Give the user a way out between sessions.
            if let Ok(true) = utils::poll_escape() {
                return Event::Done(DoneEvent {
                    settings: settings.clone(),
                    with_errors: false,
                });
            }
        }
    }
}

// Done State ==================================================================

#[derive(Debug, Copy, Clone)]
pub(crate) struct DoneState {
    pub with_error: bool,
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!(
            "=> Done with{}errors",
            if self.with_error { " " } else { " no " }
        );
        // Report errors
        if self.with_error {
            println!(
                "{}",
                style("[HB] 💥 Unrecoverable error on the serial port!").red()
            );
            println!("[HB] 🔌 Remove and recreate the port!");
        }

        Event::Exit(ExitEvent {
            settings: settings.clone(),
            with_error: self.with_error,
        })
    }
}
