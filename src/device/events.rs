//! Events for the device server state machine.
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

use crate::settings::Settings;

// =============================================================================
// Crate-Public Interface
// =============================================================================

// WaitForPortEvent ============================================================

/// Event fired to trigger a transition to the `WaitForPort` state.
///
/// This event can happen under one of the following circumstances:
///
///  1. While at the `Init` state and a port name was provided. In such case,
///     port selection is skipped and we just want to hold-on until the port
///     is created (meaning the other end of the serial pair exists).
///  2. When an unrecoverable port error occurs while at the `Service` state.
///     This usually results from the port going away and would require a new
///     port to be opened.
#[derive(Debug)]
pub(crate) struct WaitForPortEvent {
    pub settings: Settings,
}

// SelectPortEvent =============================================================

/// Event fired to trigger the transition to the `SelectPort` state.
///
/// This event can happen under one of the following circumstances:
///
///  1. If the program is started with no specific device path provided. In
///     such case, the server will immediately transition into the port
///     selection state from the initial state.
///  2. If the program was started with a specific device path provided, but
///     the port is not ready and we are waiting for it, and the user cancels
///     the wait by pressing the `ESC` key.
///  3. If the program is in the port selection state and the user decides to
///     not select any port (by hitting the `ESC` key) to refresh the list
///     and be presented with an updated list of available ports.
#[derive(Debug)]
pub(crate) struct SelectPortEvent {
    pub settings: Settings,
}

// PortReadyEvent ==============================================================

/// Event fired when we have a serial port with a valid device path on the
/// system. This would be the result of either the port we were waiting on
/// has come up or a port was selected from the list of detected ports.
///
/// This event can be fired from the `WaitForPort` or `SelectPort` states and
/// triggers a transition to the `Service` state.
#[derive(Debug)]
pub(crate) struct PortReadyEvent {
    pub settings: Settings,
}

// PortErrorEvent ==============================================================

/// Event fired when an error related to the serial port (usually a
/// communication error resulting from the port going away) occurs.
///
/// This event can be fired only from the `Service` state and triggers a
/// transition into the `WaitForPort` state.
#[derive(Debug)]
pub(crate) struct PortErrorEvent {
    pub settings: Settings,
}

// DoneEvent ===================================================================

/// Event fired when the program completes and is about to terminate. It
/// triggers a transition to the `Done` state.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub settings: Settings,
    pub with_errors: bool,
}

// ExitEvent ===================================================================

/// The last event that can be triggered in the device server and will result
/// in the event loop terminating with an `exit status`, handing back the
/// control to the original caller that started the event loop.
///
/// The returned `status code` can be used as an exit code from the `main`
/// function.
///
/// **Example**
/// ```no_run
/// use hexboot::{self as hb, DeviceServer};
///
/// let settings = hb::SettingsBuilder::new().finalize();
/// let mut server = hb::singleton(settings);
/// let status = server.run(); // status code returned after the `Exit` event
/// println!("status: {}", status);
/// std::process::exit(0);
/// ```
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub settings: Settings,
    pub with_error: bool,
}

// Events enum ==================================================================

/// Events that can be triggered within the device server state machine.
///
/// Each possible value holds an `event`, which in turn may hold additional
/// data for the state transition. Such data is passed by the origin state
/// for potential use by the target state.
#[derive(Debug)]
pub(crate) enum Event {
    WaitForPort(WaitForPortEvent),
    SelectPort(SelectPortEvent),
    PortReady(PortReadyEvent),
    PortError(PortErrorEvent),
    Done(DoneEvent),
    Exit(ExitEvent),
}
