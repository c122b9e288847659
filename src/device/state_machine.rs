//! Serial port device selection and state management.
//!
//! The emulated device serves over a serial port which can be specified at
//! the command line or can be selected out of the list of available ports
//! on the system. Due to the transient nature of the serial connection when
//! virtual port pairs are created and torn down (or adapters plugged in and
//! out), we need some flexibility in handling cases where the port is not
//! ready or when the port is removed and created again, and the port names
//! may change in between.
//!
//! The following state diagram summarizes the different states and
//! transitions the device server goes through:
//!
//! ```text
//!                            START
//!                              |
//!                              v
//!                          .-------.
//!                          | Init  |
//!                          '-------'
//!                              |
//!                              v
//!                    no  .----------.  yes
//!                  .----( port_name? )----.
//!      .-----.     |     '----------'     |
//!      |     |     v                      v
//!      |    .------------.         .-------------.
//!      '--->| SelectPort |<-----.--| WaitForPort |<---.
//!           '------------'      |  '-------------'    |
//!              |              port                    |
//!              |              ready                   |
//!              |                v                     |
//!             port     ******************             |
//!             ready    *    Service     *     port    |
//!              |       ******************     error   |
//!              '------>* Engine Session *-------------'
//!                      *      Loop      *
//!                      ******************
//!                               |
//!                               v
//!                              END
//! ```

use std::sync::{Arc, Mutex, Once};

use super::events::*;
use super::states::*;
use crate::settings::Settings;

// =============================================================================
// Public Interface
// =============================================================================

// -----------------------------------------------------------------------------
// Device Server Singleton
// -----------------------------------------------------------------------------

pub trait DeviceServer {
    fn run(&mut self) -> i8;
}

/// Encapsulate the state machine creation and event loop to provide a
/// concise and simple public interface to the module users.
///
/// Only one instance of this struct exists, using the `singleton` pattern,
/// and which can accessed by calling the `singleton()` function.
#[derive(Clone)]
pub struct SingletonReader {
    // Since this can be used in many threads, we need to protect concurrent
    // access
    inner: Arc<Mutex<DeviceServerStates>>,
}
impl DeviceServer for SingletonReader {
    /// The device server event loop runs until the `Done` state is reached
    /// and its `should_exit` flag is set. At such point, the event loop
    /// terminates and returns an exit code indicating no errors when equal
    /// to **`0`**; otherwise a termination with error.
    ///
    /// The returned status code could be used as an exit code from the
    /// command line interface.
    fn run(&mut self) -> i8 {
        loop {
            let mut data = self.inner.lock().unwrap();
            *data = data.step();
            if let DeviceServerStates::Done(sm) = &*data {
                if sm.state.should_exit {
                    return if sm.state.with_error { 1 } else { 0 };
                }
            }
        }
    }
}

/// Returns the single instance of the device server.
///
/// In order to use the singleton instance, proper locking needs to be
/// observed. The example below demonstrates an example usage scenario:
///
/// ```ignore
///     let settings = SettingsBuilder::new().finalize();
///     let mut s = singleton(settings);
///     s.run();
/// ```
pub fn singleton(settings: Settings) -> SingletonReader {
    // Initialize it to a null value
    static mut DS_SINGLETON: *const SingletonReader = 0 as *const SingletonReader;
    static DS_ONCE: Once = Once::new();

    unsafe {
        DS_ONCE.call_once(|| {
            // Make it
            let singleton = SingletonReader {
                inner: Arc::new(Mutex::new(DeviceServerStates::Init(
                    DeviceServerStateMachine::new(settings),
                ))),
            };

            // Put it in the heap so it can outlive this call
            DS_SINGLETON = std::mem::transmute(Box::new(singleton));
        });

        // Now we give out a copy of the data that is safe to use concurrently.
        (*DS_SINGLETON).clone()
    }
}

// =============================================================================
// Private stuff
// =============================================================================

// -----------------------------------------------------------------------------
// The State Machine
// -----------------------------------------------------------------------------

/// The state machine implementing the server's management of serial port
/// device lifecycle.
///
/// Note that using a generic type that holds the current state serves two
/// purposes. It allows for also having shared data by all states that is
/// not really part of state data (e.g. state machine parameters,
/// statistics, etc...). Additionally, it's nicer when debugging to see the
/// state machine and the current state it is holding at any time.
#[derive(Debug)]
struct DeviceServerStateMachine<S: Runnable> {
    settings: Settings,
    state: S,
}
impl<S: Runnable> DeviceServerStateMachine<S> {
    fn run(&mut self) -> Event {
        self.state.run(&self.settings)
    }
}

/// The device server state machine starts in the `InitState`.
impl DeviceServerStateMachine<InitState> {
    fn new(settings: Settings) -> Self {
        DeviceServerStateMachine {
            settings,
            state: InitState {},
        }
    }
}

/// Wraps the state machine and its various states into a simple enum, which
/// can also be used for pattern matching during state transitions.
enum DeviceServerStates {
    Init(DeviceServerStateMachine<InitState>),
    WaitForPort(DeviceServerStateMachine<WaitForPortState>),
    SelectPort(DeviceServerStateMachine<SelectPortState>),
    Service(DeviceServerStateMachine<ServiceState>),
    Done(DeviceServerStateMachine<DoneState>),
}
impl DeviceServerStates {
    fn step(&mut self) -> Self {
        match self {
            DeviceServerStates::Init(sm) => {
                let event = sm.run();
                match event {
                    Event::WaitForPort(ev) => DeviceServerStates::WaitForPort(ev.into()),
                    Event::SelectPort(ev) => DeviceServerStates::SelectPort(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            DeviceServerStates::WaitForPort(sm) => {
                let event = sm.run();
                match event {
                    Event::PortReady(ev) => DeviceServerStates::Service(ev.into()),
                    Event::SelectPort(ev) => DeviceServerStates::SelectPort(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            DeviceServerStates::SelectPort(sm) => {
                let event = sm.run();
                match event {
                    Event::SelectPort(ev) => DeviceServerStates::SelectPort(ev.into()),
                    Event::PortReady(ev) => DeviceServerStates::Service(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            DeviceServerStates::Service(sm) => {
                let event = sm.run();
                match event {
                    Event::Done(ev) => DeviceServerStates::Done(ev.into()),
                    Event::PortError(ev) => DeviceServerStates::WaitForPort(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            DeviceServerStates::Done(sm) => {
                let event = sm.run();
                match event {
                    Event::Exit(ev) => DeviceServerStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<WaitForPortEvent> for DeviceServerStateMachine<WaitForPortState> {
    fn from(event: WaitForPortEvent) -> DeviceServerStateMachine<WaitForPortState> {
        DeviceServerStateMachine {
            settings: event.settings,
            state: WaitForPortState {},
        }
    }
}
impl From<PortErrorEvent> for DeviceServerStateMachine<WaitForPortState> {
    fn from(event: PortErrorEvent) -> DeviceServerStateMachine<WaitForPortState> {
        DeviceServerStateMachine {
            settings: event.settings,
            state: WaitForPortState {},
        }
    }
}

impl From<SelectPortEvent> for DeviceServerStateMachine<SelectPortState> {
    fn from(event: SelectPortEvent) -> DeviceServerStateMachine<SelectPortState> {
        DeviceServerStateMachine {
            settings: event.settings,
            state: SelectPortState {},
        }
    }
}

impl From<PortReadyEvent> for DeviceServerStateMachine<ServiceState> {
    fn from(event: PortReadyEvent) -> DeviceServerStateMachine<ServiceState> {
        DeviceServerStateMachine {
            settings: event.settings,
            state: ServiceState {},
        }
    }
}

impl From<DoneEvent> for DeviceServerStateMachine<DoneState> {
    fn from(event: DoneEvent) -> DeviceServerStateMachine<DoneState> {
        DeviceServerStateMachine {
            settings: event.settings,
            state: DoneState {
                with_error: event.with_errors,
                should_exit: false,
            },
        }
    }
}
impl From<ExitEvent> for DeviceServerStateMachine<DoneState> {
    fn from(event: ExitEvent) -> DeviceServerStateMachine<DoneState> {
        DeviceServerStateMachine {
            settings: event.settings,
            state: DoneState {
                with_error: event.with_error,
                should_exit: true,
            },
        }
    }
}
