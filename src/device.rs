//! The emulated bootloader device served over a serial port.
//!
//! **Example** - Executing the state machine the event loop:
//! ```no_run
//! use hexboot::{self as hb, DeviceServer};
//!
//! let settings = hb::SettingsBuilder::default().finalize();
//! let mut server = hb::singleton(settings);
//! let status = server.run(); // status code returned after the `Exit` event
//! println!("status: {}", status);
//! std::process::exit(0);
//! ```

mod events;
mod state_machine;
mod states;

pub use state_machine::{singleton, DeviceServer};
