//! Serial link abstraction for the bootloader engine.
//!
//! The engine only ever needs two operations: poll for one byte and push
//! one byte out. Both are blocking from the protocol's point of view; the
//! polling side additionally reports idle polls so the engine can count
//! them against its timeout threshold instead of measuring wall-clock time.

use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::Duration;

use serialport::SerialPort;

// =============================================================================
// Public Interface
// =============================================================================

/// One end of the bootloader's serial line.
///
/// `recv` returning `Ok(None)` means one idle poll elapsed with no data;
/// the engine counts those ticks toward its idle-timeout threshold. An
/// `Err` from either operation means the link itself is gone (device
/// unplugged, pty closed) and ends the session.
pub trait Link {
    /// Poll for one byte; `Ok(None)` after one idle poll period.
    fn recv(&mut self) -> io::Result<Option<u8>>;

    /// Block until `byte` has been handed to the transmitter.
    fn send(&mut self, byte: u8) -> io::Result<()>;

    /// Human readable name of the link for diagnostics.
    fn name(&self) -> Option<String> {
        None
    }
}

// SerialLink ==================================================================

/// A [`Link`] over a real serial port.
///
/// To handle the unreliable behavior of blocking/non-blocking reads over
/// the serial port, we first check the available data in the port's input
/// buffer and only read when at least one byte is there. That way a read
/// never blocks and an empty buffer becomes one idle poll (after sleeping
/// one poll period, so idle polling does not spin a host CPU).
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    poll_period: Duration,
}

impl SerialLink {
    /// Wrap an already opened and configured serial port, polling for input
    /// every `poll_period`.
    pub fn new(port: Box<dyn SerialPort>, poll_period: Duration) -> Self {
        SerialLink { port, poll_period }
    }
}

impl Link for SerialLink {
    fn recv(&mut self) -> io::Result<Option<u8>> {
        let available = self.port.bytes_to_read().map_err(io::Error::from)?;
        if available == 0 {
            thread::sleep(self.poll_period);
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte)?;
        Ok(Some(byte[0]))
    }

    fn send(&mut self, byte: u8) -> io::Result<()> {
        self.port.write_all(&[byte])?;
        Ok(())
    }

    fn name(&self) -> Option<String> {
        self.port.name()
    }
}

// ScriptedLink ================================================================

/// A [`Link`] fed from a canned byte script, capturing everything the
/// engine sends back.
///
/// Once the script is exhausted every poll reports idle, so an engine left
/// waiting will eventually take its timeout escape hatch. This is the
/// backend used by the protocol tests and is also useful for replaying a
/// recorded host session against the engine.
pub struct ScriptedLink {
    input: VecDeque<u8>,
    sent: Vec<u8>,
}

impl ScriptedLink {
    pub fn new(script: &[u8]) -> Self {
        ScriptedLink {
            input: script.iter().copied().collect(),
            sent: Vec::new(),
        }
    }

    /// Everything the engine has sent so far.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Append more host bytes to the script.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }
}

impl Link for ScriptedLink {
    fn recv(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn send(&mut self, byte: u8) -> io::Result<()> {
        self.sent.push(byte);
        Ok(())
    }

    fn name(&self) -> Option<String> {
        Some("scripted".into())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_link_replays_and_captures() {
        let mut link = ScriptedLink::new(&[0x30, 0x20]);
        assert_eq!(link.recv().unwrap(), Some(0x30));
        assert_eq!(link.recv().unwrap(), Some(0x20));
        assert_eq!(link.recv().unwrap(), None);

        link.send(0x14).unwrap();
        link.send(0x10).unwrap();
        assert_eq!(link.sent(), &[0x14, 0x10]);
    }

    #[test]
    fn scripted_link_feed_appends() {
        let mut link = ScriptedLink::new(&[]);
        assert_eq!(link.recv().unwrap(), None);
        link.feed(&[0xAA]);
        assert_eq!(link.recv().unwrap(), Some(0xAA));
    }
}
