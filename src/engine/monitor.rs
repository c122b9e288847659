//! The interactive monitor extension.
//!
//! A human (or a brave script) typing three exclamation marks in a row at
//! the serial line drops the session into a tiny line monitor: peek and
//! poke bytes in the data space, toggle the status LED, echo the UART, or
//! jump straight to the application. Everything is echoed back, so it is
//! usable from a dumb terminal at the bootloader's fixed baud rate.
//!
//! While the monitor owns the session the idle timeout is disarmed; the
//! only ways out are the explicit jump command and the echo mode, which
//! rearms the timeout on purpose.

use log::debug;

use super::dispatch::{Abort, Dispatcher, ServeEnd};
use super::Handoff;

const WELCOME: &[u8] = b"ATmegaBOOT / Hexbright - (C) ptesarik - 130617\n\r";
const PROMPT: &[u8] = b"\n\r: ";

impl<'m> Dispatcher<'m> {
    /// Run the monitor loop until it jumps to the application, re-enters
    /// timeout counting and times out, or the link dies.
    pub(crate) fn monitor(&mut self) -> ServeEnd {
        match self.monitor_loop() {
            Err(abort) => abort.into(),
            Ok(never) => match never {},
        }
    }

    fn monitor_loop(&mut self) -> Result<std::convert::Infallible, Abort> {
        // No timeout while a human is typing; 'j' leaves the monitor.
        self.session.timeout_armed = false;
        let mut led_on = true;
        debug!("monitor entered");

        self.putstr(WELCOME)?;
        loop {
            self.putstr(PROMPT)?;
            match self.echogetch()? {
                // Toggle the status LED, report the new state.
                b't' => {
                    led_on = !led_on;
                    self.putch(if led_on { b'1' } else { b'0' })?;
                }

                // Read a byte from a data-space address: `r XXXX` -> `=YY`.
                b'r' => {
                    self.echogetch()?;
                    let high = self.gethex()?;
                    let low = self.gethex()?;
                    self.putch(b'=')?;
                    let address = u16::from_be_bytes([high, low]);
                    let value = self.nvm.data_read(address);
                    self.puthex(value)?;
                }

                // Write a byte to a data-space address: `w XXXX YY`.
                b'w' => {
                    self.echogetch()?;
                    let high = self.gethex()?;
                    let low = self.gethex()?;
                    self.echogetch()?;
                    let value = self.gethex()?;
                    let address = u16::from_be_bytes([high, low]);
                    self.nvm.data_write(address, value);
                }

                // Echo mode: rearm the timeout and echo until it fires.
                b'u' => {
                    self.session.timeout_armed = true;
                    loop {
                        self.echogetch()?;
                    }
                }

                b'j' => {
                    debug!("monitor jump to application");
                    return Err(Abort::Launch(Handoff::MonitorJump));
                }

                _ => {}
            }
        }
    }

    // Monitor line helpers ===================================================

    fn putstr(&mut self, bytes: &[u8]) -> Result<(), Abort> {
        for &byte in bytes {
            self.putch(byte)?;
        }
        Ok(())
    }

    fn echogetch(&mut self) -> Result<u8, Abort> {
        let byte = self.getch()?;
        self.putch(byte)?;
        Ok(byte)
    }

    /// One echoed hex digit. Anything below '0' passes through raw, which
    /// is useless but harmless; the monitor trusts its operator.
    fn gethexnib(&mut self) -> Result<u8, Abort> {
        let digit = self.echogetch()?;
        if digit >= b'a' {
            Ok(digit - b'a' + 0x0a)
        } else if digit >= b'0' {
            Ok(digit - b'0')
        } else {
            Ok(digit)
        }
    }

    /// Two echoed hex digits, high nibble first.
    fn gethex(&mut self) -> Result<u8, Abort> {
        let high = self.gethexnib()?;
        let low = self.gethexnib()?;
        Ok((high << 4) | low)
    }

    fn puthex(&mut self, value: u8) -> Result<(), Abort> {
        let digit = |nibble: u8| {
            if nibble >= 0x0a {
                nibble - 0x0a + b'a'
            } else {
                nibble + b'0'
            }
        };
        self.putch(digit(value >> 4))?;
        self.putch(digit(value & 0x0f))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::engine::{factory, Handoff, Outcome, ResetCause};
    use crate::link::ScriptedLink;
    use crate::nvm::{Nvm, SimNvm};
    use crate::settings::{Settings, SettingsBuilder};

    use super::super::wire;

    fn settings() -> Settings {
        SettingsBuilder::new().max_idle_ticks(8).finalize()
    }

    fn run_session(
        settings: &Settings,
        script: &[u8],
        nvm: &mut SimNvm,
    ) -> (Outcome, Vec<u8>) {
        let mut link = ScriptedLink::new(script);
        let outcome = {
            let mut engine =
                factory(settings.clone(), &mut link, nvm, ResetCause::External);
            engine.run()
        };
        (outcome, link.sent().to_vec())
    }

    #[test]
    fn trigger_enters_monitor_and_jump_leaves_it() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let (outcome, sent) = run_session(&settings, b"!!!j", &mut nvm);
        assert!(matches!(outcome, Outcome::Launched(Handoff::MonitorJump)));
        // Banner, one prompt, the echoed command.
        let mut expected = super::WELCOME.to_vec();
        expected.extend_from_slice(super::PROMPT);
        expected.push(b'j');
        assert_eq!(sent, expected);
    }

    #[test]
    fn incomplete_trigger_is_swallowed_silently() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        // Two marks and a stray byte vanish without a reply or an error;
        // the next real command still works.
        let script = [b'!', b'!', 0x30, wire::STK_GET_SYNC, wire::CRC_EOP];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        assert_eq!(sent, &[wire::STK_INSYNC, wire::STK_OK]);
    }

    #[test]
    fn trigger_is_an_unknown_opcode_when_monitor_is_disabled() {
        let settings = SettingsBuilder::new()
            .max_idle_ticks(8)
            .monitor(false)
            .finalize();
        let mut nvm = SimNvm::from_settings(&settings);
        let (_, sent) = run_session(&settings, &[b'!', wire::CRC_EOP], &mut nvm);
        assert_eq!(sent, &[wire::STK_UNKNOWN]);
    }

    #[test]
    fn peek_reads_the_data_space() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        nvm.data_write(0x0123, 0x5A);
        let (outcome, sent) = run_session(&settings, b"!!!r 0123j", &mut nvm);
        assert!(matches!(outcome, Outcome::Launched(Handoff::MonitorJump)));
        let text = String::from_utf8_lossy(&sent).into_owned();
        assert!(text.contains("=5a"), "reply missing from {:?}", text);
    }

    #[test]
    fn poke_writes_the_data_space() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let (outcome, _) = run_session(&settings, b"!!!w 00ff a5j", &mut nvm);
        assert!(matches!(outcome, Outcome::Launched(Handoff::MonitorJump)));
        assert_eq!(nvm.data_read(0x00FF), 0xA5);
    }

    #[test]
    fn led_toggle_reports_the_new_state() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        // The LED starts on, so the first toggle reports '0', the next '1'.
        let (_, sent) = run_session(&settings, b"!!!ttj", &mut nvm);
        let text = String::from_utf8_lossy(&sent).into_owned();
        assert!(text.contains("t0"), "first toggle missing from {:?}", text);
        assert!(text.contains("t1"), "second toggle missing from {:?}", text);
    }

    #[test]
    fn echo_mode_rearms_the_idle_timeout() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let (outcome, sent) = run_session(&settings, b"!!!uab", &mut nvm);
        // 'a' and 'b' come back, then the rearmed timeout ends the session.
        assert!(matches!(outcome, Outcome::Launched(Handoff::IdleTimeout)));
        let text = String::from_utf8_lossy(&sent).into_owned();
        assert!(text.ends_with("uab"), "echo missing from {:?}", text);
    }
}
