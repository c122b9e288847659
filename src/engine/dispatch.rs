//! Opcode dispatch and the page programmer / memory reader.
//!
//! One dispatch step per opcode: read the opcode, consume exactly the body
//! bytes that opcode specifies (on success *and* error paths, so stream
//! framing survives a bad exchange), run the effect, send the framed
//! response. The dispatcher is stateless between commands except for the
//! [`Session`] record threaded through it.

use std::io;

use log::{debug, trace};

use crate::link::Link;
use crate::nvm::Nvm;
use crate::settings::Settings;

use super::session::Session;
use super::wire;
use super::Handoff;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Why the dispatch loop stopped.
pub(crate) enum ServeEnd {
    /// Hand control to the application for the given reason.
    Launch(Handoff),
    /// The monitor trigger was received; the monitor owns the session now.
    Monitor,
    /// The link died under us.
    LinkDown(io::Error),
}

/// Abnormal unwind of a single command, propagated with `?`. Protocol
/// errors never take this path — they are recovered locally (reply +
/// counter) per the error handling design; only the escape hatch and a
/// dead link do.
pub(super) enum Abort {
    Launch(Handoff),
    Link(io::Error),
}

impl From<Abort> for ServeEnd {
    fn from(abort: Abort) -> ServeEnd {
        match abort {
            Abort::Launch(handoff) => ServeEnd::Launch(handoff),
            Abort::Link(err) => ServeEnd::LinkDown(err),
        }
    }
}

enum Flow {
    Continue,
    EnterMonitor,
}

/// The command dispatcher: borrows the engine's link, memory and session
/// for the duration of one serve (or monitor) loop.
pub(crate) struct Dispatcher<'m> {
    pub(super) link: &'m mut dyn Link,
    pub(super) nvm: &'m mut dyn Nvm,
    pub(super) settings: &'m Settings,
    pub(super) session: &'m mut Session,
}

impl<'m> Dispatcher<'m> {
    pub(crate) fn new(
        link: &'m mut dyn Link,
        nvm: &'m mut dyn Nvm,
        settings: &'m Settings,
        session: &'m mut Session,
    ) -> Self {
        Dispatcher {
            link,
            nvm,
            settings,
            session,
        }
    }

    /// The dispatch loop: read opcode, dispatch, respond, repeat, until the
    /// escape hatch fires or the monitor takes over.
    pub(crate) fn serve(&mut self) -> ServeEnd {
        loop {
            let opcode = match self.getch() {
                Ok(byte) => byte,
                Err(abort) => return abort.into(),
            };
            trace!("opcode {:#04x}", opcode);
            match self.dispatch(opcode) {
                Ok(Flow::Continue) => {}
                Ok(Flow::EnterMonitor) => return ServeEnd::Monitor,
                Err(abort) => return abort.into(),
            }
        }
    }

    fn dispatch(&mut self, opcode: u8) -> Result<Flow, Abort> {
        match opcode {
            // Hello, is anyone home?
            wire::STK_GET_SYNC => self.nothing_response()?,

            wire::STK_GET_SIGN_ON => {
                if self.check_sync()? {
                    self.reply(wire::SIGN_ON_REPLY)?;
                }
            }

            // Board parameters. The device is fixed, so values are consumed
            // and discarded; ids above 0x85 carry one extra value byte.
            wire::STK_SET_PARAMETER => {
                let id = self.getch()?;
                if id > 0x85 {
                    self.getch()?;
                }
                self.nothing_response()?;
            }

            wire::STK_GET_PARAMETER => {
                let id = self.getch()?;
                let value = match id {
                    wire::PARM_STK_HW_VER => self.settings.hw_version,
                    wire::PARM_STK_SW_MAJOR => self.settings.sw_major,
                    wire::PARM_STK_SW_MINOR => self.settings.sw_minor,
                    // Required by AVR Studio 3.56.
                    0x98 => 0x03,
                    // A harmless default keeps unfamiliar host probes from
                    // wedging the session.
                    _ => 0x00,
                };
                self.byte_response(value)?;
            }

            // Device descriptors, don't care: the device is fixed.
            wire::STK_SET_DEVICE => {
                self.get_nch(wire::SET_DEVICE_LEN)?;
                self.nothing_response()?;
            }
            wire::STK_SET_DEVICE_EXT => {
                self.get_nch(wire::SET_DEVICE_EXT_LEN)?;
                self.nothing_response()?;
            }

            // No bulk erase happens: erasure is lazy, one page at a time,
            // during programming.
            wire::STK_ENTER_PROGMODE | wire::STK_CHIP_ERASE | wire::STK_CHECK_AUTOINC => {
                self.nothing_response()?
            }

            wire::STK_LEAVE_PROGMODE => {
                self.nothing_response()?;
                if self.settings.watchdog_restart {
                    // Autoreset via watchdog (sneaky!): the application
                    // starts without the host toggling a reset line.
                    return Err(Abort::Launch(Handoff::WatchdogRestart));
                }
            }

            wire::STK_LOAD_ADDRESS => self.load_address()?,
            wire::STK_UNIVERSAL => self.universal_command()?,
            wire::STK_PROG_PAGE => self.prog_page()?,
            wire::STK_READ_PAGE => self.read_page()?,

            wire::STK_READ_SIGN => {
                if self.check_sync()? {
                    let signature = self.settings.signature;
                    self.reply(&signature)?;
                }
            }

            wire::STK_READ_OSCCAL => self.byte_response(0x00)?,

            wire::MONITOR_TRIGGER if self.settings.monitor => {
                // Three exclamation marks in a row enter the monitor; an
                // incomplete trigger is swallowed silently.
                if self.getch()? == wire::MONITOR_TRIGGER
                    && self.getch()? == wire::MONITOR_TRIGGER
                {
                    return Ok(Flow::EnterMonitor);
                }
            }

            _ => {
                if self.check_sync()? {
                    self.putch(wire::STK_UNKNOWN)?;
                }
                self.error()?;
            }
        }
        Ok(Flow::Continue)
    }

    // Command bodies =========================================================

    /// Addresses arrive as little-endian 16-bit **word** indices; both
    /// memory spaces are word-addressable but every internal operation
    /// wants byte offsets, so double on the way in.
    fn load_address(&mut self) -> Result<(), Abort> {
        let lo = self.getch()?;
        let hi = self.getch()?;
        let word = u16::from_le_bytes([lo, hi]);
        self.session.address = (word as u32) << 1;
        self.nothing_response()
    }

    /// Vendor 4-byte SPI passthrough. Two sub-forms are recognized by bit
    /// pattern — signature byte reads and fuse/lock byte reads — anything
    /// else gets a default byte. Best-effort compatibility shims.
    fn universal_command(&mut self) -> Result<(), Abort> {
        let byte1 = self.getch()?;
        let byte2 = self.getch()?;
        let byte3 = self.getch()?;
        let _byte4 = self.getch()?;

        let value = if byte1 == 0x30 && byte2 == 0x00 {
            // Read signature byte N.
            *self
                .settings
                .signature
                .get(byte3 as usize)
                .unwrap_or(&0x00)
        } else if (byte1 & !0x08) == 0x50 && (byte2 & !0x08) == 0x00 {
            // Read lock/lfuse/hfuse/efuse: bit 3 of each of the first two
            // bytes selects which one.
            let select = ((byte1 >> 3) & 0x01) | (((byte2 >> 3) & 0x01) << 1);
            self.nvm.fuse_byte(select)
        } else {
            0x00
        };
        self.byte_response(value)
    }

    /// The write path: buffer the whole payload, validate the terminator,
    /// then commit. Length is big-endian and in bytes.
    fn prog_page(&mut self) -> Result<(), Abort> {
        let hi = self.getch()?;
        let lo = self.getch()?;
        let length = u16::from_be_bytes([hi, lo]) as usize;
        let memtype = self.getch()?;

        // The host has already committed to sending the full payload, so
        // take it all before validating anything: the serial stream cannot
        // be kept up with while programming pages anyway.
        let mut buffer = vec![0u8; length];
        for slot in buffer.iter_mut() {
            *slot = self.getch()?;
        }

        if !self.check_sync()? {
            // Bad terminator: drained, replied, counted. Memory untouched.
            return Ok(());
        }

        if memtype == wire::MEMTYPE_EEPROM {
            // EEPROM goes one byte at a time; each write waits out the
            // previous one.
            for &byte in &buffer {
                self.nvm.eeprom_write(self.session.address, byte);
                self.session.address += 1;
            }
        } else {
            // Even up an odd number of bytes with an erased-state pad.
            if length % 2 != 0 {
                buffer.push(0xFF);
            }
            self.program_flash(&buffer);
        }
        debug!(
            "programmed {} bytes of {} up to {:#06x}",
            length,
            if memtype == wire::MEMTYPE_EEPROM {
                "eeprom"
            } else {
                "flash"
            },
            self.session.address
        );

        // Success is reported only once the payload is durably committed.
        self.putch(wire::STK_INSYNC)?;
        self.putch(wire::STK_OK)
    }

    /// Erase/fill/commit one word at a time. The words-filled counter
    /// persists across the whole transfer: a payload can span multiple
    /// pages or end mid-page, and each page still gets exactly one erase
    /// before its fill and one commit after.
    fn program_flash(&mut self, data: &[u8]) {
        debug_assert!(data.len() % 2 == 0);
        let page_words = self.settings.page_words;
        let mut page_word_count = 0;
        let mut index = 0;

        while index < data.len() {
            if page_word_count == 0 {
                self.nvm.erase_page(self.session.address);
            }

            let word = u16::from_le_bytes([data[index], data[index + 1]]);
            self.nvm.load_word(self.session.address, word);
            let word_address = self.session.address;
            self.session.address += 2;
            index += 2;
            page_word_count += 1;

            // Page full, or a non-empty partial page at the end of the
            // transfer: commit it.
            if page_word_count == page_words || index == data.len() {
                self.nvm.commit_page(word_address);
                page_word_count = 0;
            }
        }
    }

    /// The read path: stream bytes straight from memory to the host, no
    /// local buffering. Length is big-endian and in bytes.
    fn read_page(&mut self) -> Result<(), Abort> {
        let hi = self.getch()?;
        let lo = self.getch()?;
        let length = u16::from_be_bytes([hi, lo]) as u32;
        let memtype = self.getch()?;

        if !self.check_sync()? {
            return Ok(());
        }

        self.putch(wire::STK_INSYNC)?;
        for _ in 0..length {
            let byte = if memtype == wire::MEMTYPE_EEPROM {
                self.nvm.eeprom_read(self.session.address)
            } else {
                self.nvm.read_flash(self.session.address)
            };
            self.putch(byte)?;
            self.session.address += 1;
        }
        self.putch(wire::STK_OK)
    }

    // Shared helpers =========================================================

    /// Block until a byte arrives. While idle (and while timeout counting
    /// is armed), every idle poll counts toward the threshold; crossing it
    /// takes the escape hatch — even mid-command.
    pub(super) fn getch(&mut self) -> Result<u8, Abort> {
        let mut idle_ticks: u32 = 0;
        loop {
            match self.link.recv().map_err(Abort::Link)? {
                Some(byte) => return Ok(byte),
                None => {
                    if self.session.timeout_armed {
                        idle_ticks += 1;
                        if idle_ticks > self.settings.max_idle_ticks {
                            debug!("idle timeout after {} polls", idle_ticks);
                            return Err(Abort::Launch(Handoff::IdleTimeout));
                        }
                    }
                }
            }
        }
    }

    pub(super) fn putch(&mut self, byte: u8) -> Result<(), Abort> {
        self.link.send(byte).map_err(Abort::Link)
    }

    /// Drain exactly `count` body bytes.
    fn get_nch(&mut self, count: u8) -> Result<(), Abort> {
        for _ in 0..count {
            self.getch()?;
        }
        Ok(())
    }

    /// Consume the terminator byte. On mismatch reply "no-sync", count the
    /// error, and tell the caller to skip the command's effects.
    fn check_sync(&mut self) -> Result<bool, Abort> {
        if self.getch()? != wire::CRC_EOP {
            self.putch(wire::STK_NOSYNC)?;
            self.error()?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Count one protocol error; crossing the threshold hands control to
    /// the application unconditionally.
    pub(super) fn error(&mut self) -> Result<(), Abort> {
        self.session.error_count = self.session.error_count.saturating_add(1);
        if self.session.error_count >= self.settings.max_errors {
            debug!("error limit reached ({})", self.session.error_count);
            return Err(Abort::Launch(Handoff::ErrorLimit));
        }
        Ok(())
    }

    /// Bare acknowledgement: in-sync + ok.
    fn nothing_response(&mut self) -> Result<(), Abort> {
        if self.check_sync()? {
            self.putch(wire::STK_INSYNC)?;
            self.putch(wire::STK_OK)?;
        }
        Ok(())
    }

    /// One payload byte framed between in-sync and ok.
    fn byte_response(&mut self, value: u8) -> Result<(), Abort> {
        if self.check_sync()? {
            self.putch(wire::STK_INSYNC)?;
            self.putch(value)?;
            self.putch(wire::STK_OK)?;
        }
        Ok(())
    }

    /// A payload slice framed between in-sync and ok. The terminator has
    /// already been validated by the caller.
    fn reply(&mut self, payload: &[u8]) -> Result<(), Abort> {
        self.putch(wire::STK_INSYNC)?;
        for &byte in payload {
            self.putch(byte)?;
        }
        self.putch(wire::STK_OK)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::engine::{factory, Handoff, Outcome, ResetCause};
    use crate::link::ScriptedLink;
    use crate::nvm::{PageOp, SimNvm};
    use crate::settings::{Settings, SettingsBuilder};

    use super::super::wire;

    const IN_OK: &[u8] = &[wire::STK_INSYNC, wire::STK_OK];

    fn settings() -> Settings {
        // Short timeout so exhausted scripts end sessions quickly; small
        // pages so page-spanning payloads stay readable.
        SettingsBuilder::new()
            .max_idle_ticks(8)
            .page_words(4)
            .flash_size(64)
            .eeprom_size(16)
            .finalize()
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
    fn get_sync_acknowledges() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let (outcome, sent) =
            run_session(&settings, &[wire::STK_GET_SYNC, wire::CRC_EOP], &mut nvm);
        assert_eq!(sent, IN_OK);
        // The script ran dry afterwards, so the session ended through the
        // idle-timeout escape hatch.
        assert!(matches!(outcome, Outcome::Launched(Handoff::IdleTimeout)));
    }

    #[test]
    fn sign_on_identifies() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let (_, sent) =
            run_session(&settings, &[wire::STK_GET_SIGN_ON, wire::CRC_EOP], &mut nvm);
        let mut expected = vec![wire::STK_INSYNC];
        expected.extend_from_slice(b"AVR ISP");
        expected.push(wire::STK_OK);
        assert_eq!(sent, expected);
    }

    #[test]
    fn get_parameter_reports_versions() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_GET_PARAMETER, wire::PARM_STK_HW_VER, wire::CRC_EOP,
            wire::STK_GET_PARAMETER, wire::PARM_STK_SW_MAJOR, wire::CRC_EOP,
            wire::STK_GET_PARAMETER, wire::PARM_STK_SW_MINOR, wire::CRC_EOP,
            wire::STK_GET_PARAMETER, 0x98, wire::CRC_EOP,
            wire::STK_GET_PARAMETER, 0x55, wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let frame = |v: u8| vec![wire::STK_INSYNC, v, wire::STK_OK];
        let expected: Vec<u8> = [
            frame(0x02),
            frame(0x01),
            frame(0x10),
            frame(0x03),
            frame(0x00),
        ]
        .concat();
        assert_eq!(sent, expected);
    }

    #[test]
    fn set_parameter_consumes_value_for_high_ids() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        // Id 0x86 carries a value byte, id 0x40 does not; both ack.
        let script = [
            wire::STK_SET_PARAMETER, 0x86, 0x7F, wire::CRC_EOP,
            wire::STK_SET_PARAMETER, 0x40, wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        assert_eq!(sent, [IN_OK, IN_OK].concat());
    }

    #[test]
    fn device_descriptors_are_drained() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let mut script = vec![wire::STK_SET_DEVICE];
        script.extend_from_slice(&[0u8; 20]);
        script.push(wire::CRC_EOP);
        script.push(wire::STK_SET_DEVICE_EXT);
        script.extend_from_slice(&[0u8; 5]);
        script.push(wire::CRC_EOP);
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        assert_eq!(sent, [IN_OK, IN_OK].concat());
    }

    #[test]
    fn progmode_and_chip_erase_ack_only() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_ENTER_PROGMODE, wire::CRC_EOP,
            wire::STK_CHIP_ERASE, wire::CRC_EOP,
            wire::STK_CHECK_AUTOINC, wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        assert_eq!(sent, [IN_OK, IN_OK, IN_OK].concat());
        // Erasure is lazy: no page was actually touched.
        assert!(nvm.journal().is_empty());
    }

    #[test]
    fn loaded_word_address_reads_from_doubled_byte_address() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let mut image = vec![0x00; 64];
        image[0x10] = 0xDE;
        image[0x11] = 0xAD;
        nvm.load_flash(&image);

        // Word address 0x0008 -> byte address 0x0010.
        let script = [
            wire::STK_LOAD_ADDRESS, 0x08, 0x00, wire::CRC_EOP,
            wire::STK_READ_PAGE, 0x00, 0x02, b'F', wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let mut expected: Vec<u8> = IN_OK.to_vec();
        expected.extend_from_slice(&[wire::STK_INSYNC, 0xDE, 0xAD, wire::STK_OK]);
        assert_eq!(sent, expected);
    }

    #[test]
    fn prog_then_read_round_trips() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_LOAD_ADDRESS, 0x10, 0x00, wire::CRC_EOP,
            wire::STK_PROG_PAGE, 0x00, 0x04, b'F', 0xAA, 0xBB, 0xCC, 0xDD, wire::CRC_EOP,
            wire::STK_LOAD_ADDRESS, 0x10, 0x00, wire::CRC_EOP,
            wire::STK_READ_PAGE, 0x00, 0x04, b'F', wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let mut expected: Vec<u8> = [IN_OK, IN_OK, IN_OK].concat();
        expected.extend_from_slice(&[
            wire::STK_INSYNC, 0xAA, 0xBB, 0xCC, 0xDD, wire::STK_OK,
        ]);
        assert_eq!(sent, expected);
        // Word address 0x0010 is byte address 0x0020.
        assert_eq!(&nvm.flash()[0x20..0x24], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn odd_length_payload_is_padded_not_corrupting() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_LOAD_ADDRESS, 0x00, 0x00, wire::CRC_EOP,
            wire::STK_PROG_PAGE, 0x00, 0x03, b'F', 0x01, 0x02, 0x03, wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        assert_eq!(sent, [IN_OK, IN_OK].concat());
        assert_eq!(&nvm.flash()[..4], &[0x01, 0x02, 0x03, 0xFF]);
        // The pad stays inside the page: one erase, one commit, and the
        // following page untouched.
        assert_eq!(nvm.journal(), &[PageOp::Erase(0), PageOp::Commit(0)]);
        assert!(nvm.flash()[8..16].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn page_spanning_payload_erases_and_commits_each_page() {
        let settings = settings(); // 4-word (8-byte) pages
        let mut nvm = SimNvm::from_settings(&settings);
        let payload: Vec<u8> = (0..16).collect(); // exactly 2 pages
        let mut script = vec![
            wire::STK_LOAD_ADDRESS, 0x00, 0x00, wire::CRC_EOP,
            wire::STK_PROG_PAGE, 0x00, 0x10, b'F',
        ];
        script.extend_from_slice(&payload);
        script.push(wire::CRC_EOP);

        let (_, sent) = run_session(&settings, &script, &mut nvm);
        assert_eq!(sent, [IN_OK, IN_OK].concat());
        assert_eq!(&nvm.flash()[..16], payload.as_slice());
        assert_eq!(
            nvm.journal(),
            &[
                PageOp::Erase(0),
                PageOp::Commit(0),
                PageOp::Erase(8),
                PageOp::Commit(8),
            ]
        );
        assert_eq!(nvm.refused_commits(), 0);
    }

    #[test]
    fn sub_page_payload_is_one_erase_commit_cycle() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_LOAD_ADDRESS, 0x00, 0x00, wire::CRC_EOP,
            wire::STK_PROG_PAGE, 0x00, 0x02, b'F', 0x55, 0xAA, wire::CRC_EOP,
        ];
        run_session(&settings, &script, &mut nvm);
        assert_eq!(nvm.journal(), &[PageOp::Erase(0), PageOp::Commit(0)]);
    }

    #[test]
    fn corrupted_terminator_leaves_memory_untouched() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_LOAD_ADDRESS, 0x00, 0x00, wire::CRC_EOP,
            // Full payload, bad terminator.
            wire::STK_PROG_PAGE, 0x00, 0x02, b'F', 0x55, 0xAA, 0xFF,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let mut expected: Vec<u8> = IN_OK.to_vec();
        expected.push(wire::STK_NOSYNC);
        assert_eq!(sent, expected);
        assert!(nvm.journal().is_empty());
        assert!(nvm.flash().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn one_error_does_not_wedge_the_session() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        // Scenario: a corrupted exchange followed by a correct one.
        let script = [
            wire::STK_GET_SYNC, 0xFF, // bad terminator
            wire::STK_GET_SYNC, wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let mut expected = vec![wire::STK_NOSYNC];
        expected.extend_from_slice(IN_OK);
        assert_eq!(sent, expected);
    }

    #[test]
    fn error_limit_hands_off_and_stops_responding() {
        let settings = settings(); // max_errors = 5
        let mut nvm = SimNvm::from_settings(&settings);
        let mut script = Vec::new();
        for _ in 0..5 {
            script.extend_from_slice(&[wire::STK_GET_SYNC, 0xFF]);
        }
        // A well-formed command after the limit must go unanswered.
        script.extend_from_slice(&[wire::STK_GET_SYNC, wire::CRC_EOP]);

        let (outcome, sent) = run_session(&settings, &script, &mut nvm);
        assert!(matches!(outcome, Outcome::Launched(Handoff::ErrorLimit)));
        assert_eq!(sent, vec![wire::STK_NOSYNC; 5]);
    }

    #[test]
    fn idle_timeout_fires_even_mid_command() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        // PROG_PAGE opcode and then silence.
        let (outcome, sent) = run_session(&settings, &[wire::STK_PROG_PAGE], &mut nvm);
        assert!(matches!(outcome, Outcome::Launched(Handoff::IdleTimeout)));
        assert!(sent.is_empty());
    }

    #[test]
    fn read_sign_reports_identity_regardless_of_session_activity() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_LOAD_ADDRESS, 0x34, 0x12, wire::CRC_EOP,
            wire::STK_GET_SYNC, 0xFF, // one error on the books
            wire::STK_READ_SIGN, wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let mut expected: Vec<u8> = IN_OK.to_vec();
        expected.push(wire::STK_NOSYNC);
        expected.extend_from_slice(&[
            wire::STK_INSYNC, 0x1E, 0x94, 0x06, wire::STK_OK,
        ]);
        assert_eq!(sent, expected);
    }

    #[test]
    fn universal_signature_and_fuse_sub_forms() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_UNIVERSAL, 0x30, 0x00, 0x01, 0x00, wire::CRC_EOP, // sig[1]
            wire::STK_UNIVERSAL, 0x50, 0x00, 0x00, 0x00, wire::CRC_EOP, // low fuse
            wire::STK_UNIVERSAL, 0x58, 0x00, 0x00, 0x00, wire::CRC_EOP, // lock bits
            wire::STK_UNIVERSAL, 0x12, 0x34, 0x56, 0x78, wire::CRC_EOP, // default
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let frame = |v: u8| vec![wire::STK_INSYNC, v, wire::STK_OK];
        let expected: Vec<u8> =
            [frame(0x94), frame(0x62), frame(0x3F), frame(0x00)].concat();
        assert_eq!(sent, expected);
    }

    #[test]
    fn read_osccal_returns_default() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let (_, sent) =
            run_session(&settings, &[wire::STK_READ_OSCCAL, wire::CRC_EOP], &mut nvm);
        assert_eq!(sent, vec![wire::STK_INSYNC, 0x00, wire::STK_OK]);
    }

    #[test]
    fn unknown_opcode_still_replies() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            0xEE, wire::CRC_EOP, // unknown
            wire::STK_GET_SYNC, wire::CRC_EOP, // still alive
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let mut expected = vec![wire::STK_UNKNOWN];
        expected.extend_from_slice(IN_OK);
        assert_eq!(sent, expected);
    }

    #[test]
    fn unknown_opcodes_count_toward_the_error_limit() {
        let settings = SettingsBuilder::new()
            .max_idle_ticks(8)
            .max_errors(1)
            .finalize();
        let mut nvm = SimNvm::from_settings(&settings);
        let (outcome, sent) = run_session(&settings, &[0xEE, wire::CRC_EOP], &mut nvm);
        assert!(matches!(outcome, Outcome::Launched(Handoff::ErrorLimit)));
        assert_eq!(sent, vec![wire::STK_UNKNOWN]);
    }

    #[test]
    fn eeprom_prog_and_read_round_trip() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_LOAD_ADDRESS, 0x02, 0x00, wire::CRC_EOP,
            wire::STK_PROG_PAGE, 0x00, 0x02, b'E', 0x11, 0x22, wire::CRC_EOP,
            wire::STK_LOAD_ADDRESS, 0x02, 0x00, wire::CRC_EOP,
            wire::STK_READ_PAGE, 0x00, 0x02, b'E', wire::CRC_EOP,
        ];
        let (_, sent) = run_session(&settings, &script, &mut nvm);
        let mut expected: Vec<u8> = [IN_OK, IN_OK, IN_OK].concat();
        expected.extend_from_slice(&[wire::STK_INSYNC, 0x11, 0x22, wire::STK_OK]);
        assert_eq!(sent, expected);
        // EEPROM writes land at the doubled byte address too.
        assert_eq!(&nvm.eeprom()[4..6], &[0x11, 0x22]);
        // Flash pages were never touched.
        assert!(nvm.journal().is_empty());
    }

    #[test]
    fn leave_progmode_arms_the_watchdog_restart() {
        let settings = settings();
        let mut nvm = SimNvm::from_settings(&settings);
        let (outcome, sent) =
            run_session(&settings, &[wire::STK_LEAVE_PROGMODE, wire::CRC_EOP], &mut nvm);
        assert_eq!(sent, IN_OK);
        assert!(matches!(
            outcome,
            Outcome::Launched(Handoff::WatchdogRestart)
        ));
    }

    #[test]
    fn leave_progmode_without_watchdog_keeps_serving() {
        let settings = SettingsBuilder::new()
            .max_idle_ticks(8)
            .watchdog_restart(false)
            .finalize();
        let mut nvm = SimNvm::from_settings(&settings);
        let script = [
            wire::STK_LEAVE_PROGMODE, wire::CRC_EOP,
            wire::STK_GET_SYNC, wire::CRC_EOP,
        ];
        let (outcome, sent) = run_session(&settings, &script, &mut nvm);
        assert_eq!(sent, [IN_OK, IN_OK].concat());
        assert!(matches!(outcome, Outcome::Launched(Handoff::IdleTimeout)));
    }
}
