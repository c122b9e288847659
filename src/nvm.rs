//! Non-volatile memory abstraction and its simulated backend.
//!
//! The original bootloader drives the AVR self-programming control register
//! with hand-tuned instruction sequences; the contract that matters is the
//! sequencing, not the instructions: per page, erase precedes fill precedes
//! commit, and every step waits out the hardware busy flag before the next
//! one starts. The [`Nvm`] trait exposes exactly that contract — each
//! method returns only once the operation has completed — so the engine
//! never needs to poll a busy flag itself.
//!
//! [`SimNvm`] backs the trait with plain byte arrays for hosted runs and
//! tests. It also keeps a journal of page operations so tests can assert
//! the erase/commit sequencing laws.

use log::warn;

// =============================================================================
// Public Interface
// =============================================================================

/// The device's non-volatile memories: paged program flash, byte-wise
/// EEPROM, and the read-only configuration bytes.
///
/// All operations block until any in-progress programming cycle has
/// finished; callers rely on that and never interleave. Addresses are byte
/// offsets and wrap at the capacity of the respective memory, the way AVR
/// address registers do.
pub trait Nvm {
    /// Erase the flash page containing `addr` to `0xFF`.
    fn erase_page(&mut self, addr: u32);

    /// Load one word into the page staging buffer at `addr`. Only
    /// meaningful between an erase and a commit of the same page.
    fn load_word(&mut self, addr: u32, word: u16);

    /// Program the staged words into the flash page containing `addr`.
    fn commit_page(&mut self, addr: u32);

    /// Read one byte of program flash.
    fn read_flash(&mut self, addr: u32) -> u8;

    /// Read one byte of EEPROM.
    fn eeprom_read(&mut self, addr: u32) -> u8;

    /// Write one byte of EEPROM, waiting for any prior write to complete.
    fn eeprom_write(&mut self, addr: u32, value: u8);

    /// Read a fuse/lock configuration byte: 0 = low fuse, 1 = lock bits,
    /// 2 = extended fuse, 3 = high fuse. Best-effort compatibility shim for
    /// the vendor `UNIVERSAL` sub-commands.
    fn fuse_byte(&mut self, select: u8) -> u8 {
        let _ = select;
        0x00
    }

    /// Read one byte of the data address space (monitor peek).
    fn data_read(&mut self, addr: u16) -> u8 {
        let _ = addr;
        0x00
    }

    /// Write one byte of the data address space (monitor poke).
    fn data_write(&mut self, addr: u16, value: u8) {
        let _ = (addr, value);
    }
}

/// One entry of the simulated page-operation journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOp {
    /// A page erase, recorded with the page base byte address.
    Erase(u32),
    /// A page commit, recorded with the page base byte address.
    Commit(u32),
}

/// Simulated non-volatile memory.
///
/// Flash and EEPROM start blank (`0xFF`). The page staging buffer behaves
/// like the hardware latch: words loaded into it only become visible in
/// flash after `commit_page`, and the buffer resets to `0xFF` afterwards.
/// A commit of a page that was not erased in the same erase/fill/commit
/// cycle is refused and counted, never silently applied — real hardware
/// would corrupt data here, the simulation makes the bug loud instead.
pub struct SimNvm {
    flash: Vec<u8>,
    eeprom: Vec<u8>,
    sram: Vec<u8>,
    fuses: [u8; 4],
    page_bytes: usize,
    staging: Vec<u8>,
    erased_page: Option<u32>,
    journal: Vec<PageOp>,
    refused_commits: u32,
}

impl SimNvm {
    /// Create a blank simulated device with the given geometry. The page
    /// size is in words, as device datasheets quote it.
    pub fn new(flash_size: usize, eeprom_size: usize, page_words: usize) -> Self {
        let page_bytes = page_words * 2;
        assert!(page_bytes > 0 && flash_size % page_bytes == 0);
        SimNvm {
            flash: vec![0xFF; flash_size],
            eeprom: vec![0xFF; eeprom_size],
            sram: vec![0x00; 1024],
            fuses: [0x62, 0x3F, 0x01, 0xDF],
            page_bytes,
            staging: vec![0xFF; page_bytes],
            erased_page: None,
            journal: Vec::new(),
            refused_commits: 0,
        }
    }

    /// Create a blank simulated device matching `settings`.
    pub fn from_settings(settings: &crate::Settings) -> Self {
        SimNvm::new(
            settings.flash_size,
            settings.eeprom_size,
            settings.page_words,
        )
    }

    /// Copy `image` into flash starting at address 0, truncating an image
    /// larger than the flash.
    pub fn load_flash(&mut self, image: &[u8]) {
        let n = image.len().min(self.flash.len());
        if n < image.len() {
            warn!(
                "flash image truncated from {} to {} bytes",
                image.len(),
                n
            );
        }
        self.flash[..n].copy_from_slice(&image[..n]);
    }

    /// The full flash contents.
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// The full EEPROM contents.
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// The journal of page erases and commits, in order.
    pub fn journal(&self) -> &[PageOp] {
        &self.journal
    }

    /// Number of commits refused because the page was not erased first.
    pub fn refused_commits(&self) -> u32 {
        self.refused_commits
    }

    fn page_base(&self, addr: u32) -> u32 {
        let addr = addr as usize % self.flash.len();
        (addr - addr % self.page_bytes) as u32
    }
}

impl Nvm for SimNvm {
    fn erase_page(&mut self, addr: u32) {
        let base = self.page_base(addr) as usize;
        for byte in &mut self.flash[base..base + self.page_bytes] {
            *byte = 0xFF;
        }
        self.staging.iter_mut().for_each(|b| *b = 0xFF);
        self.erased_page = Some(base as u32);
        self.journal.push(PageOp::Erase(base as u32));
    }

    fn load_word(&mut self, addr: u32, word: u16) {
        let offset = addr as usize % self.page_bytes & !1;
        let bytes = word.to_le_bytes();
        self.staging[offset] = bytes[0];
        self.staging[offset + 1] = bytes[1];
    }

    fn commit_page(&mut self, addr: u32) {
        let base = self.page_base(addr);
        if self.erased_page != Some(base) {
            warn!("refusing commit of page {:#06x} without prior erase", base);
            self.refused_commits += 1;
            return;
        }
        let base = base as usize;
        self.flash[base..base + self.page_bytes].copy_from_slice(&self.staging);
        self.staging.iter_mut().for_each(|b| *b = 0xFF);
        self.erased_page = None;
        self.journal.push(PageOp::Commit(base as u32));
    }

    fn read_flash(&mut self, addr: u32) -> u8 {
        self.flash[addr as usize % self.flash.len()]
    }

    fn eeprom_read(&mut self, addr: u32) -> u8 {
        self.eeprom[addr as usize % self.eeprom.len()]
    }

    fn eeprom_write(&mut self, addr: u32, value: u8) {
        let len = self.eeprom.len();
        self.eeprom[addr as usize % len] = value;
    }

    fn fuse_byte(&mut self, select: u8) -> u8 {
        self.fuses[select as usize % self.fuses.len()]
    }

    fn data_read(&mut self, addr: u16) -> u8 {
        self.sram[addr as usize % self.sram.len()]
    }

    fn data_write(&mut self, addr: u16, value: u8) {
        let len = self.sram.len();
        self.sram[addr as usize % len] = value;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SimNvm {
        // 4 pages of 4 words.
        SimNvm::new(32, 16, 4)
    }

    #[test]
    fn starts_blank() {
        let mut nvm = small();
        assert!(nvm.flash().iter().all(|&b| b == 0xFF));
        assert!(nvm.eeprom().iter().all(|&b| b == 0xFF));
        assert_eq!(nvm.read_flash(0), 0xFF);
    }

    #[test]
    fn erase_fill_commit_round_trip() {
        let mut nvm = small();
        nvm.erase_page(0);
        nvm.load_word(0, u16::from_le_bytes([0xAA, 0xBB]));
        nvm.load_word(2, u16::from_le_bytes([0xCC, 0xDD]));
        nvm.commit_page(0);

        assert_eq!(&nvm.flash()[..4], &[0xAA, 0xBB, 0xCC, 0xDD]);
        // Unfilled words of the page stay erased.
        assert!(nvm.flash()[4..8].iter().all(|&b| b == 0xFF));
        assert_eq!(nvm.journal(), &[PageOp::Erase(0), PageOp::Commit(0)]);
    }

    #[test]
    fn staged_words_invisible_before_commit() {
        let mut nvm = small();
        nvm.erase_page(8);
        nvm.load_word(8, 0x1234);
        assert_eq!(nvm.read_flash(8), 0xFF);
        nvm.commit_page(8);
        assert_eq!(nvm.read_flash(8), 0x34);
        assert_eq!(nvm.read_flash(9), 0x12);
    }

    #[test]
    fn commit_without_erase_is_refused() {
        let mut nvm = small();
        nvm.load_word(0, 0x0000);
        nvm.commit_page(0);
        assert_eq!(nvm.refused_commits(), 1);
        assert_eq!(nvm.read_flash(0), 0xFF);
        assert!(nvm.journal().is_empty());
    }

    #[test]
    fn commit_of_wrong_page_is_refused() {
        let mut nvm = small();
        nvm.erase_page(0);
        nvm.commit_page(8);
        assert_eq!(nvm.refused_commits(), 1);
        // The erased page can still be committed.
        nvm.commit_page(0);
        assert_eq!(nvm.refused_commits(), 1);
    }

    #[test]
    fn erase_clears_whole_page_only() {
        let mut nvm = small();
        nvm.erase_page(0);
        for w in 0..4 {
            nvm.load_word(w * 2, 0x0000);
        }
        nvm.commit_page(0);
        nvm.erase_page(3); // middle of page 0
        assert!(nvm.flash()[..8].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn addresses_wrap_at_capacity() {
        let mut nvm = small();
        nvm.eeprom_write(16, 0x42); // wraps to 0
        assert_eq!(nvm.eeprom_read(0), 0x42);
        assert_eq!(nvm.read_flash(32), nvm.read_flash(0));
    }

    #[test]
    fn data_space_peek_poke() {
        let mut nvm = small();
        nvm.data_write(0x0100, 0x5A);
        assert_eq!(nvm.data_read(0x0100), 0x5A);
    }

    #[test]
    fn fuse_bytes() {
        let mut nvm = small();
        assert_eq!(nvm.fuse_byte(0), 0x62);
        assert_eq!(nvm.fuse_byte(1), 0x3F);
        assert_eq!(nvm.fuse_byte(3), 0xDF);
    }
}
