//! Flash image file persistence for the emulated device.
//!
//! The image file is the device's program memory seen from the outside: it
//! is loaded into the simulated flash before the first session and written
//! back after every handoff to the application, so a programming session
//! from the host survives a restart of the emulator.

use std::fs;
use std::io;

use hexplay::HexViewBuilder;
use log::{debug, info, log_enabled, Level::Debug};

/// Read a raw binary flash image from `path`.
pub(crate) fn load_image(path: &str) -> io::Result<Vec<u8>> {
    let image = fs::read(path)?;
    info!("Loaded {} bytes of flash image from {}", image.len(), path);

    // Dump the head of the image in a hex table for debugging
    if log_enabled!(Debug) {
        let view = HexViewBuilder::new(&image[..image.len().min(256)])
            .address_offset(0)
            .row_width(16)
            .finish();
        println!("{}", view);
    }

    Ok(image)
}

/// Write the flash contents back to `path` as a raw binary image.
///
/// Trailing erased-state bytes are not part of the program and are dropped,
/// so the file stays the size of the application rather than the size of
/// the flash.
pub(crate) fn save_image(path: &str, flash: &[u8]) -> io::Result<()> {
    let end = flash.iter().rposition(|&b| b != 0xFF).map_or(0, |i| i + 1);
    fs::write(path, &flash[..end])?;
    debug!("Saved {} bytes of flash image to {}", end, path);
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_drops_trailing_erased_bytes() {
        let mut path = std::env::temp_dir();
        path.push("hexboot-image-round-trip.bin");
        let path = path.to_str().unwrap().to_owned();

        let mut flash = vec![0xFF; 64];
        flash[..4].copy_from_slice(&[0x0C, 0x94, 0x34, 0x00]);
        save_image(&path, &flash).unwrap();

        let image = load_image(&path).unwrap();
        assert_eq!(image, &[0x0C, 0x94, 0x34, 0x00]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn blank_flash_saves_an_empty_image() {
        let mut path = std::env::temp_dir();
        path.push("hexboot-image-blank.bin");
        let path = path.to_str().unwrap().to_owned();

        save_image(&path, &[0xFF; 32]).unwrap();
        assert_eq!(load_image(&path).unwrap(), Vec::<u8>::new());

        std::fs::remove_file(&path).unwrap();
    }
}
