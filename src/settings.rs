//! Settings related to the serial port, the emulated device geometry and
//! the bootloader protocol thresholds.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by the bootloader engine and the device server,
/// and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
///
/// The device defaults model the HexBright's ATmega168: 16 KiB of flash in
/// 64-word pages, 512 bytes of EEPROM, signature `1E 94 06`, and the
/// historical 19200 baud bootloader link.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// Path to the flash image file served by the emulated device. Loaded
    /// into the simulated flash before the first session and written back
    /// after every handoff to the application. When not set, the device
    /// starts with blank (erased) flash and nothing is persisted.
    pub image: Option<String>,

    /// The 3-byte device signature reported by `READ_SIGN` and by the
    /// signature sub-form of `UNIVERSAL` (manufacturer, family, variant).
    pub signature: [u8; 3],
    /// Hardware version byte reported by `GET_PARAMETER`.
    pub hw_version: u8,
    /// Bootloader software major version byte.
    pub sw_major: u8,
    /// Bootloader software minor version byte.
    pub sw_minor: u8,

    /// Flash page size in words. Erase and commit always cover a whole
    /// page; `PROG_PAGE` commits after this many words have been loaded.
    pub page_words: usize,
    /// Total flash capacity in bytes.
    pub flash_size: usize,
    /// Total EEPROM capacity in bytes.
    pub eeprom_size: usize,

    /// Number of tolerated protocol errors before giving up and launching
    /// the application.
    pub max_errors: u8,
    /// Number of tolerated idle polls while waiting for a byte before
    /// giving up and launching the application.
    pub max_idle_ticks: u32,

    /// When `true`, `LEAVE_PROGMODE` arms a watchdog-triggered restart so
    /// the application starts without the host toggling a reset line, and
    /// the power-on decision skips the bootloader unless the reset was an
    /// external one.
    pub watchdog_restart: bool,
    /// Enables the interactive monitor extension (entered with `!!!`).
    pub monitor: bool,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```ignore
/// let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 19_200,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                image: None,
                signature: [0x1E, 0x94, 0x06],
                hw_version: 0x02,
                sw_major: 0x01,
                sw_minor: 0x10,
                page_words: 64,
                flash_size: 16 * 1024,
                eeprom_size: 512,
                max_errors: 5,
                max_idle_ticks: 30_000,
                watchdog_restart: true,
                monitor: true,
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the path to the flash image file served by the device
    pub fn image<'a>(mut self, image: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.image = Some(image.into().as_ref().to_owned());
        self
    }

    /// Set the 3-byte device signature
    pub fn signature(mut self, signature: [u8; 3]) -> Self {
        self.settings.signature = signature;
        self
    }

    /// Set the flash page size in words
    pub fn page_words(mut self, page_words: usize) -> Self {
        self.settings.page_words = page_words;
        self
    }

    /// Set the flash capacity in bytes
    pub fn flash_size(mut self, flash_size: usize) -> Self {
        self.settings.flash_size = flash_size;
        self
    }

    /// Set the EEPROM capacity in bytes
    pub fn eeprom_size(mut self, eeprom_size: usize) -> Self {
        self.settings.eeprom_size = eeprom_size;
        self
    }

    /// Set the tolerated protocol error count
    pub fn max_errors(mut self, max_errors: u8) -> Self {
        self.settings.max_errors = max_errors;
        self
    }

    /// Set the tolerated idle poll count
    pub fn max_idle_ticks(mut self, max_idle_ticks: u32) -> Self {
        self.settings.max_idle_ticks = max_idle_ticks;
        self
    }

    /// Enable or disable the watchdog-triggered restart behavior
    pub fn watchdog_restart(mut self, watchdog_restart: bool) -> Self {
        self.settings.watchdog_restart = watchdog_restart;
        self
    }

    /// Enable or disable the interactive monitor extension
    pub fn monitor(mut self, monitor: bool) -> Self {
        self.settings.monitor = monitor;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        SettingsBuilder::new()
    }
}

impl Settings {
    /// Flash page size in bytes (two bytes per word).
    pub fn page_bytes(&self) -> usize {
        self.page_words * 2
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(settings.path, None);
    assert_eq!(settings.baud_rate, 19_200);
    assert_eq!(settings.data_bits, DataBits::Eight);
    assert_eq!(settings.flow_control, FlowControl::None);
    assert_eq!(settings.parity, Parity::None);
    assert_eq!(settings.stop_bits, StopBits::One);
    assert_eq!(settings.image, None);
    assert_eq!(settings.signature, [0x1E, 0x94, 0x06]);
    assert_eq!(settings.page_words, 64);
    assert_eq!(settings.flash_size, 16 * 1024);
    assert_eq!(settings.eeprom_size, 512);
    assert_eq!(settings.max_errors, 5);
    assert!(settings.watchdog_restart);
    assert!(settings.monitor);
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn baud_rate() {
    let baud_rate = 115_200;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn image() {
    let settings = SettingsBuilder::new().image("firmware.bin").finalize();
    assert_eq!(settings.image.unwrap(), "firmware.bin");
}

#[test]
fn signature() {
    // An ATmega328P instead of the default ATmega168.
    let settings = SettingsBuilder::new()
        .signature([0x1E, 0x95, 0x0F])
        .finalize();
    assert_eq!(settings.signature, [0x1E, 0x95, 0x0F]);
}

#[test]
fn geometry() {
    let settings = SettingsBuilder::new()
        .page_words(128)
        .flash_size(128 * 1024)
        .eeprom_size(4096)
        .finalize();
    assert_eq!(settings.page_words, 128);
    assert_eq!(settings.page_bytes(), 256);
    assert_eq!(settings.flash_size, 128 * 1024);
    assert_eq!(settings.eeprom_size, 4096);
}

#[test]
fn thresholds() {
    let settings = SettingsBuilder::new()
        .max_errors(3)
        .max_idle_ticks(100)
        .finalize();
    assert_eq!(settings.max_errors, 3);
    assert_eq!(settings.max_idle_ticks, 100);
}
