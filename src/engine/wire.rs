//! STK500v1 wire constants, as fixed by the original AVR061 application
//! note and two decades of avrdude compatibility.
//!
//! One inherited asymmetry is preserved exactly: addresses travel as
//! 16-bit **little-endian** word indices, lengths as 16-bit **big-endian**
//! byte counts. Do not "fix" it.

// Request opcodes ============================================================

pub const STK_GET_SYNC: u8 = 0x30;
pub const STK_GET_SIGN_ON: u8 = 0x31;
pub const STK_SET_PARAMETER: u8 = 0x40;
pub const STK_GET_PARAMETER: u8 = 0x41;
pub const STK_SET_DEVICE: u8 = 0x42;
pub const STK_SET_DEVICE_EXT: u8 = 0x45;
pub const STK_ENTER_PROGMODE: u8 = 0x50;
pub const STK_LEAVE_PROGMODE: u8 = 0x51;
pub const STK_CHIP_ERASE: u8 = 0x52;
pub const STK_CHECK_AUTOINC: u8 = 0x53;
pub const STK_LOAD_ADDRESS: u8 = 0x55;
pub const STK_UNIVERSAL: u8 = 0x56;
pub const STK_PROG_PAGE: u8 = 0x64;
pub const STK_READ_PAGE: u8 = 0x74;
pub const STK_READ_SIGN: u8 = 0x75;
pub const STK_READ_OSCCAL: u8 = 0x76;

// Framing ====================================================================

/// Request terminator ("end of packet").
pub const CRC_EOP: u8 = 0x20;

// Response markers ===========================================================

pub const STK_OK: u8 = 0x10;
pub const STK_FAILED: u8 = 0x11;
pub const STK_UNKNOWN: u8 = 0x12;
pub const STK_INSYNC: u8 = 0x14;
pub const STK_NOSYNC: u8 = 0x15;

// Parameter ids ==============================================================

pub const PARM_STK_HW_VER: u8 = 0x80;
pub const PARM_STK_SW_MAJOR: u8 = 0x81;
pub const PARM_STK_SW_MINOR: u8 = 0x82;

// Bodies =====================================================================

/// Memory space tag in PROG_PAGE/READ_PAGE bodies; anything else is flash.
pub const MEMTYPE_EEPROM: u8 = b'E';

/// Fixed descriptor lengths drained by SET_DEVICE / SET_DEVICE_EXT.
pub const SET_DEVICE_LEN: u8 = 20;
pub const SET_DEVICE_EXT_LEN: u8 = 5;

/// Identification string sent in reply to GET_SIGN_ON.
pub const SIGN_ON_REPLY: &[u8] = b"AVR ISP";

/// One character of the three-in-a-row monitor trigger.
pub const MONITOR_TRIGGER: u8 = b'!';
