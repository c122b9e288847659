//! The per-power-on session record.

/// Mutable protocol state shared by all commands within one power-on
/// session. Created fresh by the `Reset` state, never persisted across
/// power cycles.
///
/// There is exactly one session per device (one chip, one serial line), so
/// this is a single explicit record threaded through the dispatcher rather
/// than a scatter of globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Current memory pointer as a **byte** offset. The wire carries word
    /// addresses; `LOAD_ADDRESS` doubles them on the way in.
    pub address: u32,
    /// Protocol errors so far; only ever increases.
    pub error_count: u8,
    /// Whether idle polls count toward the timeout threshold. Normally on;
    /// the monitor turns it off while it owns the session.
    pub timeout_armed: bool,
}

impl Session {
    pub fn new() -> Self {
        Session {
            address: 0,
            error_count: 0,
            timeout_armed: true,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
