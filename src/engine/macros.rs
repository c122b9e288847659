//! Helper macros for the engine state machine modules.

/// Generate debug formatting code for a state or event that carries the
/// engine's link and nvm borrows (trait objects without `Debug`). Takes the
/// link's display name however the caller can produce it.
#[macro_export]
macro_rules! debug_fmt_engine_parts {
    ($name:literal, $link_name:expr, $f:ident) => {
        $f.debug_struct($name).field("link", &$link_name)
    };
}
