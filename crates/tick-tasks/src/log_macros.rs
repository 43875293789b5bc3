//! `tracing` macros that tag every event with a `domain` field.
//!
//! ```ignore
//! tick_info!(remote, id = %id, "task created");
//! tick_warn!(codec, id = %id, error = %e, "script not reversible");
//! ```
//!
//! The domain is written as a bare identifier (`remote`, `codec`) and lands
//! in the event as a string.

#[doc(hidden)]
macro_rules! tick_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

macro_rules! tick_warn {
    ($domain:ident, $($rest:tt)*) => {
        tick_log!(warn, $domain, $($rest)*)
    };
}

macro_rules! tick_info {
    ($domain:ident, $($rest:tt)*) => {
        tick_log!(info, $domain, $($rest)*)
    };
}

macro_rules! tick_debug {
    ($domain:ident, $($rest:tt)*) => {
        tick_log!(debug, $domain, $($rest)*)
    };
}
