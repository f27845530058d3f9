//! Dual `tracing`/`log` event emission.
//!
//! A per-subsystem target constant plus a macro that emits a `tracing`
//! event when the `tracing-unstable` feature is enabled, falling back to
//! `log` otherwise. This driver has no public event-subscription surface
//! (no `CmapEventHandler`/`SdamEventHandler` traits to implement), so the
//! macro is the whole of it — every call site reaches straight for
//! `trace_event!` instead of constructing an event struct first.

pub(crate) const CMAP_TRACING_EVENT_TARGET: &str = "docflux::cmap";
pub(crate) const SDAM_TRACING_EVENT_TARGET: &str = "docflux::sdam";
pub(crate) const COMMAND_TRACING_EVENT_TARGET: &str = "docflux::command";
pub(crate) const OPTIONS_TRACING_EVENT_TARGET: &str = "docflux::options";

/// Emits an event at the given level under the given target, via `tracing`
/// if the `tracing-unstable` feature is enabled and via `log` otherwise.
///
/// ```ignore
/// trace_event!(WARN, target: OPTIONS_TRACING_EVENT_TARGET, "unrecognized option {}", key);
/// ```
/// Maps the `DEBUG`/`WARN` token `trace_event!` is called with to the
/// corresponding `log::Level` variant. `log::Level`'s variants are
/// `Debug`/`Warn`, not `DEBUG`/`WARN`, so this can't be a plain
/// `log::Level::$level` substitution the way the `tracing` branch is.
macro_rules! log_level {
    (DEBUG) => {
        log::Level::Debug
    };
    (WARN) => {
        log::Level::Warn
    };
}

macro_rules! trace_event {
    ($level:ident, target: $target:expr, $($arg:tt)*) => {{
        #[cfg(feature = "tracing-unstable")]
        {
            tracing::event!(target: $target, tracing::Level::$level, $($arg)*);
        }
        #[cfg(not(feature = "tracing-unstable"))]
        {
            log::log!(target: $target, crate::trace::log_level!($level), $($arg)*);
        }
    }};
}

pub(crate) use log_level;
pub(crate) use trace_event;

#[cfg(test)]
mod test {
    #[test]
    fn targets_are_distinct() {
        let targets = [
            super::CMAP_TRACING_EVENT_TARGET,
            super::SDAM_TRACING_EVENT_TARGET,
            super::COMMAND_TRACING_EVENT_TARGET,
            super::OPTIONS_TRACING_EVENT_TARGET,
        ];
        for (i, a) in targets.iter().enumerate() {
            for b in &targets[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
