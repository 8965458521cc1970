//! Logging bootstrap and span-scoped event macros
//!
//! Events are emitted under a short named span so a run's output can be
//! filtered by concern:
//! - `internal!` for pipeline state (batches, flushes, stops)
//! - `outgoing!` for traffic handed to, or answered by, the transport
//! - `job_event!` for events that belong to one job, carrying its id as a field

use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Environment variable holding the maximum level, e.g. `LOG_LEVEL=debug`
pub const LEVEL_ENV: &str = "LOG_LEVEL";

/// Prefix of every target this workspace logs under
const TARGET_PREFIX: &str = "salvo";

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Like [`internal!`], inside a `job` span recording `job_id`
#[macro_export]
macro_rules! job_event {
    ($job_id:expr, level = $level:ident, $($msg:expr),*) => {{
        let span = $crate::tracing::span!(
            $crate::tracing::Level::$level,
            "job",
            job_id = %$job_id
        );
        let _enter = span.enter();

        $crate::tracing::event!($crate::tracing::Level::$level, $($msg),*)
    }};

    ($job_id:expr, $($msg:expr),*) => {
        $crate::job_event!($job_id, level = DEBUG, $($msg),*)
    };
}

const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Resolve a configured level name, falling back to the build default
///
/// Unknown names are reported on stderr, since no subscriber exists yet.
#[must_use]
pub fn parse_level(configured: Option<&str>) -> LevelFilter {
    let default = default_level();

    configured.map_or(default, |level| {
        LevelFilter::from_str(level.trim()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber at `level`.
///
/// Only events from `salvo*` targets are emitted, with RFC 3339 UTC
/// timestamps.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn try_init(level: LevelFilter) -> Result<(), TryInitError> {
    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with(TARGET_PREFIX)
                })),
        )
        .try_init()
}

/// Install the global subscriber with the level from [`LEVEL_ENV`].
///
/// A second call leaves the first subscriber in place.
pub fn init() {
    let level = parse_level(std::env::var(LEVEL_ENV).ok().as_deref());
    if let Err(e) = try_init(level) {
        eprintln!("Logging already initialised: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("warn")), LevelFilter::WARN);
        assert_eq!(parse_level(Some(" DEBUG ")), LevelFilter::DEBUG);
        assert_eq!(parse_level(Some("off")), LevelFilter::OFF);
        assert_eq!(parse_level(None), default_level());
        assert_eq!(parse_level(Some("chatty")), default_level());
    }

    #[test]
    fn test_second_init_is_rejected() {
        // Whichever test installs first wins; the next attempt must fail
        let _ = try_init(LevelFilter::INFO);
        assert!(try_init(LevelFilter::INFO).is_err());

        internal!(level = INFO, "logging {}", "works");
        job_event!(7_u64, "job {} event", 7);
        outgoing!("sent {}", 1);
    }
}
