//! Subscriber setup for the `tracing` records emitted by this crate.
//!
//! Output from many processes of one job usually lands in a single stream, so
//! every line is prefixed with `host:pid`.

use std::{fmt, sync::OnceLock};

use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
    EnvFilter,
};

const DEFAULT_FILTER: &str = "info";

/// The host name, resolved once per process.
pub fn hostname() -> &'static str {
    static HOSTNAME: OnceLock<String> = OnceLock::new();
    HOSTNAME.get_or_init(|| {
        let name = gethostname::gethostname().to_string_lossy().into_owned();
        if name.is_empty() {
            "<unknown>".to_string()
        } else {
            name
        }
    })
}

/// Formats `host:pid LEVEL target: message fields`.
#[derive(Clone, Debug, Default)]
pub struct HostFormat;

impl<S, N> FormatEvent<S, N> for HostFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{}:{} {:>5} {}: ",
            hostname(),
            std::process::id(),
            meta.level(),
            meta.target()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` if a global subscriber was already set, in which case
/// nothing changes.
pub fn init_logging() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(HostFormat)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_stable() {
        let first = hostname();
        assert!(!first.is_empty());
        assert!(std::ptr::eq(first, hostname()));
    }

    #[test]
    fn hostname_comes_from_the_system() {
        let system = gethostname::gethostname();
        if !system.is_empty() {
            assert_eq!(hostname(), system.to_string_lossy());
        }
    }

    #[test]
    fn second_init_is_noop() {
        init_logging();
        assert!(!init_logging());
    }
}
