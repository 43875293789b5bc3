use std::fmt::{self as stdfmt, Write as _};
use std::path::Path;

use anyhow::Result;
use tick_config::{LogFormat, LoggingConfig};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::DefaultFields;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormattedFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

// ---------------------------------------------------------------------------
// Plain-text event format
// ---------------------------------------------------------------------------

/// Field formatter for the file layer. A distinct type keeps its cached span
/// fields apart from the stderr layer, which may contain ANSI codes.
#[derive(Default)]
struct PlainFields(DefaultFields);

impl<'writer> fmt::FormatFields<'writer> for PlainFields {
    fn format_fields<R: tracing_subscriber::field::RecordFields>(
        &self,
        writer: fmt::format::Writer<'writer>,
        fields: R,
    ) -> stdfmt::Result {
        self.0.format_fields(writer, fields)
    }
}

/// One line per event, with the `domain` field pulled out as a prefix:
///
/// ```text
/// 2026-10-18T09:12:40Z  INFO [remote] tasks.create{rule=High CPU}: task created id="chronograf-v1-…"
/// ```
///
/// Events from dependencies carry no domain and get no prefix.
struct TickFormat;

impl<S, N> FormatEvent<S, N> for TickFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> fmt::FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let ansi = writer.has_ansi_escapes();

        let mut time = String::new();
        if SystemTime
            .format_time(&mut fmt::format::Writer::new(&mut time))
            .is_err()
        {
            time.push_str("<unknown time>");
        }
        paint(&mut writer, ansi, "2", &time)?;

        let level = *event.metadata().level();
        write!(writer, " ")?;
        paint(&mut writer, ansi, level_colour(level), &format!("{level:>5}"))?;
        write!(writer, " ")?;

        let mut fields = EventFields::default();
        event.record(&mut fields);
        if let Some(domain) = &fields.domain {
            paint(&mut writer, ansi, "1;36", &format!("[{domain}]"))?;
            write!(writer, " ")?;
        }

        for span in ctx.event_scope().into_iter().flat_map(|scope| scope.from_root()) {
            paint(&mut writer, ansi, "1", span.name())?;
            let ext = span.extensions();
            match ext.get::<FormattedFields<N>>() {
                Some(values) if !values.is_empty() => write!(writer, "{{{values}}}: ")?,
                _ => write!(writer, "{{}}: ")?,
            }
        }

        write!(writer, "{}", fields.message)?;
        if !fields.rest.is_empty() {
            write!(writer, " ")?;
            paint(&mut writer, ansi, "3", &fields.rest)?;
        }
        writeln!(writer)
    }
}

fn level_colour(level: Level) -> &'static str {
    match level {
        Level::ERROR => "31",
        Level::WARN => "33",
        Level::INFO => "32",
        Level::DEBUG => "34",
        Level::TRACE => "35",
    }
}

fn paint(writer: &mut fmt::format::Writer<'_>, ansi: bool, sgr: &str, text: &str) -> stdfmt::Result {
    if ansi {
        write!(writer, "\x1b[{sgr}m{text}\x1b[0m")
    } else {
        writer.write_str(text)
    }
}

/// Splits an event into its domain, its message and the remaining
/// `key=value` pairs. Numbers and booleans reach `record_debug` through the
/// default `Visit` methods.
#[derive(Default)]
struct EventFields {
    domain: Option<String>,
    message: String,
    rest: String,
}

impl EventFields {
    fn push(&mut self, name: &str, value: &dyn stdfmt::Debug) {
        if !self.rest.is_empty() {
            self.rest.push(' ');
        }
        write!(self.rest, "{name}={value:?}").ok();
    }
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "domain" => self.domain = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            name => self.push(name, &value),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        match field.name() {
            "domain" => {
                self.domain = Some(format!("{value:?}").trim_matches('"').to_string());
            }
            "message" => {
                write!(self.message, "{value:?}").ok();
            }
            name => self.push(name, value),
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global `tracing` subscriber described by [`LoggingConfig`].
///
/// Events go to stderr and, when `file` is set, to that file through a
/// non-blocking writer. The returned [`WorkerGuard`] flushes the file on
/// drop and must be held until exit. `RUST_LOG` replaces the configured
/// level and module directives.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let json = config.format == LogFormat::Json;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    // JSON keeps `domain` as a regular field; plain text promotes it.
    let stderr = if json {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(build_filter(config)?)
            .boxed()
    } else {
        fmt::layer()
            .event_format(TickFormat)
            .with_writer(std::io::stderr)
            .with_filter(build_filter(config)?)
            .boxed()
    };
    layers.push(stderr);

    let mut guard = None;
    if let Some(path) = &config.file {
        let (writer, file_guard) = file_writer(path)?;
        guard = Some(file_guard);
        let file = if json {
            fmt::layer()
                .json()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(build_filter(config)?)
                .boxed()
        } else {
            fmt::layer()
                .event_format(TickFormat)
                .fmt_fields(PlainFields::default())
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(build_filter(config)?)
                .boxed()
        };
        layers.push(file);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing already initialised: {e}"))?;
    Ok(guard)
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if std::env::var("RUST_LOG").is_ok() {
        return Ok(EnvFilter::from_default_env());
    }
    let directives = config.directives();
    EnvFilter::try_new(&directives)
        .map_err(|e| anyhow::anyhow!("invalid log filter '{directives}': {e}"))
}

fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path {} has no file name", path.display()))?;
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Events seen by the subscriber: level, domain, message, other fields.
    #[derive(Default)]
    struct Capture(Mutex<Vec<(Level, Option<String>, String, String)>>);

    impl<S: Subscriber> Layer<S> for &'static Capture {
        fn on_event(&self, event: &Event<'_>, _: tracing_subscriber::layer::Context<'_, S>) {
            let mut fields = EventFields::default();
            event.record(&mut fields);
            self.0.lock().unwrap().push((
                *event.metadata().level(),
                fields.domain,
                fields.message,
                fields.rest,
            ));
        }
    }

    fn capture(emit: impl FnOnce()) -> Vec<(Level, Option<String>, String, String)> {
        let capture: &'static Capture = Box::leak(Box::default());
        let subscriber = tracing_subscriber::registry().with(capture);
        tracing::subscriber::with_default(subscriber, emit);
        std::mem::take(&mut *capture.0.lock().unwrap())
    }

    #[test]
    fn event_fields_separate_domain_and_message() {
        let events = capture(|| {
            tick_info!(remote, id = "t1", attempts = 2u64, "task created");
        });
        let (level, domain, message, fields) = &events[0];
        assert_eq!(*level, Level::INFO);
        assert_eq!(domain.as_deref(), Some("remote"));
        assert_eq!(message, "task created");
        assert_eq!(fields, r#"id="t1" attempts=2"#);
    }

    #[test]
    fn domain_macros_keep_their_level() {
        let events = capture(|| {
            tick_warn!(codec, "script not reversible");
            tick_debug!(remote, tasks = 3u64, "listed tasks");
        });
        let seen: Vec<_> = events
            .iter()
            .map(|(level, domain, message, _)| (*level, domain.as_deref(), message.as_str()))
            .collect();
        assert_eq!(
            seen,
            vec![
                (Level::WARN, Some("codec"), "script not reversible"),
                (Level::DEBUG, Some("remote"), "listed tasks"),
            ]
        );
    }
}
