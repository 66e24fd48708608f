// Subscriber setup driven by global.yaml: plain text, JSON, or
// stackdriver-shaped JSON with a `severity` field.

use serde_json::Value;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::config::global::LogFormat;

pub fn init(format: LogFormat, timestamp: bool, verbose: bool) {
    let default_filter = if verbose {
        "grpcsuite=debug,info"
    } else {
        "grpcsuite=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Text => {
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false);
            if timestamp {
                builder.init();
            } else {
                builder.without_time().init();
            }
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Stackdriver => {
            tracing_subscriber::fmt()
                .event_format(StackdriverFormatter { timestamp })
                .with_env_filter(filter)
                .init();
        }
    }
}

/// Emits one JSON object per event with the level mapped onto the
/// `severity` field, the way stackdriver-style collectors expect it.
pub struct StackdriverFormatter {
    pub timestamp: bool,
}

impl<S, N> FormatEvent<S, N> for StackdriverFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut fields = serde_json::Map::new();
        event.record(&mut FieldVisitor(&mut fields));

        let mut record = serde_json::Map::new();
        record.insert(
            "severity".to_string(),
            Value::String(severity(*event.metadata().level()).to_string()),
        );
        if self.timestamp {
            record.insert(
                "time".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        if let Some(message) = fields.remove("message") {
            record.insert("message".to_string(), message);
        }
        record.extend(fields);

        writeln!(writer, "{}", Value::Object(record))
    }
}

fn severity(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

struct FieldVisitor<'a>(&'a mut serde_json::Map<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }
}
