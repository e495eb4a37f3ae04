use tracing_subscriber::layer::Layered;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Environment variable selecting the log encoding (`json` or `text`).
pub const LOG_FORMAT_ENV: &str = "ENTITY_LOG_FORMAT";

/// Output encoding for kernel logs.
///
/// Daemons ship JSON to their collectors; interactive use of the CLI reads
/// better as plain text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line on stderr.
    #[default]
    Json,
    /// Human-readable lines on stderr.
    Text,
}

impl LogFormat {
    /// Reads the format from `ENTITY_LOG_FORMAT`, defaulting to JSON.
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV).as_deref() {
            Ok("text") | Ok("plain") => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }
}

/// Initializes the global `tracing` subscriber with the format taken from
/// the process environment.
pub fn init_tracing() -> Result<(), anyhow::Error> {
    init_tracing_with(LogFormat::from_env())
}

/// Initializes the global `tracing` subscriber for structured logging.
///
/// Events carry their module target (`storage`, `state`, `ops`, `agent`,
/// `verifier`, ...) and an RFC-3339 UTC timestamp; `RUST_LOG` narrows the
/// filter, which otherwise admits `info` and above.
pub fn init_tracing_with(format: LogFormat) -> Result<(), anyhow::Error> {
    let fmt_layer: Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync> = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .boxed(),
        LogFormat::Text => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .boxed(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
