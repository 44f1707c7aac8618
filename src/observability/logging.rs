//! Structured logging configuration.

use tracing_subscriber::EnvFilter;

/// Environment variable selecting the output format (`pretty` or `json`).
pub const LOG_FORMAT_ENV: &str = "ENTITYIDENTITY_LOG_FORMAT";

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_FILTER_ENV: &str = "ENTITYIDENTITY_LOG";

const DEFAULT_FILTER: &str = "entityidentity=info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
}

impl LoggingConfig {
    /// Creates a config from a format and a filter directive.
    ///
    /// An unparseable directive falls back to `entityidentity=info`.
    #[must_use]
    pub fn new(format: LogFormat, directive: &str) -> Self {
        Self {
            format,
            filter: parse_filter(directive),
        }
    }

    /// Reads `ENTITYIDENTITY_LOG_FORMAT` and `ENTITYIDENTITY_LOG`.
    #[must_use]
    pub fn from_env() -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        let directive = std::env::var(LOG_FILTER_ENV).unwrap_or_default();
        Self::new(format, &directive)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(LogFormat::default(), DEFAULT_FILTER)
    }
}

fn parse_filter(directive: &str) -> EnvFilter {
    let directive = directive.trim();
    if directive.is_empty() {
        return EnvFilter::new(DEFAULT_FILTER);
    }
    EnvFilter::try_new(directive).unwrap_or_else(|e| {
        tracing::warn!(directive, error = %e, "Invalid log filter, using default");
        EnvFilter::new(DEFAULT_FILTER)
    })
}
