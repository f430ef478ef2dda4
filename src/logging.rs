//! Log output for the `rharvest` binary.
//!
//! The library logs through the `log` facade; the subscriber installed here
//! picks those records up and renders them as text or JSON lines.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Rendering of log lines on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Create an environment filter based on verbosity level.
///
/// `RUST_LOG` wins when set.
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new("rharvest=info"),
            1 => EnvFilter::new("rharvest=debug"),
            // -vv: include SSH protocol logs
            2 => EnvFilter::new("rharvest=debug,russh=debug,async_ssh2_tokio=debug"),
            _ => EnvFilter::new("rharvest=trace,russh=trace,async_ssh2_tokio=trace"),
        }
    }
}

/// Installs the global subscriber. Call once, before any job starts.
pub fn init_logging(verbosity: u8, format: LogFormat) {
    let filter = create_env_filter(verbosity);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_verbosity_level_builds_a_filter() {
        for verbosity in 0..=4 {
            let _ = create_env_filter(verbosity);
        }
    }

    #[test]
    fn log_format_parses_from_cli_values() {
        assert_eq!(
            LogFormat::from_str("json", true).expect("json"),
            LogFormat::Json
        );
        assert_eq!(
            LogFormat::from_str("TEXT", true).expect("text"),
            LogFormat::Text
        );
    }
}
