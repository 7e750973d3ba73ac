//! Structured logging to a file; the terminal itself belongs to the UI.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::Directive, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        match raw {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: PathBuf,
}

impl LoggingConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            level: config.logging.level.clone(),
            format: LogFormat::parse(&config.logging.format),
            file: config.log_file(),
        }
    }

    fn filter(&self) -> EnvFilter {
        // RUST_LOG replaces the configured level, the noise directives always apply.
        let base = std::env::var("RUST_LOG").unwrap_or_else(|_| self.level.clone());
        let mut filter = EnvFilter::new(base);
        for directive in [
            "hyper=warn",
            "hyper_util=warn",
            "reqwest=warn",
            "rustls=warn",
            "tungstenite=warn",
            "tokio_tungstenite=warn",
        ] {
            if let Ok(d) = directive.parse::<Directive>() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    pub fn init(&self) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file)
            .with_context(|| format!("Opening log file {:?}", &self.file))?;
        tracing_subscriber::registry()
            .with(self.filter())
            .with(format_layer(self.format, Mutex::new(file)))
            .try_init()
            .context("Installing tracing subscriber")?;

        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            file = %self.file.display(),
            "logging initialized"
        );
        Ok(())
    }
}

fn format_layer<S>(format: LogFormat, writer: Mutex<File>) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_ansi(false).with_writer(writer).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_ansi(false).with_writer(writer).boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_falls_back_to_pretty() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("fancy"), LogFormat::Pretty);
    }

    #[test]
    fn log_file_defaults_next_to_config() {
        let cfg = Config::parse(PathBuf::from("/etc/atelier/config.toml"), "").unwrap();
        let logging = LoggingConfig::from_config(&cfg);
        assert_eq!(logging.file, PathBuf::from("/etc/atelier/atelier.log"));
        assert_eq!(logging.level, "info");
    }

    fn render(format: LogFormat) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atelier.log");
        let file = File::create(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(format_layer(format, Mutex::new(file)));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(quote_id = 7, "pdf ready");
        });
        fs::read_to_string(&path).unwrap()
    }

    #[test]
    fn pretty_format_is_multiline_with_location() {
        let pretty = render(LogFormat::Pretty);
        assert!(pretty.contains("pdf ready"), "{pretty}");
        assert!(pretty.contains("at src/logging.rs"), "{pretty}");
        assert!(pretty.trim_end().lines().count() > 1, "{pretty}");

        let compact = render(LogFormat::Compact);
        assert!(compact.contains("pdf ready"), "{compact}");
        assert_eq!(compact.trim_end().lines().count(), 1, "{compact}");
    }

    #[test]
    fn json_format_writes_one_object_per_event() {
        let line = render(LogFormat::Json);
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["fields"]["message"], "pdf ready");
        assert_eq!(value["fields"]["quote_id"], 7);
    }
}
