use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tokenpilot_core::config::CoreSettings;
use tokenpilot_transport_telegram::config::{BotSettings, TelegramSettings};
use tokenpilot_transport_telegram::runner::run_bot;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "tokenpilot_core=info,tokenpilot_runtime=info,tokenpilot_transport_telegram=info,tokenpilot_telegram_bot=info,teloxide=warn,hyper=warn,h2=error,reqwest=warn,tokio=warn";

/// Secrets masked before log lines reach stderr
struct Redactor {
    rules: Vec<(Regex, &'static str)>,
    /// Configured backend API key, masked wherever it appears verbatim
    backend_key: Option<String>,
}

impl Redactor {
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new(backend_key: Option<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            rules: vec![
                (
                    Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
                    "$1[TELEGRAM_TOKEN]$3",
                ),
                (
                    Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
                    "[TELEGRAM_TOKEN]",
                ),
                (
                    Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
                    "$1[TELEGRAM_TOKEN]",
                ),
                (
                    Regex::new(r"(BACKEND_API_KEY=)[^\s&]+")?,
                    "$1[MASKED]",
                ),
                (
                    Regex::new(r"(?i)(authorization:\s*bearer\s+)[^\s\x22']+")?,
                    "$1[MASKED]",
                ),
            ],
            backend_key: backend_key.filter(|key| key.len() >= 8),
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = self
            .rules
            .iter()
            .fold(input.to_string(), |acc, (pattern, replacement)| {
                pattern.replace_all(&acc, *replacement).into_owned()
            });
        if let Some(key) = &self.backend_key {
            output = output.replace(key.as_str(), "[BACKEND_API_KEY]");
        }
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    redactor: Arc<Redactor>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        self.inner
            .write_all(self.redactor.redact(&line).as_bytes())?;
        // Report the caller's length; the redacted text may be shorter or longer.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    redactor: Arc<Redactor>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            redactor: self.redactor.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let backend_key = std::env::var("BACKEND_API_KEY").ok();
    let redactor = Arc::new(Redactor::new(backend_key).map_err(|e| {
        eprintln!("Failed to compile redaction patterns: {e}");
        e
    })?);
    init_logging(redactor);

    info!("Starting Tokenpilot Telegram bot...");

    let settings = init_settings();
    if let Err(e) = run_bot(settings).await {
        error!("Bot terminated: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(redactor: Arc<Redactor>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        redactor,
    };

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let core_settings = match CoreSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load core configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = core_settings.require_backend_url() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    let telegram_settings = match TelegramSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load telegram configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration loaded successfully.");
    Arc::new(BotSettings::new(core_settings, telegram_settings))
}
