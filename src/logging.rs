//! Logging setup (ambient stack): a console appender plus an optional file
//! appender, wired through `log4rs`.
//!
//! The teacher's own code only ever calls `println!`/`eprintln!`, with a
//! standing `TODO` in `src/thread_pool.rs` to remove the prototype prints.
//! Grounded instead on `examples/kevinboulain-sin/source/main.rs`, which
//! builds exactly this two-appender `log4rs` config (console always on, file
//! appender keyed off a CLI-provided path) for a comparable single-binary
//! tool; simplified here to a fixed `PatternEncoder` and a caller-supplied
//! level instead of a `clap-verbosity-flag`.

use std::path::Path;

use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}";

#[derive(Debug)]
pub struct LoggingError(String);

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot initialize logging: {}", self.0)
    }
}

impl std::error::Error for LoggingError {}

/// Initializes the global logger. `log_file`, when given, adds a file
/// appender alongside the console one; both run at `level`.
pub fn init(log_file: Option<&Path>, level: log::LevelFilter) -> Result<(), LoggingError> {
    let encoder = || Box::new(PatternEncoder::new(PATTERN));

    let console = Appender::builder().build(
        "console",
        Box::new(ConsoleAppender::builder().encoder(encoder()).build()),
    );

    let mut appenders = vec!["console"];
    let mut builder = LogConfig::builder().appender(console);

    if let Some(path) = log_file {
        let file = FileAppender::builder()
            .encoder(encoder())
            .build(path)
            .map_err(|err| LoggingError(err.to_string()))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        appenders.push("file");
    }

    let config = builder
        .build(Root::builder().appenders(appenders).build(level))
        .map_err(|err| LoggingError(err.to_string()))?;

    log4rs::init_config(config).map_err(|err| LoggingError(err.to_string()))?;
    Ok(())
}
