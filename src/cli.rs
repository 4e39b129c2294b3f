//! Command-line interface for the warden daemon.
use clap::Parser;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

use crate::constants::DEFAULT_SETTING_FILE;

/// Log verbosity accepted on the command line: a level name ("warn",
/// "debug", ...) or a single digit, where 0 silences output and 5 is the
/// most verbose.
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

/// Levels in ascending verbosity; the position doubles as the digit form.
const LEVEL_NAMES: [(&str, LevelFilter); 6] = [
    ("off", LevelFilter::OFF),
    ("error", LevelFilter::ERROR),
    ("warn", LevelFilter::WARN),
    ("info", LevelFilter::INFO),
    ("debug", LevelFilter::DEBUG),
    ("trace", LevelFilter::TRACE),
];

impl LogLevelArg {
    /// Name of the level, as `RUST_LOG` understands it.
    pub fn as_str(&self) -> &'static str {
        LEVEL_NAMES
            .iter()
            .find(|(_, level)| *level == self.0)
            .map(|(name, _)| *name)
            .unwrap_or("info")
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        for (digit, (name, level)) in LEVEL_NAMES.iter().enumerate() {
            if wanted == *name || wanted == digit.to_string() {
                return Ok(LogLevelArg(*level));
            }
        }
        Err(format!(
            "unrecognized log level '{value}', expected off, error, warn, info, debug, trace, or 0-5"
        ))
    }
}

/// Command-line interface for wardend.
#[derive(Parser)]
#[command(name = "wardend", version, author)]
#[command(about = "A service supervisor daemon", long_about = None)]
pub struct Cli {
    /// Path to the XML setting file.
    #[arg(short, long, default_value = DEFAULT_SETTING_FILE)]
    pub config: String,

    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevelArg>,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
