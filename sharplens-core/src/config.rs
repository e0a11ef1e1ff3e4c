//! Process-wide verbosity, read from the environment once.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

pub const LOG_LEVEL_ENV: &str = "SHARPLENS_LOG_LEVEL";

/// Ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Verbosity {
    pub const ALL: [Verbosity; 5] = [
        Verbosity::Trace,
        Verbosity::Debug,
        Verbosity::Info,
        Verbosity::Warn,
        Verbosity::Error,
    ];

    /// The middle of the ordered levels
    pub fn middle() -> Self {
        Self::ALL[Self::ALL.len() / 2]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Trace => "trace",
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warn => "warn",
            Verbosity::Error => "error",
        }
    }

    /// Parse a configured value, falling back to the middle level
    pub fn from_setting(value: Option<&str>) -> Self {
        value
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(Self::middle)
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value))
            .copied()
            .or_else(|| value.eq_ignore_ascii_case("warning").then_some(Verbosity::Warn))
            .ok_or_else(|| format!("Unknown log level: {}", value))
    }
}

static VERBOSITY: OnceLock<Verbosity> = OnceLock::new();

/// The verbosity for this process; the environment is consulted on first use only
pub fn verbosity() -> Verbosity {
    *VERBOSITY.get_or_init(|| {
        let configured = std::env::var(LOG_LEVEL_ENV).ok();
        Verbosity::from_setting(configured.as_deref())
    })
}
