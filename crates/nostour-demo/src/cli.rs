#![forbid(unsafe_code)]

//! Command-line argument parsing for the demo.
//!
//! Parses args manually to keep the binary lean. Environment variables with
//! the `NOSTOUR_DEMO_*` prefix override defaults; explicit flags override
//! both.

use std::env;
use std::fmt;
use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const HELP_TEXT: &str = "\
nostour demo: scripted guided tours over a simulated Nostr client

USAGE:
    nostour-demo [OPTIONS]

OPTIONS:
    --tour=ID            Tour to run (default: amethyst-chat)
    --store=PATH         Persist tour progress in a JSON file (default: in memory)
    --persist            Persist tour progress in the user's state directory
    --reset              Forget stored progress for the tour before running
    --width=PX           Viewport width (default: 1280)
    --height=PX          Viewport height (default: 800)
    --tick-ms=N          Milliseconds per simulated frame (default: 16)
    --max-ticks=N        Give up after N frames (default: 5000)
    --json               Print the transcript as JSON
    --list               List available tours
    --help, -h           Show this help message
    --version, -V        Show version

TOURS:
    amethyst-chat        Encrypted direct messages
    primal-feed          Reading and reacting to notes

ENVIRONMENT VARIABLES:
    NOSTOUR_DEMO_TOUR         Override --tour
    NOSTOUR_DEMO_STORE        Override --store
    NOSTOUR_DEMO_TICK_MS      Override --tick-ms
    NOSTOUR_DEMO_MAX_TICKS    Override --max-ticks
    NOSTOUR_LOG               Log filter, e.g. 'nostour_runtime=debug'";

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq)]
pub struct Opts {
    pub tour: String,
    /// File-backed progress store, `None` for in-memory.
    pub store: Option<PathBuf>,
    /// File-backed store at the default location when no path is given.
    pub persist: bool,
    pub reset: bool,
    pub width: f64,
    pub height: f64,
    pub tick_ms: u64,
    pub max_ticks: u32,
    pub json: bool,
    pub list: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            tour: "amethyst-chat".into(),
            store: None,
            persist: false,
            reset: false,
            width: 1280.0,
            height: 800.0,
            tick_ms: 16,
            max_ticks: 5000,
            json: false,
            list: false,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(Opts),
    Help,
    Version,
}

/// A flag the parser could not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    InvalidValue { flag: &'static str, value: String },
    UnknownArgument(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidValue { flag, value } => write!(f, "Invalid {flag} value: {value}"),
            CliError::UnknownArgument(arg) => write!(f, "Unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl Opts {
    /// Apply `NOSTOUR_DEMO_*` overrides from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| env::var(key).ok())
    }

    /// Apply overrides looked up through `var`. Unparsable values are ignored.
    #[must_use]
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = var("NOSTOUR_DEMO_TOUR") {
            self.tour = val;
        }
        if let Some(val) = var("NOSTOUR_DEMO_STORE")
            && !val.is_empty()
        {
            self.store = Some(PathBuf::from(val));
        }
        if let Some(val) = var("NOSTOUR_DEMO_TICK_MS")
            && let Ok(n) = val.parse()
        {
            self.tick_ms = n;
        }
        if let Some(val) = var("NOSTOUR_DEMO_MAX_TICKS")
            && let Ok(n) = val.parse()
        {
            self.max_ticks = n;
        }
        self
    }
}

/// Parse flags on top of `base`.
pub fn parse_args<I>(base: Opts, args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut opts = base;
    for arg in args {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--version" | "-V" => return Ok(Command::Version),
            "--reset" => opts.reset = true,
            "--persist" => opts.persist = true,
            "--json" => opts.json = true,
            "--list" => opts.list = true,
            other => {
                if let Some(val) = other.strip_prefix("--tour=") {
                    opts.tour = val.to_string();
                } else if let Some(val) = other.strip_prefix("--store=") {
                    opts.store = Some(PathBuf::from(val));
                } else if let Some(val) = other.strip_prefix("--width=") {
                    opts.width = parse_px("--width", val)?;
                } else if let Some(val) = other.strip_prefix("--height=") {
                    opts.height = parse_px("--height", val)?;
                } else if let Some(val) = other.strip_prefix("--tick-ms=") {
                    opts.tick_ms = parse_num("--tick-ms", val)?;
                } else if let Some(val) = other.strip_prefix("--max-ticks=") {
                    opts.max_ticks = parse_num("--max-ticks", val)?;
                } else {
                    return Err(CliError::UnknownArgument(other.to_string()));
                }
            }
        }
    }
    Ok(Command::Run(opts))
}

fn parse_num<T: std::str::FromStr>(flag: &'static str, val: &str) -> Result<T, CliError> {
    val.parse().map_err(|_| CliError::InvalidValue {
        flag,
        value: val.to_string(),
    })
}

fn parse_px(flag: &'static str, val: &str) -> Result<f64, CliError> {
    let px: f64 = parse_num(flag, val)?;
    if px.is_finite() && px > 0.0 {
        Ok(px)
    } else {
        Err(CliError::InvalidValue {
            flag,
            value: val.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_opts() {
        let opts = Opts::default();
        assert_eq!(opts.tour, "amethyst-chat");
        assert_eq!(opts.store, None);
        assert_eq!(opts.tick_ms, 16);
        assert!(!opts.json);
    }

    #[test]
    fn flags_override_defaults() {
        let cmd = parse_args(
            Opts::default(),
            args(&["--tour=primal-feed", "--width=640", "--json", "--store=/tmp/p.json"]),
        )
        .unwrap();
        let Command::Run(opts) = cmd else {
            panic!("expected run");
        };
        assert_eq!(opts.tour, "primal-feed");
        assert_eq!(opts.width, 640.0);
        assert!(opts.json);
        assert_eq!(opts.store, Some(PathBuf::from("/tmp/p.json")));
    }

    #[test]
    fn env_then_flags() {
        let base = Opts::default().with_env(|key| match key {
            "NOSTOUR_DEMO_TOUR" => Some("primal-feed".into()),
            "NOSTOUR_DEMO_TICK_MS" => Some("oops".into()),
            "NOSTOUR_DEMO_MAX_TICKS" => Some("10".into()),
            _ => None,
        });
        assert_eq!(base.tour, "primal-feed");
        assert_eq!(base.tick_ms, 16);
        assert_eq!(base.max_ticks, 10);
        let Ok(Command::Run(opts)) = parse_args(base, args(&["--tour=amethyst-chat"])) else {
            panic!("expected run");
        };
        assert_eq!(opts.tour, "amethyst-chat");
        assert_eq!(opts.max_ticks, 10);
    }

    #[test]
    fn bad_values_are_errors() {
        assert_eq!(
            parse_args(Opts::default(), args(&["--width=-3"])),
            Err(CliError::InvalidValue {
                flag: "--width",
                value: "-3".into()
            })
        );
        assert_eq!(
            parse_args(Opts::default(), args(&["--frobnicate"]))
                .unwrap_err()
                .to_string(),
            "Unknown argument: --frobnicate"
        );
        assert_eq!(parse_args(Opts::default(), args(&["-h", "--bogus"])), Ok(Command::Help));
    }

    #[test]
    fn help_text_lists_tours() {
        for id in crate::tours::TOUR_IDS {
            assert!(HELP_TEXT.contains(id));
        }
        assert!(!VERSION.is_empty());
    }
}
