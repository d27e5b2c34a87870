//! Process-wide logger shared by the loaders, the coverage engine and the CLI.
//!
//! Three verbosity levels:
//! - Quiet: errors, written file paths and the closing summary
//! - Normal: progress messages and warnings about skipped records (default)
//! - Verbose: timestamped coloured logs with per-tower detail
//!
//! Library code logs through the free functions in this module. Before
//! [`Logger::init`] is called (tests, embedding) a quiet logger is used.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Verbosity level for controlling output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    Quiet,
    Normal,
    Verbose,
}

const GREY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
enum Tag {
    Error,
    Warn,
    Info,
    Debug,
}

impl Tag {
    fn label(self) -> &'static str {
        match self {
            Tag::Error => "ERROR",
            Tag::Warn => "WARN",
            Tag::Info => "INFO",
            Tag::Debug => "DEBUG",
        }
    }

    fn colour(self) -> &'static str {
        match self {
            Tag::Error => "\x1b[31m",
            Tag::Warn => "\x1b[33m",
            Tag::Info => "\x1b[34m",
            Tag::Debug => GREY,
        }
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Thread-safe logger shared by the loaders, the coverage engine and the CLI.
#[derive(Debug)]
pub struct Logger {
    level: VerbosityLevel,
    colors_enabled: bool,
    interactive: bool,
}

impl Logger {
    /// Installs the global logger. Returns false if one was already installed.
    pub fn init(level: VerbosityLevel, no_color: bool) -> bool {
        let interactive = atty::is(atty::Stream::Stdout);
        let colors_enabled = !no_color && std::env::var_os("NO_COLOR").is_none() && interactive;

        START_TIME.get_or_init(Instant::now);
        LOGGER
            .set(Logger {
                level,
                colors_enabled,
                interactive,
            })
            .is_ok()
    }

    fn quiet() -> Self {
        Logger {
            level: VerbosityLevel::Quiet,
            colors_enabled: false,
            interactive: false,
        }
    }

    /// The global logger, or a quiet one if none was installed.
    pub fn instance() -> &'static Logger {
        LOGGER.get_or_init(Logger::quiet)
    }

    fn elapsed(&self) -> f64 {
        START_TIME
            .get()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn is_verbose(&self) -> bool {
        self.level == VerbosityLevel::Verbose
    }

    pub fn is_quiet(&self) -> bool {
        self.level == VerbosityLevel::Quiet
    }

    pub fn level(&self) -> VerbosityLevel {
        self.level
    }

    fn stamped(&self, tag: Tag, msg: &str) -> String {
        let secs = self.elapsed();
        if !self.colors_enabled {
            return format!("[{secs:.2}s] [{}] {msg}", tag.label());
        }
        format!(
            "{GREY}[{secs:.2}s]{RESET} {}[{}]{RESET} {msg}",
            tag.colour(),
            tag.label()
        )
    }

    /// Errors always go to stderr.
    pub fn error(&self, msg: &str) {
        if self.is_verbose() {
            eprintln!("{}", self.stamped(Tag::Error, msg));
        } else {
            eprintln!("Error: {}", msg);
        }
    }

    /// Warnings go to stderr so they never mix with the quiet-mode path listing.
    pub fn warn(&self, msg: &str) {
        match self.level {
            VerbosityLevel::Quiet => {}
            VerbosityLevel::Normal => eprintln!("Warning: {}", msg),
            VerbosityLevel::Verbose => eprintln!("{}", self.stamped(Tag::Warn, msg)),
        }
    }

    /// Reports a written file (quiet: bare path).
    pub fn output(&self, path: &str) {
        match self.level {
            VerbosityLevel::Quiet => println!("{}", path),
            VerbosityLevel::Normal => println!("Saved: {}", path),
            VerbosityLevel::Verbose => {
                println!("{}", self.stamped(Tag::Info, &format!("Saved: {}", path)))
            }
        }
    }

    pub fn info(&self, msg: &str) {
        match self.level {
            VerbosityLevel::Quiet => {}
            VerbosityLevel::Normal => println!("{}", msg),
            VerbosityLevel::Verbose => println!("{}", self.stamped(Tag::Info, msg)),
        }
    }

    /// Closing summary of a run, shown at every level. Quiet mode puts it on
    /// stderr so stdout stays a bare path listing.
    pub fn summary(&self, msg: &str) {
        match self.level {
            VerbosityLevel::Quiet => eprintln!("{}", msg),
            _ => self.info(msg),
        }
    }

    pub fn debug(&self, msg: &str) {
        if self.is_verbose() {
            println!("{}", self.stamped(Tag::Debug, msg));
        }
    }

    /// Progress bar for `len` steps; hidden when quiet or not attached to a terminal.
    pub fn progress(&self, len: u64, message: &str) -> ProgressBar {
        if self.is_quiet() || !self.interactive {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}

pub fn error(msg: &str) {
    Logger::instance().error(msg);
}

pub fn warn(msg: &str) {
    Logger::instance().warn(msg);
}

pub fn output(path: &str) {
    Logger::instance().output(path);
}

pub fn info(msg: &str) {
    Logger::instance().info(msg);
}

pub fn summary(msg: &str) {
    Logger::instance().summary(msg);
}

pub fn debug(msg: &str) {
    Logger::instance().debug(msg);
}

pub fn progress(len: u64, message: &str) -> ProgressBar {
    Logger::instance().progress(len, message)
}

pub fn is_verbose() -> bool {
    Logger::instance().is_verbose()
}
