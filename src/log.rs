//! Logging.

use std::{fs, io, process};
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::OnceLock;
use log::{LevelFilter, error};
use crate::config::{Config, LogTarget};
use crate::error::Failed;
use crate::utils::date::format_local_iso_date;
use crate::utils::sync::Mutex;


//------------ Logger --------------------------------------------------------

/// Format and write log messages.
pub struct Logger {
    /// Where to write messages to.
    target: Mutex<LogBackend>,

    /// The maximum log level.
    log_level: log::LevelFilter,
}

/// The actual target for logging
enum LogBackend {
    File {
        file: fs::File,
        path: PathBuf,
    },
    Stderr {
        stderr: io::Stderr,
    }
}

impl Logger {
    /// Initialize logging.
    ///
    /// All diagnostic output is done via logging, never to stderr directly.
    /// Thus, it is important to initialize logging before doing anything
    /// else that may result in such output. This function sets a maximum
    /// log level of `warn` and directs all logging to stderr.
    pub fn init() -> Result<(), Failed> {
        log::set_max_level(LevelFilter::Warn);
        if let Err(err) = log::set_logger(&GLOBAL_LOGGER) {
            eprintln!("Failed to initialize logger: {err}.\nAborting.");
            return Err(Failed)
        }
        Ok(())
    }

    /// Switches logging to the configured target.
    ///
    /// Once the configuration has been successfully loaded, logging should
    /// be switched to whatever the user asked for via this method.
    pub fn switch_logging(config: &Config) -> Result<(), Failed> {
        let logger = Logger::new(config)?;
        GLOBAL_LOGGER.switch(logger);
        log::set_max_level(config.log_level);
        Ok(())
    }

    /// Creates a new logger from config.
    fn new(config: &Config) -> Result<Self, Failed> {
        let target = match config.log_target {
            LogTarget::File(ref path) => {
                Self::new_file_target(path.clone())?
            }
            LogTarget::Stderr => {
                LogBackend::Stderr { stderr: io::stderr() }
            }
        };
        Ok(Self {
            target: Mutex::new(target),
            log_level: config.log_level,
        })
    }

    fn new_file_target(path: PathBuf) -> Result<LogBackend, Failed> {
        let file = fs::OpenOptions::new().create(true).append(true).open(
            &path
        );
        match file {
            Ok(file) => Ok(LogBackend::File { file, path }),
            Err(err) => {
                error!(
                    "Failed to open log file '{}': {}",
                    path.display(), err
                );
                Err(Failed)
            }
        }
    }

    /// Logs a message.
    ///
    /// This method may exit the whole process if logging fails.
    fn log(&self, record: &log::Record) {
        if should_ignore(self.log_level, record) {
            return;
        }
        if let Err(err) = self.try_log(record) {
            self.log_failure(err);
        }
    }

    /// Tries logging a message and returns an error if there is one.
    fn try_log(&self, record: &log::Record) -> Result<(), io::Error> {
        match self.target.lock().deref_mut() {
            LogBackend::File { ref mut file, .. } => {
                writeln!(
                    file, "[{}] [{}] {}",
                    format_local_iso_date(chrono::Local::now()),
                    record.level(),
                    record.args()
                )
            }
            LogBackend::Stderr { ref mut stderr } => {
                // We never fail when writing to stderr.
                let _ = writeln!(
                    stderr, "[{}] {}", record.level(), record.args()
                );
                Ok(())
            }
        }
    }

    /// Handles an error that happened during logging.
    fn log_failure(&self, err: io::Error) -> ! {
        if let LogBackend::File { ref path, .. } = self.target.lock().deref() {
            eprintln!(
                "Logging to file {} failed: {}. Exiting.",
                path.display(),
                err
            );
        }
        process::exit(1)
    }

    /// Flushes the logging backend.
    fn flush(&self) {
        match self.target.lock().deref_mut() {
            LogBackend::File { ref mut file, .. } => {
                let _ = file.flush();
            }
            LogBackend::Stderr { ref mut stderr } => {
                let _  = stderr.lock().flush();
            }
        }
    }
}


//------------ should_ignore -------------------------------------------------

/// Determines whether a log record should be ignored.
///
/// This filters out messages by libraries that we don’t really want to
/// see.
fn should_ignore(log_level: LevelFilter, record: &log::Record) -> bool {
    let module = match record.module_path() {
        Some(module) => module,
        None => return false,
    };

    // log::Level sorts more important first.

    if record.level() > log::Level::Error {
        // From rustls, only log errors.
        if module.starts_with("rustls") {
            return true
        }
    }
    if log_level >= log::LevelFilter::Trace {
        // Don’t filter anything else if we are in trace.
        return false
    }

    // Ignore these modules unless INFO or more important.
    record.level() > log::Level::Info && (
           module.starts_with("hyper")
        || module.starts_with("reqwest")
        || module.starts_with("h2")
    )
}


//------------ GlobalLogger --------------------------------------------------

/// The global logger.
///
/// A value of this type can go into a static. Until a proper logger is
/// installed, it just writes all log output to stderr.
struct GlobalLogger {
    /// The real logger. Can only be set once.
    inner: OnceLock<Logger>,
}

/// The static for the log crate.
static GLOBAL_LOGGER: GlobalLogger = GlobalLogger::new();

impl GlobalLogger {
    /// Creates a new provisional logger.
    const fn new() -> Self {
        GlobalLogger { inner: OnceLock::new() }
    }

    /// Switches to the proper logger.
    fn switch(&self, logger: Logger) {
        if self.inner.set(logger).is_err() {
            panic!("Tried to switch logger more than once.")
        }
    }
}


impl log::Log for GlobalLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        match self.inner.get() {
            Some(logger) => logger.log(record),
            None => {
                let _ = writeln!(
                    io::stderr().lock(), "[{}] {}",
                    record.level(), record.args()
                );
            }
        }
    }

    fn flush(&self) {
        if let Some(logger) = self.inner.get() {
            logger.flush()
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn record_ignored(level: LevelFilter, module: &str, rec: log::Level) -> bool {
        should_ignore(
            level,
            &log::Record::builder()
                .level(rec)
                .module_path(Some(module))
                .args(format_args!("test"))
                .build()
        )
    }

    #[test]
    fn file_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validator.log");
        let mut config = Config::default();
        config.log_level = LevelFilter::Info;
        config.log_target = LogTarget::File(path.clone());
        let logger = Logger::new(&config).unwrap();
        logger.try_log(
            &log::Record::builder()
                .level(log::Level::Info)
                .module_path(Some("rpki_validator::cache"))
                .args(format_args!("Installed {} VRPs.", 12))
                .build()
        ).unwrap();
        logger.flush();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with('['));
        assert!(content.ends_with("] [INFO] Installed 12 VRPs.\n"));

        assert!(Logger::new_file_target(dir.path().join("no/such/dir")).is_err());
    }

    #[test]
    fn library_noise() {
        use log::Level;

        assert!(record_ignored(LevelFilter::Trace, "rustls::conn", Level::Warn));
        assert!(!record_ignored(LevelFilter::Warn, "rustls::conn", Level::Error));
        assert!(record_ignored(LevelFilter::Debug, "reqwest::connect", Level::Debug));
        assert!(!record_ignored(LevelFilter::Trace, "reqwest::connect", Level::Debug));
        assert!(!record_ignored(LevelFilter::Debug, "hyper::client", Level::Info));
        assert!(
            !record_ignored(LevelFilter::Debug, "rpki_validator::cache", Level::Debug)
        );
    }
}
