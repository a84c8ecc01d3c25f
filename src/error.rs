//! Error types used by multiple modules.
//!
//! There are three error types that are used widely within the library.
//!
//! The most basic is [`Failed`]. It indicates that an operation had to be
//! canceled and that all diagnostic information has already been logged,
//! so callers need not do anything further. It is used while setting up
//! configuration and logging.
//!
//! The validation API itself returns [`Error`]. Its variants distinguish
//! between the kinds of failure a caller may want to react to differently:
//! bad input, stale data, transport trouble, and unsupported operations.
//!
//! Finally, [`ExitError`] is used when the program should be terminated. It
//! provides enough information to determine the exit code of the program.

use std::{error, fmt};
use chrono::{DateTime, Utc};
use crate::utils::date::format_iso_date;


//------------ Failed --------------------------------------------------------

/// An operation has failed to complete.
///
/// This error types is used to indicate that an operation has failed,
/// diagnostic information has been printed or logged, and the caller can’t
/// really do anything to recover.
#[derive(Clone, Copy, Debug)]
pub struct Failed;


//------------ Error ---------------------------------------------------------

/// An error happened while validating or while maintaining the VRP cache.
///
/// The type is cheap enough to clone so that a single failure can be handed
/// to every caller waiting on the same coalesced request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The origin AS number was missing.
    MissingOrigin,

    /// The origin AS number could not be parsed.
    InvalidOrigin(String),

    /// The prefix is missing or isn’t a valid CIDR prefix.
    InvalidPrefix(String),

    /// A refresh schedule was requested more often than allowed.
    RefreshTooFrequent {
        requested: u64,
        minimum: u64,
    },

    /// Fetched VRP data was rejected because of its age.
    Stale(StaleReason),

    /// Talking to a remote source failed.
    Transport(String),

    /// The operation isn’t supported by the active connector.
    NotSupported(&'static str),

    /// The validator was shut down while a request was pending.
    QueueClosed,
}

impl Error {
    /// Returns whether the error was caused by bad caller input.
    ///
    /// Input errors are always reported before any cache or network access
    /// happens.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Error::MissingOrigin | Error::InvalidOrigin(_)
                | Error::InvalidPrefix(_)
        )
    }

    /// Returns whether this is a freshness rejection.
    pub fn is_stale(&self) -> bool {
        matches!(self, Error::Stale(_))
    }

    /// Creates a transport error from anything displayable.
    pub fn transport(err: impl fmt::Display) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Transport(format!("request timed out: {}", err))
        }
        else {
            Error::transport(err)
        }
    }
}

impl From<StaleReason> for Error {
    fn from(reason: StaleReason) -> Self {
        Error::Stale(reason)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::MissingOrigin => f.write_str("Origin AS missing"),
            Error::InvalidOrigin(ref origin) => {
                write!(f, "Origin AS '{}' is not valid", origin)
            }
            Error::InvalidPrefix(ref prefix) => {
                write!(f, "Prefix '{}' missing or not valid", prefix)
            }
            Error::RefreshTooFrequent { minimum, .. } => {
                write!(
                    f,
                    "The VRP list can be updated at most once every {} \
                     minutes.",
                    minimum
                )
            }
            Error::Stale(ref reason) => reason.fmt(f),
            Error::Transport(ref msg) => {
                write!(f, "Remote request failed: {}", msg)
            }
            Error::NotSupported(what) => {
                write!(f, "{} is not supported by this connector", what)
            }
            Error::QueueClosed => {
                f.write_str("The validator was shut down")
            }
        }
    }
}

impl error::Error for Error { }


//------------ StaleReason ---------------------------------------------------

/// Why fetched VRP data was not installed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StaleReason {
    /// The data was built too long ago.
    TooOld {
        build_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// The data is older than the currently installed snapshot.
    OlderThanInstalled {
        build_time: DateTime<Utc>,
        installed: DateTime<Utc>,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StaleReason::TooOld { build_time, now } => {
                write!(
                    f, "VRP data built at {} is too old at {}",
                    format_iso_date(build_time), format_iso_date(now)
                )
            }
            StaleReason::OlderThanInstalled { build_time, installed } => {
                write!(
                    f,
                    "VRP data built at {} is older than the installed \
                     data built at {}",
                    format_iso_date(build_time), format_iso_date(installed)
                )
            }
        }
    }
}


//------------ ExitError -----------------------------------------------------

/// An error happened that should lead to terminating the program.
#[derive(Clone, Copy, Debug)]
pub enum ExitError {
    /// Something has happened.
    ///
    /// This should be exit status 1.
    Generic,

    /// A validated route turned out to be RPKI invalid.
    ///
    /// This should be exit status 3.
    Invalid,
}

impl From<Failed> for ExitError {
    fn from(_: Failed) -> ExitError {
        ExitError::Generic
    }
}


//============ Tests =========================================================
