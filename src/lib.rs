//! Validation of route announcements against RPKI data.
//!
//! This crate contains all the moving parts of the rpki-validator. The
//! application itself, via `main.rs` is only a very tiny frontend.
//!
//! The entry point for library users is [`Validator`]. It keeps a local
//! snapshot of validated ROA payloads fetched from one of the sources
//! listed in [`ConnectorKind`] and validates routes against it. Until the
//! snapshot is available, routes are validated by a remote validator.

pub use self::config::Config;
pub use self::connector::{Connector, ConnectorKind};
pub use self::error::{Error, ExitError, Failed};
pub use self::operation::Operation;
pub use self::validator::{Validator, ValidatorOptions};
pub use self::validity::{RouteState, RouteValidity, Validation};

pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod log;
pub mod meta;
pub mod operation;
pub mod payload;
pub mod queue;
pub mod remote;
pub mod utils;
pub mod validator;
pub mod validity;
