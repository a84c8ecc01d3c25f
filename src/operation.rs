//! What the validator can do for you.
//!
//! This module implements all the commands users can ask the binary to
//! perform. They are encapsulated in the type [`Operation`] which can
//! determine the command from the command line argumments and then execute
//! it.

use std::io;
use std::io::Write;
use chrono::{DateTime, Utc};
use clap::{Args, ArgMatches, FromArgMatches, Parser};
use log::{error, warn};
use serde::Serialize;
use tokio::runtime::Runtime;
use crate::config::Config;
use crate::error::{Error, ExitError, Failed};
use crate::log::Logger;
use crate::payload::{VrpKey, parse_origin, parse_prefix};
use crate::utils::date::parse_timestamp;
use crate::validator::Validator;


//------------ Operation -----------------------------------------------------

/// The command to execute.
///
/// This type collects all the commands we have defined plus any possible
/// extra configuration they support.
///
/// You can create a value from the command line arguments. First, you add
/// all necessary sub-commands and arguments to a clap `Command` via
/// [`config_args`][Self::config_args] and then process the argument
/// matches into a value in [`from_arg_matches`][Self::from_arg_matches].
/// Finally, you can execute the created command through the
/// [`run`][Self::run] method.
pub enum Operation {
    Validate(Validate),
    Vrps(Vrps),
    Expiring(Expiring),
    PrintConfig(PrintConfig),
}

impl Operation {
    /// Prepares everything.
    ///
    /// Call this before doing anything else.
    pub fn prepare() -> Result<(), Failed> {
        Logger::init()
    }

    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        let app = Validate::config_args(app);
        let app = Vrps::config_args(app);
        let app = Expiring::config_args(app);
        PrintConfig::config_args(app)
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(matches: &ArgMatches) -> Result<Self, Failed> {
        Ok(match matches.subcommand() {
            Some(("validate", matches)) => {
                Operation::Validate(Validate::from_arg_matches(matches)?)
            }
            Some(("vrps", _)) => Operation::Vrps(Vrps),
            Some(("expiring", matches)) => {
                Operation::Expiring(Expiring::from_arg_matches(matches)?)
            }
            Some(("config", _)) => Operation::PrintConfig(PrintConfig),
            _ => {
                error!(
                    "Failed: a command is required.\n\
                     \nCommonly used commands are:\
                     \n   validate  Validates a route announcement\
                     \n   vrps      Produces the list of installed VRPs\
                     \n\
                     \nSee rpki-validator -h for a usage summary."
                );
                return Err(Failed)
            }
        })
    }

    /// Runs the command.
    ///
    /// Logging is switched to the configured target first.
    pub fn run(self, config: Config) -> Result<(), ExitError> {
        Logger::switch_logging(&config)?;
        match self {
            Operation::Validate(cmd) => cmd.run(&config),
            Operation::Vrps(cmd) => cmd.run(&config),
            Operation::Expiring(cmd) => cmd.run(&config),
            Operation::PrintConfig(cmd) => cmd.run(&config),
        }
    }
}


//------------ Validate ------------------------------------------------------

/// Validate a route announcement.
#[derive(Clone, Debug, Parser)]
pub struct Validate {
    /// Address prefix of the announcement
    #[arg(short, long)]
    prefix: String,

    /// Origin AS number of the announcement
    #[arg(short, long)]
    asn: String,

    /// Include the reason and the covering VRPs in the output
    #[arg(long)]
    verbose: bool,
}

impl Validate {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(
            Validate::augment_args(
                clap::Command::new("validate")
                    .about("Validates a route announcement")
                    .after_help(AFTER_HELP)
            )
        )
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(matches: &ArgMatches) -> Result<Self, Failed> {
        <Self as FromArgMatches>::from_arg_matches(matches).map_err(|err| {
            error!("{}", err);
            Failed
        })
    }

    /// Outputs whether the given route announcement is valid.
    ///
    /// If there is no local data, the route is validated online.
    fn run(self, config: &Config) -> Result<(), ExitError> {
        let validator = Validator::new(config)?;
        let res = runtime()?.block_on(async move {
            if let Err(err) = validator.pre_cache(None).await {
                warn!("No local VRP data: {}. Validating online.", err);
            }
            validator.validate(&self.prefix, &self.asn, self.verbose).await
        });
        let res = res.map_err(|err| {
            error!("{}", err);
            ExitError::Generic
        })?;
        output_json(&res)?;
        if res.valid() == Some(false) {
            Err(ExitError::Invalid)
        }
        else {
            Ok(())
        }
    }
}


//------------ Vrps ----------------------------------------------------------

/// Produce the list of installed VRPs.
pub struct Vrps;

impl Vrps {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(clap::Command::new("vrps")
            .about("Produces the list of installed VRPs")
            .after_help(AFTER_HELP)
        )
    }

    fn run(self, config: &Config) -> Result<(), ExitError> {
        let validator = Validator::new(config)?;
        let res = runtime()?.block_on(async move {
            match validator.pre_cache(None).await {
                Ok(true) => Ok(validator.get_vrps()),
                Ok(false) => {
                    error!("The source didn’t provide a VRP list.");
                    Err(ExitError::Generic)
                }
                Err(err) => Err(log_error(err)),
            }
        })?;
        output_json(&res)
    }
}


//------------ Expiring ------------------------------------------------------

/// Show the objects on a VRP’s certification path expiring at some time.
pub struct Expiring {
    /// The VRP.
    vrp: VrpKey,

    /// The time of expiry.
    at: DateTime<Utc>,

    /// Objects must be valid at this time.
    as_of: Option<DateTime<Utc>>,
}

/// The command line arguments for the expiring sub-command.
#[derive(Clone, Debug, Parser)]
struct ExpiringArgs {
    /// Prefix of the VRP
    #[arg(short, long)]
    prefix: String,

    /// AS number of the VRP
    #[arg(short, long)]
    asn: String,

    /// Maximum length of the VRP
    #[arg(short, long, value_name = "LENGTH")]
    max_length: u8,

    /// Expiry time as RFC 3339 date or Unix seconds
    #[arg(long, value_name = "TIME")]
    at: String,

    /// Only include objects valid at this time [default: now]
    #[arg(long, value_name = "TIME")]
    as_of: Option<String>,
}

impl Expiring {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(
            ExpiringArgs::augment_args(
                clap::Command::new("expiring")
                    .about(
                        "Shows objects for a VRP expiring at a given time"
                    )
                    .after_help(AFTER_HELP)
            )
        )
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(matches: &ArgMatches) -> Result<Self, Failed> {
        let args = ExpiringArgs::from_arg_matches(matches).map_err(|err| {
            error!("{}", err);
            Failed
        })?;
        let prefix = parse_prefix(&args.prefix).map_err(|err| {
            error!("{}", err);
            Failed
        })?;
        let asn = parse_origin(&args.asn).map_err(|err| {
            error!("{}", err);
            Failed
        })?;
        Ok(Expiring {
            vrp: VrpKey::new(prefix, asn, args.max_length),
            at: parse_time(&args.at)?,
            as_of: args.as_of.as_deref().map(parse_time).transpose()?,
        })
    }

    fn run(self, config: &Config) -> Result<(), ExitError> {
        let validator = Validator::new(config)?;
        let as_of = self.as_of.unwrap_or_else(Utc::now);
        let res = runtime()?.block_on(async move {
            validator.expiring_elements(&self.vrp, self.at, as_of).await
        }).map_err(log_error)?;
        output_json(&res)
    }
}


//------------ PrintConfig ---------------------------------------------------

/// Print the configuration.
pub struct PrintConfig;

impl PrintConfig {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(clap::Command::new("config")
            .about("Prints the current config and exits")
            .after_help(AFTER_HELP)
        )
    }

    /// Prints the current configuration to stdout and exits.
    fn run(self, config: &Config) -> Result<(), ExitError> {
        println!("{}", config);
        Ok(())
    }
}


//------------ Helpers -------------------------------------------------------

/// Creates the Tokio runtime.
fn runtime() -> Result<Runtime, Failed> {
    Runtime::new().map_err(|err| {
        error!("Failed to create runtime: {}", err);
        Failed
    })
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, Failed> {
    parse_timestamp(s).ok_or_else(|| {
        error!("Invalid time '{}'.", s);
        Failed
    })
}

fn log_error(err: Error) -> ExitError {
    error!("{}", err);
    ExitError::Generic
}

/// Writes a value as JSON to stdout.
fn output_json<T: Serialize>(value: &T) -> Result<(), ExitError> {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    serde_json::to_writer_pretty(&mut stdout, value).map_err(|err| {
        error!("Failed to write output: {}", err);
        ExitError::Generic
    })?;
    writeln!(stdout).map_err(|err| {
        error!("Failed to write output: {}", err);
        ExitError::Generic
    })
}


//------------ Constants -----------------------------------------------------

const AFTER_HELP: &str =
    "Additional global options are available. \
    Please consult 'rpki-validator --help' for those.";


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use clap::Command;
    use super::*;

    fn operation(args: &[&str]) -> Result<Operation, Failed> {
        let matches = Operation::config_args(
            Config::config_args(Command::new("rpki-validator"))
        ).try_get_matches_from(args).map_err(|_| Failed)?;
        Operation::from_arg_matches(&matches)
    }

    #[test]
    fn validate_args() {
        match operation(&[
            "rpki-validator", "validate", "-p", "218.103.58.0/23",
            "-a", "AS4515", "--verbose"
        ]).unwrap() {
            Operation::Validate(cmd) => {
                assert_eq!(cmd.prefix, "218.103.58.0/23");
                assert_eq!(cmd.asn, "AS4515");
                assert!(cmd.verbose);
            }
            _ => panic!("wrong operation")
        }
        assert!(operation(&["rpki-validator", "validate", "-p", "1.0.0.0/8"])
            .is_err());
    }

    #[test]
    fn expiring_args() {
        match operation(&[
            "rpki-validator", "expiring", "-p", "1.2.3.0/24", "-a", "64500",
            "-m", "24", "--at", "2024-06-01T00:00:00Z", "--as-of", "1704067200"
        ]).unwrap() {
            Operation::Expiring(cmd) => {
                assert_eq!(cmd.vrp.max_length, 24);
                assert_eq!(cmd.vrp.asn.into_u32(), 64500);
                assert_eq!(cmd.at.to_rfc3339(), "2024-06-01T00:00:00+00:00");
                assert_eq!(cmd.as_of.map(|t| t.timestamp()), Some(1704067200));
            }
            _ => panic!("wrong operation")
        }
        assert!(operation(&[
            "rpki-validator", "expiring", "-p", "1.2.3.0/24", "-a", "64500",
            "-m", "24", "--at", "tomorrow"
        ]).is_err());
    }

    #[test]
    fn other_commands() {
        assert!(matches!(
            operation(&["rpki-validator", "vrps"]), Ok(Operation::Vrps(_))
        ));
        assert!(matches!(
            operation(&["rpki-validator", "config"]),
            Ok(Operation::PrintConfig(_))
        ));
        assert!(operation(&["rpki-validator"]).is_err());
    }
}
