//! Configuration.
//!
//! This module primarily contains the type [`Config`] that holds all the
//! configuration used by the validator. It can be loaded both from a TOML
//! formatted config file and command line options.

use std::{env, fmt, fs};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use clap::{Command, Args, ArgAction, ArgMatches, FromArgMatches, crate_version};
use dirs::home_dir;
use log::{LevelFilter, error};
use crate::connector::ConnectorKind;
use crate::error::Failed;


//------------ Defaults for Some Values --------------------------------------

/// The default connector.
const DEFAULT_CONNECTOR: ConnectorKind = ConnectorKind::RpkiClient;

/// The default URL of the remote validator.
const DEFAULT_VALIDATION_URL: &str = "https://rpki.cloudflare.com/api/graphql";

/// The default client identifier sent to data sources.
const DEFAULT_CLIENT_ID: &str = "rpki-validator_rs";

/// The default HTTP User Agent header value to send.
const DEFAULT_USER_AGENT: &str = concat!("rpki-validator/", crate_version!());

/// The default timeout for HTTP requests.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(180);

/// The default maximum age of VRP data.
const DEFAULT_MAX_DATA_AGE: Duration = Duration::from_secs(7200);

/// The default interval for flushing the validation queue.
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// The default time to keep object metadata.
const DEFAULT_META_TTL: Duration = Duration::from_secs(3600);

/// The name of the default config file in the home directory.
const DEFAULT_CONFIG_FILE: &str = ".rpki-validator.conf";


//------------ Config --------------------------------------------------------

/// Validator configuration.
///
/// This type contains both the basic configuration of the validator as well
/// as settings for the binary. You can create a config with default values
/// via the `Default` trait, from a config file, or from the command line
/// via [`from_arg_matches`][Self::from_arg_matches].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The connector providing VRP data.
    pub connector: ConnectorKind,

    /// The URL to fetch VRPs from.
    ///
    /// If this is `None`, the default URL of the connector is used. The
    /// `api` connector requires a URL.
    pub url: Option<String>,

    /// The URL of the object metadata dump.
    pub meta_url: Option<String>,

    /// The URL of the remote validator.
    pub validation_url: String,

    /// The client identifier sent to data sources.
    pub client_id: String,

    /// The HTTP User Agent header value.
    pub user_agent: String,

    /// The timeout for HTTP requests.
    ///
    /// If this is `None`, requests never time out.
    pub http_timeout: Option<Duration>,

    /// The interval in minutes for refreshing VRP data.
    ///
    /// If this is `None`, VRP data is only fetched once.
    pub refresh: Option<u64>,

    /// The maximum age of VRP data before it is rejected.
    pub max_data_age: Duration,

    /// The interval for flushing the validation queue.
    pub flush_interval: Duration,

    /// How long to keep fetched object metadata.
    pub meta_ttl: Duration,

    /// The log levels to be logged.
    pub log_level: LevelFilter,

    /// The target to send log messages to.
    pub log_target: LogTarget,
}


impl Config {
    /// Adds the basic arguments to a clap command.
    ///
    /// The function follows clap’s builder pattern: it takes a command,
    /// adds a bunch of arguments to it and returns it at the end.
    pub fn config_args(app: Command) -> Command {
        GlobalArgs::augment_args(app)
    }

    /// Creates a configuration from command line matches.
    ///
    /// The function attempts to create configuration from the command line
    /// arguments provided via `matches`. It will try to read a config file
    /// if provided via the config file option (`-c` or `--config`) or a
    /// file in `$HOME/.rpki-validator.conf` otherwise. If the latter doesn’t
    /// exist either, starts with a default configuration.
    ///
    /// All relative paths given in command line arguments will be
    /// interpreted relative to `cur_dir`. Conversely, paths in the config
    /// file are treated as relative to the config file’s directory.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        cur_dir: &Path,
    ) -> Result<Self, Failed> {
        let mut res = Self::create_base_config(
            matches.get_one::<PathBuf>("config").map(|path| {
                cur_dir.join(path)
            }).as_deref()
        )?;
        res.apply_arg_matches(matches, cur_dir)?;
        Ok(res)
    }

    /// Applies the command line arguments to a configuration.
    fn apply_arg_matches(
        &mut self,
        matches: &ArgMatches,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        let args = match GlobalArgs::from_arg_matches(matches) {
            Ok(args) => args,
            Err(err) => {
                error!("Failed to process command line arguments: {}", err);
                return Err(Failed)
            }
        };

        // connector
        if let Some(connector) = args.connector {
            self.connector = connector
        }

        // url
        if let Some(url) = args.url {
            self.url = Some(url)
        }

        // meta_url
        if let Some(url) = args.meta_url {
            self.meta_url = Some(url)
        }

        // validation_url
        if let Some(url) = args.validation_url {
            self.validation_url = url
        }

        // client_id
        if let Some(id) = args.client_id {
            self.client_id = id
        }

        // user_agent
        if let Some(agent) = args.user_agent {
            self.user_agent = agent
        }

        // http_timeout
        if let Some(value) = args.http_timeout {
            self.http_timeout = if value == 0 {
                None
            }
            else {
                Some(Duration::from_secs(value))
            };
        }

        // refresh
        if let Some(value) = args.refresh {
            self.refresh = Some(value)
        }

        // max_data_age
        if let Some(value) = args.max_data_age {
            self.max_data_age = Duration::from_secs(value)
        }

        // flush_interval
        if let Some(value) = args.flush_interval {
            if value == 0 {
                error!("Flush interval must be greater than zero.");
                return Err(Failed)
            }
            self.flush_interval = Duration::from_millis(value)
        }

        // meta_ttl
        if let Some(value) = args.meta_ttl {
            self.meta_ttl = Duration::from_secs(value)
        }

        // log_level
        if args.verbose > 1 {
            self.log_level = LevelFilter::Debug
        }
        else if args.verbose == 1 {
            self.log_level = LevelFilter::Info
        }
        else if args.quiet > 1 {
            self.log_level = LevelFilter::Off
        }
        else if args.quiet == 1 {
            self.log_level = LevelFilter::Error
        }

        // log_target
        if let Some(file) = args.logfile.as_ref() {
            if file == "-" {
                self.log_target = LogTarget::Stderr
            }
            else {
                self.log_target = LogTarget::File(cur_dir.join(file))
            }
        }

        Ok(())
    }

    /// Creates the correct base configuration for the given config file
    /// path.
    ///
    /// If no config path is given, tries to read the default config in
    /// `$HOME/.rpki-validator.conf`. If that doesn’t exist, creates a
    /// default config.
    fn create_base_config(path: Option<&Path>) -> Result<Self, Failed> {
        let file = match path {
            Some(path) => {
                match ConfigFile::read(path)? {
                    Some(file) => file,
                    None => {
                        error!("Cannot read config file {}", path.display());
                        return Err(Failed);
                    }
                }
            }
            None => {
                match home_dir() {
                    Some(dir) => {
                        match ConfigFile::read(&dir.join(DEFAULT_CONFIG_FILE))? {
                            Some(file) => file,
                            None => return Ok(Self::default()),
                        }
                    }
                    None => return Ok(Self::default())
                }
            }
        };
        Self::from_config_file(file)
    }

    /// Creates a base config from a config file.
    fn from_config_file(mut file: ConfigFile) -> Result<Self, Failed> {
        let log_target = Self::log_target_from_config_file(&mut file)?;
        let res = Config {
            connector: {
                file.take_from_str("connector")?.unwrap_or(DEFAULT_CONNECTOR)
            },
            url: file.take_string("url")?,
            meta_url: file.take_string("meta-url")?,
            validation_url: {
                file.take_string("validation-url")?.unwrap_or_else(|| {
                    DEFAULT_VALIDATION_URL.into()
                })
            },
            client_id: {
                file.take_string("client-id")?.unwrap_or_else(|| {
                    DEFAULT_CLIENT_ID.into()
                })
            },
            user_agent: {
                file.take_string("user-agent")?.unwrap_or_else(|| {
                    DEFAULT_USER_AGENT.into()
                })
            },
            http_timeout: {
                match file.take_u64("http-timeout")? {
                    Some(0) => None,
                    Some(value) => Some(Duration::from_secs(value)),
                    None => Some(DEFAULT_HTTP_TIMEOUT)
                }
            },
            refresh: file.take_u64("refresh")?,
            max_data_age: {
                file.take_u64("max-data-age")?.map(Duration::from_secs)
                    .unwrap_or(DEFAULT_MAX_DATA_AGE)
            },
            flush_interval: {
                match file.take_u64("flush-interval")? {
                    Some(0) => {
                        error!(
                            "Failed in config file {}: \
                             'flush-interval' must be greater than zero.",
                            file.path.display()
                        );
                        return Err(Failed)
                    }
                    Some(value) => Duration::from_millis(value),
                    None => DEFAULT_FLUSH_INTERVAL,
                }
            },
            meta_ttl: {
                file.take_u64("meta-ttl")?.map(Duration::from_secs)
                    .unwrap_or(DEFAULT_META_TTL)
            },
            log_level: {
                file.take_from_str("log-level")?.unwrap_or(LevelFilter::Warn)
            },
            log_target,
        };
        file.check_exhausted()?;
        Ok(res)
    }

    /// Determines the logging target from the config file.
    fn log_target_from_config_file(
        file: &mut ConfigFile
    ) -> Result<LogTarget, Failed> {
        let log_target = file.take_string("log")?;
        let log_file = file.take_path("log-file")?;
        match log_target.as_deref() {
            Some("default") | Some("stderr") | None => Ok(LogTarget::Stderr),
            Some("file") => {
                match log_file {
                    Some(file) => Ok(LogTarget::File(file)),
                    None => {
                        error!(
                            "Failed in config file {}: \
                             log target \"file\" requires 'log-file' value.",
                            file.path.display()
                        );
                        Err(Failed)
                    }
                }
            }
            Some(value) => {
                error!(
                    "Failed in config file {}: \
                     invalid log target '{}'",
                    file.path.display(), value
                );
                Err(Failed)
            }
        }
    }

    /// Returns a TOML representation of the config.
    pub fn to_toml(&self) -> toml::Value {
        let mut res = toml::value::Table::new();
        res.insert("connector".into(), self.connector.to_string().into());
        if let Some(url) = self.url.as_ref() {
            res.insert("url".into(), url.clone().into());
        }
        if let Some(url) = self.meta_url.as_ref() {
            res.insert("meta-url".into(), url.clone().into());
        }
        res.insert(
            "validation-url".into(), self.validation_url.clone().into()
        );
        res.insert("client-id".into(), self.client_id.clone().into());
        res.insert("user-agent".into(), self.user_agent.clone().into());
        res.insert(
            "http-timeout".into(),
            match self.http_timeout {
                None => toml::Value::Integer(0),
                Some(value) => secs_to_toml(value),
            }
        );
        if let Some(refresh) = self.refresh {
            res.insert(
                "refresh".into(),
                i64::try_from(refresh).unwrap_or(i64::MAX).into()
            );
        }
        res.insert("max-data-age".into(), secs_to_toml(self.max_data_age));
        res.insert(
            "flush-interval".into(),
            i64::try_from(
                self.flush_interval.as_millis()
            ).unwrap_or(i64::MAX).into()
        );
        res.insert("meta-ttl".into(), secs_to_toml(self.meta_ttl));
        res.insert("log-level".into(), self.log_level.to_string().into());
        match self.log_target {
            LogTarget::Stderr => {
                res.insert("log".into(), "stderr".into());
            }
            LogTarget::File(ref file) => {
                res.insert("log".into(), "file".into());
                res.insert(
                    "log-file".into(),
                    file.display().to_string().into()
                );
            }
        }
        toml::Value::Table(res)
    }
}


//--- Default

impl Default for Config {
    fn default() -> Self {
        Config {
            connector: DEFAULT_CONNECTOR,
            url: None,
            meta_url: None,
            validation_url: DEFAULT_VALIDATION_URL.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            http_timeout: Some(DEFAULT_HTTP_TIMEOUT),
            refresh: None,
            max_data_age: DEFAULT_MAX_DATA_AGE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            meta_ttl: DEFAULT_META_TTL,
            log_level: LevelFilter::Warn,
            log_target: LogTarget::Stderr,
        }
    }
}


//--- Display

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_toml())
    }
}


//------------ LogTarget -----------------------------------------------------

/// The target to log to.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum LogTarget {
    /// Stderr.
    #[default]
    Stderr,

    /// A file.
    ///
    /// The argument is the file name.
    File(PathBuf)
}


//------------ GlobalArgs ----------------------------------------------------

/// The global command line arguments.
#[derive(Clone, Debug, Args)]
struct GlobalArgs {
    /// Read base configuration from this file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// The source of VRP data
    #[arg(long, value_name = "CONNECTOR")]
    connector: Option<ConnectorKind>,

    /// The URL to fetch VRPs from
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// The URL of an object metadata dump
    #[arg(long, value_name = "URL")]
    meta_url: Option<String>,

    /// The URL of the remote validator
    #[arg(long, value_name = "URL")]
    validation_url: Option<String>,

    /// The client identifier to send to data sources
    #[arg(long, value_name = "ID")]
    client_id: Option<String>,

    /// The HTTP User Agent to send
    #[arg(long, value_name = "AGENT")]
    user_agent: Option<String>,

    /// Timeout for HTTP requests [default 180, 0 for none]
    #[arg(long, value_name = "SECONDS")]
    http_timeout: Option<u64>,

    /// Refresh interval for VRP data
    #[arg(long, value_name = "MINUTES")]
    refresh: Option<u64>,

    /// Maximum age of VRP data [default 7200]
    #[arg(long, value_name = "SECONDS")]
    max_data_age: Option<u64>,

    /// Interval for sending queued validation requests [default 500]
    #[arg(long, value_name = "MILLISECONDS")]
    flush_interval: Option<u64>,

    /// Time to keep object metadata [default 3600]
    #[arg(long, value_name = "SECONDS")]
    meta_ttl: Option<u64>,

    /// Log more information, twice for even more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log less information, twice for no information
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,

    /// Log to this file
    #[arg(long, value_name = "PATH")]
    logfile: Option<String>,
}


//------------ ConfigFile ----------------------------------------------------

/// The content of a config file.
///
/// This is a thin wrapper around `toml::Table` to make dealing with it more
/// convenient.
#[derive(Clone, Debug)]
struct ConfigFile {
    /// The content of the file.
    content: toml::value::Table,

    /// The path to the config file.
    path: PathBuf,

    /// The directory we found the file in.
    ///
    /// This is used in relative paths.
    dir: PathBuf,
}

impl ConfigFile {
    /// Reads the config file at the given path.
    ///
    /// If there is no such file, returns `None`. If there is a file but it
    /// is broken, aborts.
    fn read(path: &Path) -> Result<Option<Self>, Failed> {
        let mut file = match fs::File::open(path) {
            Ok(file) => file,
            Err(_) => return Ok(None)
        };
        let mut config = String::new();
        if let Err(err) = file.read_to_string(&mut config) {
            error!(
                "Failed to read config file {}: {}",
                path.display(), err
            );
            return Err(Failed);
        }
        Self::parse(&config, path).map(Some)
    }

    /// Parses the content of the file from a string.
    fn parse(content: &str, path: &Path) -> Result<Self, Failed> {
        let content = match toml::from_str(content) {
            Ok(toml::Value::Table(content)) => content,
            Ok(_) => {
                error!(
                    "Failed to parse config file {}: Not a mapping.",
                    path.display()
                );
                return Err(Failed);
            }
            Err(err) => {
                error!(
                    "Failed to parse config file {}: {}",
                    path.display(), err
                );
                return Err(Failed);
            }
        };
        let path = if path.is_relative() {
            match env::current_dir() {
                Ok(dir) => dir.join(path),
                Err(err) => {
                    error!(
                        "Fatal: Can't determine current directory: {}.",
                        err
                    );
                    return Err(Failed);
                }
            }
        }
        else {
            path.into()
        };
        let dir = path.parent().map(Into::into).unwrap_or_default();
        Ok(ConfigFile { content, path, dir })
    }

    /// Takes an unsigned integer value from the config file.
    ///
    /// The value is taken from the given `key`. Returns `Ok(None)` if there
    /// is no such key. Returns an error if the key exists but the value
    /// isn’t an integer or if it is negative.
    fn take_u64(&mut self, key: &str) -> Result<Option<u64>, Failed> {
        match self.content.remove(key) {
            Some(value) => {
                if let toml::Value::Integer(res) = value {
                    u64::try_from(res).map(Some).map_err(|_| {
                        error!(
                            "Failed in config file {}: \
                            '{}' expected to be a positive integer.",
                            self.path.display(), key
                        );
                        Failed
                    })
                }
                else {
                    error!(
                        "Failed in config file {}: \
                         '{}' expected to be an integer.",
                        self.path.display(), key
                    );
                    Err(Failed)
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a string value from the config file.
    ///
    /// The value is taken from the given `key`. Returns `Ok(None)` if there
    /// is no such key. Returns an error if the key exists but the value
    /// isn’t a string.
    fn take_string(&mut self, key: &str) -> Result<Option<String>, Failed> {
        match self.content.remove(key) {
            Some(value) => {
                if let toml::Value::String(res) = value {
                    Ok(Some(res))
                }
                else {
                    error!(
                        "Failed in config file {}: \
                         '{}' expected to be a string.",
                        self.path.display(), key
                    );
                    Err(Failed)
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a string encoded value from the config file.
    ///
    /// The value is taken from the given `key`. It is expected to be a
    /// string and will be converted to the final type via
    /// `FromStr::from_str`.
    ///
    /// Returns `Ok(None)` if the key doesn’t exist. Returns an error if the
    /// key exists but the value isn’t a string or conversion fails.
    fn take_from_str<T>(&mut self, key: &str) -> Result<Option<T>, Failed>
    where T: FromStr, T::Err: fmt::Display {
        match self.take_string(key)? {
            Some(value) => {
                match T::from_str(&value) {
                    Ok(some) => Ok(Some(some)),
                    Err(err) => {
                        error!(
                            "Failed in config file {}: \
                             illegal value in '{}': {}.",
                            self.path.display(), key, err
                        );
                        Err(Failed)
                    }
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a path value from the config file.
    ///
    /// The path is taken from the given `key`. It must be a string value.
    /// It is treated as relative to the directory of the config file. If it
    /// is indeed a relative path, it is expanded accordingly and an absolute
    /// path is returned.
    ///
    /// Returns `Ok(None)` if the key does not exist. Returns an error if the
    /// key exists but the value isn’t a string.
    fn take_path(&mut self, key: &str) -> Result<Option<PathBuf>, Failed> {
        self.take_string(key).map(|opt| opt.map(|path| self.dir.join(path)))
    }

    /// Checks whether the config file is now empty.
    ///
    /// If it isn’t, logs a complaint and returns an error.
    fn check_exhausted(&self) -> Result<(), Failed> {
        if !self.content.is_empty() {
            print!(
                "Failed in config file {}: Unknown settings ",
                self.path.display()
            );
            let mut first = true;
            for key in self.content.keys() {
                if !first {
                    print!(",");
                }
                else {
                    first = false
                }
                print!("{}", key);
            }
            error!(".");
            Err(Failed)
        }
        else {
            Ok(())
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Converts a duration into a TOML integer of seconds.
fn secs_to_toml(value: Duration) -> toml::Value {
    i64::try_from(value.as_secs()).unwrap_or(i64::MAX).into()
}


//============ Tests =========================================================
