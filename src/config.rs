//! Provides the CLI option parser
//!
//! Used to parse argv and the optional config file into a struct that the
//! driver can consume. Command line values win over config file values,
//! which win over the defaults.

use clap::{App, Arg, ArgMatches};
use output;
use std::collections::BTreeMap;
use std::error;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use toml;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn default_state_dir() -> PathBuf {
    Path::new("/var/run/logster").to_path_buf()
}

fn default_version() -> String {
    VERSION.unwrap_or("unknown").to_string()
}

/// Configuration problems. All of them are fatal at start-up.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An output was selected without one of its required options.
    Missing {
        /// Short name of the output.
        output: &'static str,
        /// The option, as spelled on the command line.
        option: &'static str,
    },
    /// An option value failed validation.
    Invalid {
        /// The option, as spelled on the command line.
        option: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// No output is registered under this short name.
    UnknownOutput(String),
    /// No parser is registered under this name.
    UnknownParser(String),
    /// The parser's option string did not parse.
    ParserOptions {
        /// The parser whose grammar rejected the string.
        parser: &'static str,
        /// clap's message.
        reason: String,
    },
    /// Two outputs claim the same short name.
    DuplicateOutput(&'static str),
    /// The config file could not be read or parsed.
    File(String),
    /// The command line did not parse.
    Cli(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::Missing { output, option } => write!(
                f,
                "You must supply --{} when using '{}' as an output type.",
                option, output
            ),
            ConfigError::Invalid {
                ref option,
                ref value,
                ref reason,
            } => write!(f, "Invalid value '{}' for --{}: {}", value, option, reason),
            ConfigError::UnknownOutput(ref name) => write!(f, "Unknown output type '{}'", name),
            ConfigError::UnknownParser(ref name) => write!(f, "Unknown parser '{}'", name),
            ConfigError::ParserOptions { parser, ref reason } => {
                write!(f, "Bad options for parser '{}': {}", parser, reason)
            }
            ConfigError::DuplicateOutput(name) => {
                write!(f, "Output '{}' is registered twice", name)
            }
            ConfigError::File(ref reason) => write!(f, "Bad config file: {}", reason),
            ConfigError::Cli(ref reason) => write!(f, "{}", reason),
        }
    }
}

impl error::Error for ConfigError {
    fn description(&self) -> &str {
        "configuration error"
    }
}

/// Flat option name to value map handed to outputs at construction.
///
/// Keys are the long option names, `wavefront-proxy` and the like.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// An empty set of settings.
    pub fn new() -> Settings {
        Settings::default()
    }

    /// The value of `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Set `key`, replacing any earlier value.
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Overlay `other` on top of `self`. Keys present in both take `other`'s
    /// value.
    pub fn merge(&mut self, other: Settings) {
        for (k, v) in other.values {
            self.values.insert(k, v);
        }
    }

    /// True if nothing is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Collect every registered output option present in `matches`.
    pub fn from_matches(matches: &ArgMatches) -> Settings {
        let mut settings = Settings::new();
        for kind in output::builtin_outputs() {
            for opt in kind.options {
                if let Some(v) = matches.value_of(opt.name) {
                    settings.insert(opt.name, v);
                }
            }
        }
        settings
    }
}

/// Big configuration struct for the logster executable
///
/// Built by `parse_args` or `parse_args_from`. Not intended to be created by
/// hand outside of tests.
#[derive(Clone, Debug, PartialEq)]
pub struct Args {
    /// Name of the parser, see `parser::builtin_parsers`.
    pub parser: String,
    /// The log file to read.
    pub logfile: PathBuf,
    /// Option string handed to the parser.
    pub parser_options: Option<String>,
    /// Output short names, in submission order.
    pub outputs: Vec<String>,
    /// Format but never transmit. Offsets are not committed either.
    pub dry_run: bool,
    /// Prepended to every metric name, dot separated.
    pub metric_prefix: Option<String>,
    /// Appended to every metric name, dot separated.
    pub metric_suffix: Option<String>,
    /// Where offset state and lock files live.
    pub state_dir: PathBuf,
    /// The higher the value the chattier logster gets.
    pub verbose: u64,
    /// logster version string. This is set automatically.
    pub version: String,
    /// Output options from the config file and the command line.
    pub settings: Settings,
    /// Usage string, printed alongside configuration errors.
    pub usage: String,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            parser: String::new(),
            logfile: PathBuf::new(),
            parser_options: None,
            outputs: vec!["stdout".to_string()],
            dry_run: false,
            metric_prefix: None,
            metric_suffix: None,
            state_dir: default_state_dir(),
            verbose: 0,
            version: default_version(),
            settings: Settings::default(),
            usage: String::new(),
        }
    }
}

/// Values read from a config file. Absent keys leave the defaults alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileConfig {
    /// Output short names.
    pub outputs: Option<Vec<String>>,
    /// Option string handed to the parser.
    pub parser_options: Option<String>,
    /// Prepended to every metric name.
    pub metric_prefix: Option<String>,
    /// Appended to every metric name.
    pub metric_suffix: Option<String>,
    /// Where offsets and locks are kept.
    pub state_dir: Option<PathBuf>,
    /// Print instead of sending.
    pub dry_run: Option<bool>,
    /// Output options, keyed by long flag name.
    pub settings: Settings,
}

/// The command line grammar, including every output's options.
pub fn app() -> App<'static, 'static> {
    let mut app = App::new("logster")
        .version(VERSION.unwrap_or("unknown"))
        .about("Tail a log file, parse it into metrics and ship them")
        .arg(
            Arg::with_name("parser")
                .required(true)
                .index(1)
                .help("The parser to run, e.g. apache-access or nginx-latency."),
        )
        .arg(
            Arg::with_name("logfile")
                .required(true)
                .index(2)
                .help("The log file to read."),
        )
        .arg(
            Arg::with_name("output")
                .long("output")
                .short("o")
                .value_name("name")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Where to send metrics. May be given more than once. Defaults to stdout."),
        )
        .arg(
            Arg::with_name("parser-options")
                .long("parser-options")
                .short("p")
                .value_name("options")
                .takes_value(true)
                .allow_hyphen_values(true)
                .help("Options handed to the parser, e.g. '--start 2020-01-01'."),
        )
        .arg(
            Arg::with_name("metric-prefix")
                .long("metric-prefix")
                .value_name("prefix")
                .takes_value(true)
                .help("Prepended to every metric name."),
        )
        .arg(
            Arg::with_name("metric-suffix")
                .long("metric-suffix")
                .value_name("suffix")
                .takes_value(true)
                .help("Appended to every metric name."),
        )
        .arg(
            Arg::with_name("state-dir")
                .long("state-dir")
                .short("s")
                .value_name("dir")
                .takes_value(true)
                .help("Where to keep offset and lock files. Defaults to /var/run/logster."),
        )
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .takes_value(true)
                .help("A TOML config file to read before the command line."),
        )
        .arg(
            Arg::with_name("dry-run")
                .long("dry-run")
                .help("Print metrics instead of sending them. Offsets are not updated."),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        );
    for kind in output::builtin_outputs() {
        app = kind.add_options(app);
    }
    app
}

/// Parse the logster command line from the process arguments.
///
/// clap handles `--help`, `--version` and malformed command lines itself,
/// exiting the process.
pub fn parse_args() -> Result<Args, ConfigError> {
    let app = app();
    let matches = app.get_matches();
    args_from_matches(&matches)
}

/// Parse the logster command line from `argv`, which must include the
/// binary name. Used by tests.
pub fn parse_args_from<I, T>(argv: I) -> Result<Args, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = app()
        .get_matches_from_safe(argv)
        .map_err(|e| ConfigError::Cli(e.message))?;
    args_from_matches(&matches)
}

fn args_from_matches(matches: &ArgMatches) -> Result<Args, ConfigError> {
    let mut args = Args::default();
    args.usage = matches.usage().to_string();

    if let Some(filename) = matches.value_of("config-file") {
        let mut fp = File::open(filename)
            .map_err(|e| ConfigError::File(format!("could not open {}: {}", filename, e)))?;
        let mut buffer = String::new();
        fp.read_to_string(&mut buffer)
            .map_err(|e| ConfigError::File(format!("could not read {}: {}", filename, e)))?;
        let file = parse_config_file(&buffer)?;
        apply_file_config(&mut args, file);
    }

    args.parser = matches.value_of("parser").unwrap_or("").to_string();
    args.logfile = PathBuf::from(matches.value_of("logfile").unwrap_or(""));
    args.verbose = matches.occurrences_of("verbose");

    if let Some(outputs) = matches.values_of("output") {
        args.outputs = outputs.map(|s| s.to_string()).collect();
    }
    if let Some(opts) = matches.value_of("parser-options") {
        args.parser_options = Some(opts.to_string());
    }
    if let Some(prefix) = matches.value_of("metric-prefix") {
        args.metric_prefix = Some(prefix.to_string());
    }
    if let Some(suffix) = matches.value_of("metric-suffix") {
        args.metric_suffix = Some(suffix.to_string());
    }
    if let Some(dir) = matches.value_of("state-dir") {
        args.state_dir = PathBuf::from(dir);
    }
    if matches.is_present("dry-run") {
        args.dry_run = true;
    }
    args.settings.merge(Settings::from_matches(matches));

    for name in &args.outputs {
        if output::lookup(name).is_none() {
            return Err(ConfigError::UnknownOutput(name.clone()));
        }
    }
    Ok(args)
}

fn apply_file_config(args: &mut Args, file: FileConfig) {
    if let Some(outputs) = file.outputs {
        args.outputs = outputs;
    }
    if file.parser_options.is_some() {
        args.parser_options = file.parser_options;
    }
    if file.metric_prefix.is_some() {
        args.metric_prefix = file.metric_prefix;
    }
    if file.metric_suffix.is_some() {
        args.metric_suffix = file.metric_suffix;
    }
    if let Some(dir) = file.state_dir {
        args.state_dir = dir;
    }
    if let Some(dry_run) = file.dry_run {
        args.dry_run = dry_run;
    }
    args.settings.merge(file.settings);
}

fn scalar_to_string(v: &toml::Value) -> Option<String> {
    match *v {
        toml::Value::String(ref s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn expect_str(value: &toml::Value, key: &str) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::File(format!("{} must be a string", key)))
}

/// The option an output table key stands for. A key is the option's full
/// name, or the name with its leading `<word>-` dropped: `host` in
/// `[graphite]`, `options` in `[ganglia]`, `region` in `[cloudwatch]`.
fn option_for_key(kind: &output::OutputKind, key: &str) -> Option<&'static str> {
    kind.options
        .iter()
        .find(|opt| {
            opt.name == key || opt.name.splitn(2, '-').nth(1) == Some(key)
        })
        .map(|opt| opt.name)
}

/// Parse the logster configuration file.
///
/// Top-level keys mirror the command line: `outputs`, `parser-options`,
/// `metric-prefix`, `metric-suffix`, `state-dir` and `dry-run`. Each output's
/// options live in a table named after the output, so
///
/// ```toml
/// [wavefront]
/// proxy = "wavefront.example.com:2878"
/// ```
///
/// is the same as `--wavefront-proxy wavefront.example.com:2878`. Keys are
/// matched against the output's own options, so `[ganglia] options` sets
/// `--gmetric-options` and `[cloudwatch] region` sets `--aws-region`. An
/// unknown output table or key is an error.
pub fn parse_config_file(buffer: &str) -> Result<FileConfig, ConfigError> {
    let value: toml::Value =
        toml::from_str(buffer).map_err(|e| ConfigError::File(format!("{}", e)))?;
    let table = value
        .as_table()
        .ok_or_else(|| ConfigError::File("top level must be a table".to_string()))?;

    let mut file = FileConfig::default();
    for (key, value) in table.iter() {
        match key.as_str() {
            "outputs" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| ConfigError::File("outputs must be an array".to_string()))?;
                let mut outputs = Vec::with_capacity(arr.len());
                for o in arr {
                    outputs.push(expect_str(o, "outputs entries")?);
                }
                file.outputs = Some(outputs);
            }
            "parser-options" => file.parser_options = Some(expect_str(value, key)?),
            "metric-prefix" => file.metric_prefix = Some(expect_str(value, key)?),
            "metric-suffix" => file.metric_suffix = Some(expect_str(value, key)?),
            "state-dir" => file.state_dir = Some(PathBuf::from(expect_str(value, key)?)),
            "dry-run" => {
                file.dry_run = Some(value.as_bool().ok_or_else(|| {
                    ConfigError::File("dry-run must be a boolean".to_string())
                })?)
            }
            section => match value.as_table() {
                Some(tbl) => {
                    let kind = output::lookup(section).ok_or_else(|| {
                        ConfigError::File(format!("[{}] is not a known output", section))
                    })?;
                    for (k, v) in tbl.iter() {
                        let setting = option_for_key(&kind, k).ok_or_else(|| {
                            ConfigError::File(format!("unknown key {} in [{}]", k, section))
                        })?;
                        match scalar_to_string(v) {
                            Some(s) => file.settings.insert(setting, s),
                            None => {
                                return Err(ConfigError::File(format!(
                                    "{} must be a string, number or boolean",
                                    setting
                                )))
                            }
                        }
                    }
                }
                None => warn!("ignoring unknown config key {}", section),
            },
        }
    }
    Ok(file)
}
