//! Command-line options.
//!
//! # Responsibilities
//! - Parse the servd command line, including one sub-command per plugin
//! - Merge an optional configuration file underneath the command line
//! - Install the requested reactor immediately after parsing
//!
//! # Design Decisions
//! - The four application-source flags are mutually exclusive; clap
//!   reports the conflict as a usage error before any file is touched
//! - Reactor installation happens here, before any plugin code runs, so an
//!   unknown reactor is a usage error and nothing is installed

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, Command, FromArgMatches};
use thiserror::Error;

use crate::config::{load_config, ConfigError, ServerConfig};
use crate::observability::{LogFormat, LogSettings};
use crate::persist::Style;
use crate::plugin::{PluginRegistry, ServiceOptions};
use crate::reactor::ReactorRegistry;

/// Application file used when no source flag or sub-command is given.
pub const DEFAULT_APPLICATION_FILE: &str = "servd.tap";

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl OptionsError {
    pub fn exit_code(&self) -> i32 {
        match self {
            OptionsError::Usage(e) => e.exit_code(),
            OptionsError::Config(_) => 1,
        }
    }
}

/// Flags shared by every servd invocation.
#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Log to a specified file, - for stdout
    #[arg(short = 'l', long, value_name = "PATH")]
    pub logfile: Option<PathBuf>,

    /// Run under the profiler and write its report to this file
    #[arg(short = 'p', long, value_name = "PATH")]
    pub profile: Option<PathBuf>,

    /// Name of the profiler to use (spans, rusage)
    #[arg(long, value_name = "NAME")]
    pub profiler: Option<String>,

    /// Save the raw profiler statistics instead of a readable report
    #[arg(long)]
    pub savestats: bool,

    /// Do not save the application on shutdown
    #[arg(short = 'o', long = "no_save")]
    pub no_save: bool,

    /// The specified application file is encrypted
    #[arg(short = 'e', long)]
    pub encrypted: bool,

    /// Read the application from a binary file (default: servd.tap)
    #[arg(
        short = 'f',
        long,
        value_name = "PATH",
        conflicts_with_all = ["definition", "json", "source"]
    )]
    pub file: Option<PathBuf>,

    /// Read the application from a TOML definition file
    #[arg(short = 'y', long, value_name = "PATH", conflicts_with_all = ["json", "source"])]
    pub definition: Option<PathBuf>,

    /// Read the application from a JSON file
    #[arg(short = 'x', long, value_name = "PATH", conflicts_with = "source")]
    pub json: Option<PathBuf>,

    /// Read the application from a RON source file
    #[arg(short = 's', long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// Change to this directory before running
    #[arg(short = 'd', long, value_name = "DIR")]
    pub rundir: Option<PathBuf>,

    /// Which reactor to use (see --help-reactors)
    #[arg(short = 'r', long, value_name = "NAME")]
    pub reactor: Option<String>,

    /// Display a list of available reactors
    #[arg(long = "help-reactors")]
    pub help_reactors: bool,

    /// Run the application with the interactive debug console
    #[arg(short = 'b', long)]
    pub debug: bool,

    /// Log everything, down to trace level
    #[arg(long)]
    pub spew: bool,

    /// Don't daemonize: log to stdout and report crashes there
    #[arg(short = 'n', long)]
    pub nodaemon: bool,

    /// Deprecated, ignored
    #[arg(long = "report-profile", value_name = "EMAIL", hide = true)]
    pub report_profile: Option<String>,

    /// TOML file with defaults for these options
    #[arg(short = 'c', long, value_name = "PATH", env = "SERVD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where crash reports are appended when daemonized
    #[arg(long = "crash-log", value_name = "PATH")]
    pub crash_log: Option<PathBuf>,

    /// Log line format
    #[arg(long = "log-format", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log filter directives, e.g. "info" or "servd=debug"
    #[arg(long = "log-level", value_name = "FILTER")]
    pub log_level: Option<String>,
}

/// Where the application comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationSource {
    /// Built fresh by a plugin sub-command.
    Plugin {
        tapname: String,
        options: ServiceOptions,
    },
    /// Loaded from an application file.
    Persisted { path: PathBuf, style: Style },
}

/// Fully resolved options for one run.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub source: ApplicationSource,
    pub encrypted: bool,
    pub no_save: bool,
    pub nodaemon: bool,
    pub debug: bool,
    pub spew: bool,
    pub logfile: Option<PathBuf>,
    pub profile: Option<PathBuf>,
    pub profiler: String,
    pub savestats: bool,
    pub rundir: PathBuf,
    pub reactor: Option<String>,
    pub crash_log: PathBuf,
    pub log_format: LogFormat,
    pub log_level: String,
    pub rotate_length: u64,
    pub max_rotated_files: usize,
    pub report_profile: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let config = ServerConfig::default();
        Self {
            source: ApplicationSource::Persisted {
                path: PathBuf::from(DEFAULT_APPLICATION_FILE),
                style: Style::Binary,
            },
            encrypted: false,
            no_save: false,
            nodaemon: false,
            debug: false,
            spew: false,
            logfile: None,
            profile: None,
            profiler: config.profiling.profiler,
            savestats: config.profiling.save_stats,
            rundir: PathBuf::from(config.runner.rundir),
            reactor: None,
            crash_log: PathBuf::from(config.runner.crash_log),
            log_format: LogFormat::default(),
            log_level: config.logging.level,
            rotate_length: config.logging.rotate_length,
            max_rotated_files: config.logging.max_rotated_files,
            report_profile: None,
        }
    }
}

impl ServerOptions {
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            format: self.log_format,
            filter: self.log_level.clone(),
            ansi: self.nodaemon && std::io::stdout().is_terminal(),
        }
    }

    pub fn is_profiled(&self) -> bool {
        self.profile.is_some()
    }
}

/// What the command line asked for.
#[derive(Debug)]
pub enum ParseOutcome {
    Run(Box<ServerOptions>),
    /// `--help-reactors`: print this and exit successfully.
    HelpReactors(String),
}

/// The servd command, with one sub-command per plugin.
pub fn command(plugins: &PluginRegistry) -> Command {
    let base = Command::new("servd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run a servd application: a persisted file, a definition, or a plugin")
        .subcommand_value_name("PLUGIN")
        .subcommand_help_heading("Plugins");
    let mut command = ServerArgs::augment_args(base);
    for maker in plugins.iter() {
        command = command.subcommand(maker.command());
    }
    command
}

/// Parse `args` (program name first) into run options.
///
/// Installs the requested reactor into `reactors` on success.
pub fn parse_args<I, T>(
    args: I,
    plugins: &PluginRegistry,
    reactors: &ReactorRegistry,
) -> Result<ParseOutcome, OptionsError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut argv: Vec<OsString> = args.into_iter().map(Into::into).collect();
    if argv.len() <= 1 {
        argv.truncate(1);
        if argv.is_empty() {
            argv.push("servd".into());
        }
        argv.push("--help".into());
    }

    let mut cmd = command(plugins);
    let matches = cmd.try_get_matches_from_mut(argv)?;
    let args = ServerArgs::from_arg_matches(&matches)?;

    if args.help_reactors {
        return Ok(ParseOutcome::HelpReactors(reactors.help_text()));
    }

    let config = match &args.config {
        Some(path) => load_config(path, &reactors.short_names())?,
        None => ServerConfig::default(),
    };

    let reactor = args.reactor.clone().or_else(|| config.runner.reactor.clone());
    if let Some(name) = &reactor {
        reactors
            .install(name)
            .map_err(|e| cmd.error(ErrorKind::InvalidValue, e))?;
    }

    let plugin = matches.subcommand().and_then(|(name, sub_matches)| {
        plugins.get(name).map(|maker| ApplicationSource::Plugin {
            tapname: name.to_string(),
            options: ServiceOptions::from_matches(&maker.command(), sub_matches),
        })
    });
    let from_plugin = plugin.is_some();
    let source = plugin.unwrap_or_else(|| persisted_source(&args));

    let debug = args.debug;
    let spew = args.spew;
    let log_level = if spew {
        "trace".to_string()
    } else {
        args.log_level.clone().unwrap_or(config.logging.level)
    };

    Ok(ParseOutcome::Run(Box::new(ServerOptions {
        source,
        encrypted: args.encrypted,
        no_save: args.no_save || from_plugin || args.definition.is_some(),
        nodaemon: args.nodaemon || debug || config.runner.nodaemon,
        debug,
        spew,
        logfile: args
            .logfile
            .clone()
            .or_else(|| config.logging.file.map(PathBuf::from)),
        profile: args.profile.clone(),
        profiler: args.profiler.clone().unwrap_or(config.profiling.profiler),
        savestats: args.savestats || config.profiling.save_stats,
        rundir: args
            .rundir
            .clone()
            .unwrap_or_else(|| PathBuf::from(config.runner.rundir)),
        reactor,
        crash_log: args
            .crash_log
            .clone()
            .unwrap_or_else(|| PathBuf::from(config.runner.crash_log)),
        log_format: args
            .log_format
            .or_else(|| config.logging.format.parse().ok())
            .unwrap_or_default(),
        log_level,
        rotate_length: config.logging.rotate_length,
        max_rotated_files: config.logging.max_rotated_files,
        report_profile: args.report_profile,
    })))
}

fn persisted_source(args: &ServerArgs) -> ApplicationSource {
    let (path, style) = if let Some(path) = &args.definition {
        (path.clone(), Style::Definition)
    } else if let Some(path) = &args.json {
        (path.clone(), Style::Json)
    } else if let Some(path) = &args.source {
        (path.clone(), Style::Source)
    } else {
        let path = args
            .file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_APPLICATION_FILE));
        (path, Style::Binary)
    };
    ApplicationSource::Persisted { path, style }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ParseOutcome, OptionsError> {
        let argv = std::iter::once("servd").chain(args.iter().copied());
        parse_args(argv, &PluginRegistry::builtin(), &ReactorRegistry::builtin())
    }

    fn run_options(args: &[&str]) -> ServerOptions {
        match parse(args).unwrap() {
            ParseOutcome::Run(options) => *options,
            other => panic!("expected run options, got {other:?}"),
        }
    }

    #[test]
    fn command_definition_is_consistent() {
        command(&PluginRegistry::builtin()).debug_assert();
    }

    #[test]
    fn empty_command_line_shows_help() {
        let err = parse(&[]).unwrap_err();
        match err {
            OptionsError::Usage(e) => assert_eq!(e.kind(), ErrorKind::DisplayHelp),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn source_flags_select_style() {
        let options = run_options(&["-n", "--json", "app.tax"]);
        assert_eq!(
            options.source,
            ApplicationSource::Persisted {
                path: PathBuf::from("app.tax"),
                style: Style::Json
            }
        );
        assert!(!options.no_save);
    }

    #[test]
    fn definition_forces_no_save() {
        let options = run_options(&["-y", "app.tac"]);
        assert!(options.no_save);
    }

    #[test]
    fn spew_raises_log_level() {
        let options = run_options(&["--spew", "--log-level", "warn"]);
        assert_eq!(options.log_level, "trace");
        assert_eq!(options.log_settings().filter, "trace");
    }

    #[test]
    fn usage_errors_exit_with_two() {
        let err = parse(&["--no-such-flag"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
