//! servd
//!
//! Runs a service application until it is told to stop.
//!
//! # Architecture Overview
//!
//! ```text
//!   argv ──▶ options ──▶ ReactorRegistry::install (before any plugin code)
//!               │
//!               ▼
//!        ApplicationRunner
//!          pre_application ──▶ create_or_get_application ──▶ start_logging
//!               │                    │                             │
//!               │            plugin / persist                 observability
//!               ▼
//!          post_application
//!            start services ──▶ shutdown triggers ──▶ Reactor::run
//!                                 (stop, then save)      plain / debug / profiled
//!                                                            │
//!                                                   crash report on failure
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use servd::options::OptionsError;
use servd::{parse_args, ApplicationRunner, ParseOutcome, PluginRegistry, ReactorRegistry, ServerHooks};

fn main() -> ExitCode {
    let plugins = Arc::new(PluginRegistry::builtin());
    let reactors = ReactorRegistry::builtin();

    let options = match parse_args(std::env::args_os(), &plugins, &reactors) {
        Ok(ParseOutcome::Run(options)) => *options,
        Ok(ParseOutcome::HelpReactors(text)) => {
            print!("{text}");
            return ExitCode::SUCCESS;
        }
        Err(OptionsError::Usage(e)) => {
            // Usage text and the message both go to stdout.
            print!("{}", e.render());
            return ExitCode::from(e.exit_code() as u8);
        }
        Err(e) => {
            eprintln!("\n{e}\n");
            return ExitCode::FAILURE;
        }
    };

    let result = ApplicationRunner::new(options, plugins, &reactors, ServerHooks)
        .and_then(ApplicationRunner::run);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_crash() => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("\n{e}\n");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
