//! Interactive console opened on SIGINT/SIGUSR2 during `--debug` runs.

use std::fmt;
use std::io;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::lifecycle::Signal;
use crate::reactor::{InterruptHandler, Interruption, ReactorType};
use crate::service::SharedApplication;

const HELP: &str = "\
Commands:
  c, continue   resume the reactor
  stop          resume, then shut the reactor down cleanly
  q, quit       exit the process immediately
  s, services   list the application's services
  r, reactor    describe the running reactor
  h, help       show this help
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Continue,
    Stop,
    Quit,
    Services,
    Reactor,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown command: {}", self.0)
    }
}

impl FromStr for ConsoleCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "c" | "continue" => Ok(ConsoleCommand::Continue),
            "stop" => Ok(ConsoleCommand::Stop),
            "q" | "quit" => Ok(ConsoleCommand::Quit),
            "s" | "services" => Ok(ConsoleCommand::Services),
            "r" | "reactor" => Ok(ConsoleCommand::Reactor),
            "h" | "help" | "?" => Ok(ConsoleCommand::Help),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// How a console session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Resume,
    Shutdown,
    Quit,
}

/// Line-oriented debug console over any async reader/writer pair.
pub struct DebugConsole<R, W> {
    app: SharedApplication,
    input: R,
    output: W,
}

impl DebugConsole<BufReader<Stdin>, Stdout> {
    /// Console on the process's stdin/stdout.
    pub fn stdio(app: SharedApplication) -> Self {
        Self::new(app, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> DebugConsole<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(app: SharedApplication, input: R, output: W) -> Self {
        Self { app, input, output }
    }

    /// Run one console session until the user resumes, stops or quits.
    ///
    /// End of input resumes the reactor.
    pub async fn interact(&mut self, signal: Signal, reactor: ReactorType) -> io::Result<SessionEnd> {
        self.output
            .write_all(format!("\n*** {signal} received; servd debug console, h for help ***\n").as_bytes())
            .await?;

        loop {
            self.output.write_all(b"(servd) ").await?;
            self.output.flush().await?;

            let mut line = String::new();
            if self.input.read_line(&mut line).await? == 0 {
                return Ok(SessionEnd::Resume);
            }

            let reply = match line.parse::<ConsoleCommand>() {
                Ok(ConsoleCommand::Continue) => return Ok(SessionEnd::Resume),
                Ok(ConsoleCommand::Stop) => return Ok(SessionEnd::Shutdown),
                Ok(ConsoleCommand::Quit) => return Ok(SessionEnd::Quit),
                Ok(ConsoleCommand::Services) => describe_services(&self.app).await,
                Ok(ConsoleCommand::Reactor) => {
                    format!("reactor: {} ({})\n", reactor.short_name, reactor.description)
                }
                Ok(ConsoleCommand::Help) => HELP.to_string(),
                Err(unknown) => format!("{unknown}\n{HELP}"),
            };
            self.output.write_all(reply.as_bytes()).await?;
        }
    }
}

async fn describe_services(app: &SharedApplication) -> String {
    let app = app.lock().await;
    let mut out = format!("application: {}\n", app.name());
    for service in app.services() {
        let state = if service.is_running() { "running" } else { "stopped" };
        out.push_str(&format!("  {:<24}{}\n", service.name(), state));
    }
    out
}

#[async_trait]
impl<R, W> InterruptHandler for DebugConsole<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn watches_user_signal(&self) -> bool {
        true
    }

    async fn interrupted(&mut self, signal: Signal, reactor: ReactorType) -> Interruption {
        if signal == Signal::Terminate {
            return Interruption::Shutdown;
        }

        match self.interact(signal, reactor).await {
            Ok(SessionEnd::Resume) => {
                tracing::info!("Debug console resumed the reactor");
                Interruption::Resume
            }
            Ok(SessionEnd::Shutdown) => Interruption::Shutdown,
            Ok(SessionEnd::Quit) => {
                tracing::warn!("Debug console quit; exiting immediately");
                std::process::exit(0);
            }
            Err(e) => {
                tracing::error!(error = %e, "Debug console failed; shutting down");
                Interruption::Shutdown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::EchoMaker;
    use crate::plugin::{ServiceMaker, ServiceOptions};
    use crate::reactor::ReactorRegistry;
    use crate::service::Application;

    fn shared_app() -> SharedApplication {
        let mut app = Application::new("demo");
        app.add_service(EchoMaker.make_service(&ServiceOptions::new()).unwrap())
            .unwrap();
        app.into_shared()
    }

    fn reactor_type() -> ReactorType {
        ReactorRegistry::builtin().lookup("ct").unwrap()
    }

    async fn session(input: &str) -> (SessionEnd, String) {
        let mut output = Vec::new();
        let end = {
            let mut console = DebugConsole::new(shared_app(), input.as_bytes(), &mut output);
            console.interact(Signal::User2, reactor_type()).await.unwrap()
        };
        (end, String::from_utf8(output).unwrap())
    }

    #[test]
    fn commands_parse_with_aliases() {
        assert_eq!("".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Continue);
        assert_eq!(" s \n".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Services);
        assert_eq!("quit".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Quit);
        assert!("launch".parse::<ConsoleCommand>().is_err());
    }

    #[tokio::test]
    async fn services_then_continue() {
        let (end, output) = session("services\ncontinue\n").await;
        assert_eq!(end, SessionEnd::Resume);
        assert!(output.contains("SIGUSR2 received"));
        assert!(output.contains("application: demo"));
        assert!(output.contains("echo"));
        assert!(output.contains("stopped"));
    }

    #[tokio::test]
    async fn stop_requests_shutdown() {
        let (end, output) = session("r\nstop\n").await;
        assert_eq!(end, SessionEnd::Shutdown);
        assert!(output.contains("reactor: ct"));
    }

    #[tokio::test]
    async fn unknown_command_prints_help_and_eof_resumes() {
        let (end, output) = session("frobnicate\n").await;
        assert_eq!(end, SessionEnd::Resume);
        assert!(output.contains("Unknown command: frobnicate"));
        assert!(output.contains("q, quit"));
    }

    #[tokio::test]
    async fn terminate_shuts_down_without_opening_the_console() {
        let mut output = Vec::new();
        let mut console = DebugConsole::new(shared_app(), "continue\n".as_bytes(), &mut output);
        let decision = console.interrupted(Signal::Terminate, reactor_type()).await;
        drop(console);

        assert_eq!(decision, Interruption::Shutdown);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn user_signal_opens_console_and_continue_resumes() {
        let mut output = Vec::new();
        let mut console = DebugConsole::new(shared_app(), "s\ncontinue\n".as_bytes(), &mut output);
        let decision = console.interrupted(Signal::User2, reactor_type()).await;
        drop(console);

        assert_eq!(decision, Interruption::Resume);
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("SIGUSR2 received"));
        assert!(text.contains("application: demo"));
    }

    #[tokio::test]
    async fn stop_from_interrupt_shuts_down() {
        let mut output = Vec::new();
        let mut console = DebugConsole::new(shared_app(), "stop\n".as_bytes(), &mut output);
        assert_eq!(
            console.interrupted(Signal::Interrupt, reactor_type()).await,
            Interruption::Shutdown
        );
    }

    #[tokio::test]
    async fn quit_is_reported_not_executed_by_interact() {
        let (end, _) = session("q\n").await;
        assert_eq!(end, SessionEnd::Quit);
    }
}
