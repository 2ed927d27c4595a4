//! Crash capture and reporting for the reactor run.

use std::any::Any;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use backtrace::Backtrace;
use uuid::Uuid;

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

/// What escaped a guarded run.
#[derive(Debug)]
pub enum Caught<E> {
    Error(E),
    Panic {
        message: String,
        backtrace: Option<Backtrace>,
    },
}

/// Run `f`, catching both its error and any panic on this thread.
///
/// While `f` runs, a panic hook records the backtrace and logs the panic;
/// the previous hook is restored afterwards.
pub fn catch_crash<T, E, F>(f: F) -> Result<T, Caught<E>>
where
    F: FnOnce() -> Result<T, E>,
{
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::new();
        PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
        tracing::error!(panic = %info, "Panic during reactor run");
    }));

    let result = panic::catch_unwind(AssertUnwindSafe(f));

    let _ = panic::take_hook();
    panic::set_hook(previous);

    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Caught::Error(e)),
        Err(payload) => Err(Caught::Panic {
            message: panic_message(&*payload),
            backtrace: PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Everything written about a crashed run.
#[derive(Debug)]
pub struct CrashReport {
    pub run_id: Uuid,
    pub message: String,
    pub causes: Vec<String>,
    pub backtrace: String,
}

impl CrashReport {
    pub fn from_caught<E>(run_id: Uuid, caught: Caught<E>) -> Self
    where
        E: StdError,
    {
        match caught {
            Caught::Error(e) => {
                let mut causes = Vec::new();
                let mut source = e.source();
                while let Some(cause) = source {
                    causes.push(cause.to_string());
                    source = cause.source();
                }
                Self {
                    run_id,
                    message: e.to_string(),
                    causes,
                    backtrace: format!("{:?}", Backtrace::new()),
                }
            }
            Caught::Panic { message, backtrace } => Self {
                run_id,
                message: format!("panic: {message}"),
                causes: Vec::new(),
                backtrace: backtrace
                    .map(|bt| format!("{bt:?}"))
                    .unwrap_or_else(|| "<no backtrace captured>".to_string()),
            },
        }
    }

    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "servd crash report (run {})", self.run_id)?;
        writeln!(out, "error: {}", self.message)?;
        for cause in &self.causes {
            writeln!(out, "caused by: {cause}")?;
        }
        writeln!(out, "backtrace:\n{}", self.backtrace)?;
        writeln!(out)
    }
}

/// Where crash reports go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashSink {
    Stdout,
    /// Appended to.
    File(PathBuf),
}

impl CrashSink {
    pub fn choose(nodaemon: bool, crash_log: &std::path::Path) -> Self {
        if nodaemon {
            CrashSink::Stdout
        } else {
            CrashSink::File(crash_log.to_path_buf())
        }
    }

    /// Write and flush the report.
    pub fn write(&self, report: &CrashReport) -> io::Result<()> {
        match self {
            CrashSink::Stdout => {
                let mut out = io::stdout().lock();
                report.write_to(&mut out)?;
                out.flush()
            }
            CrashSink::File(path) => {
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                report.write_to(&mut file)?;
                file.flush()
            }
        }
    }
}

impl fmt::Display for CrashSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrashSink::Stdout => f.write_str("stdout"),
            CrashSink::File(path) => write!(f, "{}", path.display()),
        }
    }
}
