//! Resource-usage profiler backed by `getrusage(2)`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::profiler::ProfilerError;
use crate::reactor::Reactor;

const BACKEND: &str = "rusage";

/// One `RUSAGE_SELF` sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub user_us: i64,
    pub system_us: i64,
    pub max_rss_kb: i64,
    pub minor_faults: i64,
    pub major_faults: i64,
    pub voluntary_switches: i64,
    pub involuntary_switches: i64,
}

impl Usage {
    /// Counters accumulated between `earlier` and `self`. Max RSS is a
    /// high-water mark and is kept as-is.
    pub fn since(&self, earlier: &Usage) -> Usage {
        Usage {
            user_us: self.user_us - earlier.user_us,
            system_us: self.system_us - earlier.system_us,
            max_rss_kb: self.max_rss_kb,
            minor_faults: self.minor_faults - earlier.minor_faults,
            major_faults: self.major_faults - earlier.major_faults,
            voluntary_switches: self.voluntary_switches - earlier.voluntary_switches,
            involuntary_switches: self.involuntary_switches - earlier.involuntary_switches,
        }
    }
}

#[cfg(unix)]
pub fn sample() -> Result<Usage, ProfilerError> {
    use nix::sys::resource::{getrusage, UsageWho};
    use nix::sys::time::TimeVal;

    fn micros(tv: TimeVal) -> i64 {
        tv.tv_sec() as i64 * 1_000_000 + tv.tv_usec() as i64
    }

    let usage = getrusage(UsageWho::RUSAGE_SELF).map_err(|e| ProfilerError::Unavailable {
        backend: BACKEND,
        reason: e.to_string(),
    })?;

    Ok(Usage {
        user_us: micros(usage.user_time()),
        system_us: micros(usage.system_time()),
        max_rss_kb: usage.max_rss() as i64,
        minor_faults: usage.minor_page_faults() as i64,
        major_faults: usage.major_page_faults() as i64,
        voluntary_switches: usage.voluntary_context_switches() as i64,
        involuntary_switches: usage.involuntary_context_switches() as i64,
    })
}

#[cfg(not(unix))]
pub fn sample() -> Result<Usage, ProfilerError> {
    Err(ProfilerError::Unavailable {
        backend: BACKEND,
        reason: "getrusage is not provided by this platform".to_string(),
    })
}

#[derive(Debug, Serialize)]
struct RawReport {
    profiler: &'static str,
    wall_us: u128,
    usage: Usage,
}

/// Runs the reactor between two resource-usage samples.
#[derive(Debug, Clone)]
pub struct RusageProfiler {
    output: PathBuf,
    save_stats: bool,
}

impl RusageProfiler {
    pub fn new(output: PathBuf, save_stats: bool) -> Self {
        Self { output, save_stats }
    }

    pub fn run(&self, reactor: &Reactor) -> Result<(), ProfilerError> {
        let before = sample()?;
        let started = Instant::now();
        reactor.run()?;
        let wall = started.elapsed();
        let usage = sample()?.since(&before);

        self.write_report(&usage, wall)
            .map_err(|source| ProfilerError::Output {
                path: self.output.clone(),
                source,
            })?;
        tracing::info!(path = %self.output.display(), "Resource usage profile written");
        Ok(())
    }

    fn write_report(&self, usage: &Usage, wall: Duration) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(&self.output)?);
        if self.save_stats {
            let report = RawReport {
                profiler: BACKEND,
                wall_us: wall.as_micros(),
                usage: *usage,
            };
            serde_json::to_writer_pretty(&mut out, &report)?;
        } else {
            write_table(&mut out, usage, wall)?;
        }
        out.flush()
    }
}

fn write_table(out: &mut impl Write, usage: &Usage, wall: Duration) -> std::io::Result<()> {
    writeln!(out, "resource usage profile")?;
    writeln!(out, "{:<24}{:.3}s", "wall time", wall.as_secs_f64())?;
    writeln!(out, "{:<24}{}us", "user time", usage.user_us)?;
    writeln!(out, "{:<24}{}us", "system time", usage.system_us)?;
    writeln!(out, "{:<24}{}kB", "max resident set", usage.max_rss_kb)?;
    writeln!(out, "{:<24}{}", "minor page faults", usage.minor_faults)?;
    writeln!(out, "{:<24}{}", "major page faults", usage.major_faults)?;
    writeln!(out, "{:<24}{}", "voluntary switches", usage.voluntary_switches)?;
    writeln!(out, "{:<24}{}", "involuntary switches", usage.involuntary_switches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_subtracts_counters_but_keeps_max_rss() {
        let before = Usage {
            user_us: 100,
            system_us: 50,
            max_rss_kb: 1_000,
            minor_faults: 10,
            ..Usage::default()
        };
        let after = Usage {
            user_us: 350,
            system_us: 60,
            max_rss_kb: 2_000,
            minor_faults: 15,
            ..Usage::default()
        };

        let delta = after.since(&before);
        assert_eq!(delta.user_us, 250);
        assert_eq!(delta.system_us, 10);
        assert_eq!(delta.max_rss_kb, 2_000);
        assert_eq!(delta.minor_faults, 5);
    }

    #[cfg(unix)]
    #[test]
    fn sampling_works_on_unix() {
        let usage = sample().unwrap();
        assert!(usage.max_rss_kb > 0);
    }

    #[test]
    fn text_report_names_every_counter() {
        let mut out = Vec::new();
        write_table(&mut out, &Usage::default(), Duration::from_secs(2)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&format!("{:<24}2.000s", "wall time")));
        assert!(text.contains("involuntary switches"));
    }
}
