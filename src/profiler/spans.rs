//! Span-timing profiler.
//!
//! A `tracing-subscriber` layer installed alongside logging. While active it
//! measures, per span name, how often spans closed and how long they were
//! entered (busy time).

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::span;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::profiler::ProfilerError;
use crate::reactor::Reactor;

/// Aggregated timings for one span name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpanStats {
    pub calls: u64,
    pub busy_ns: u128,
    pub max_ns: u128,
}

/// Per-span timing, stored in the span's extensions.
#[derive(Debug, Default)]
struct Timing {
    entered_at: Option<Instant>,
    busy: Duration,
}

#[derive(Debug, Default)]
struct Shared {
    active: AtomicBool,
    stats: Mutex<BTreeMap<String, SpanStats>>,
}

/// Layer collecting [`SpanStats`]; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SpanTimingLayer {
    shared: Arc<Shared>,
}

impl SpanTimingLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self) {
        self.shared.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.shared.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Relaxed)
    }

    /// Snapshot of the collected statistics, keyed by `target::name`.
    pub fn snapshot(&self) -> BTreeMap<String, SpanStats> {
        self.shared
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, key: String, busy: Duration) {
        let busy_ns = busy.as_nanos();
        let mut stats = self
            .shared
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(key).or_default();
        entry.calls += 1;
        entry.busy_ns += busy_ns;
        entry.max_ns = entry.max_ns.max(busy_ns);
    }
}

impl<S> Layer<S> for SpanTimingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if !self.is_active() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(Timing::default());
        }
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(timing) = span.extensions_mut().get_mut::<Timing>() {
                timing.entered_at = Some(Instant::now());
            }
        }
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(timing) = span.extensions_mut().get_mut::<Timing>() {
                if let Some(entered_at) = timing.entered_at.take() {
                    timing.busy += entered_at.elapsed();
                }
            }
        }
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        if !self.is_active() {
            return;
        }
        if let Some(span) = ctx.span(&id) {
            let busy = span.extensions().get::<Timing>().map(|t| t.busy);
            if let Some(busy) = busy {
                let key = format!("{}::{}", span.metadata().target(), span.name());
                self.record(key, busy);
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct RawReport<'a> {
    profiler: &'static str,
    wall_ns: u128,
    spans: &'a BTreeMap<String, SpanStats>,
}

/// Runs the reactor with span timing enabled.
#[derive(Debug, Clone)]
pub struct SpansProfiler {
    output: PathBuf,
    save_stats: bool,
    layer: SpanTimingLayer,
}

impl SpansProfiler {
    pub fn new(output: PathBuf, save_stats: bool) -> Self {
        Self {
            output,
            save_stats,
            layer: SpanTimingLayer::new(),
        }
    }

    pub fn layer(&self) -> &SpanTimingLayer {
        &self.layer
    }

    pub fn run(&self, reactor: &Reactor) -> Result<(), ProfilerError> {
        let started = Instant::now();
        self.layer.activate();
        let result = reactor.run();
        self.layer.deactivate();
        let wall = started.elapsed();
        result?;

        let stats = self.layer.snapshot();
        self.write_report(&stats, wall)
            .map_err(|source| ProfilerError::Output {
                path: self.output.clone(),
                source,
            })?;
        tracing::info!(
            path = %self.output.display(),
            spans = stats.len(),
            "Span profile written"
        );
        Ok(())
    }

    fn write_report(&self, stats: &BTreeMap<String, SpanStats>, wall: Duration) -> std::io::Result<()> {
        if self.save_stats {
            let file = std::fs::File::create(&self.output)?;
            let report = RawReport {
                profiler: "spans",
                wall_ns: wall.as_nanos(),
                spans: stats,
            };
            let mut out = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut out, &report)?;
            return out.flush();
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.output)?;
        let mut out = BufWriter::new(file);
        write_table(&mut out, stats, wall)?;
        out.flush()
    }
}

fn write_table(out: &mut impl Write, stats: &BTreeMap<String, SpanStats>, wall: Duration) -> std::io::Result<()> {
    writeln!(out, "span profile, wall time {:.3}s", wall.as_secs_f64())?;
    writeln!(out, "{:>10} {:>14} {:>14} {:>14}  span", "calls", "busy_us", "per_call_us", "max_us")?;

    let mut rows: Vec<(&String, &SpanStats)> = stats.iter().collect();
    rows.sort_by(|a, b| b.1.busy_ns.cmp(&a.1.busy_ns));
    for (name, s) in rows {
        let per_call = s.busy_ns / u128::from(s.calls.max(1));
        writeln!(
            out,
            "{:>10} {:>14} {:>14} {:>14}  {}",
            s.calls,
            s.busy_ns / 1_000,
            per_call / 1_000,
            s.max_ns / 1_000,
            name
        )?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn spans_are_aggregated_only_while_active() {
        let layer = SpanTimingLayer::new();
        let subscriber = tracing_subscriber::registry().with(layer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info_span!("ignored").in_scope(|| {});

            layer.activate();
            for _ in 0..3 {
                tracing::info_span!("work").in_scope(|| {
                    std::thread::sleep(Duration::from_millis(1));
                });
            }
            layer.deactivate();
        });

        let stats = layer.snapshot();
        let key = format!("{}::work", module_path!());
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[&key].calls, 3);
        assert!(stats[&key].busy_ns >= 3_000_000);
        assert!(stats[&key].max_ns <= stats[&key].busy_ns);
    }

    #[test]
    fn text_report_lists_spans() {
        let mut stats = BTreeMap::new();
        stats.insert(
            "servd::net::connection".to_string(),
            SpanStats {
                calls: 2,
                busy_ns: 4_000,
                max_ns: 3_000,
            },
        );
        let mut out = Vec::new();
        write_table(&mut out, &stats, Duration::from_millis(1500)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("span profile, wall time 1.500s"));
        assert!(text.contains("servd::net::connection"));
    }
}
