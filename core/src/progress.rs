use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver};
use serde::Serialize;
use tracing::debug;

use crate::resolver::SourceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Bytes { source: SourceId, bytes: u64 },
    Warning(String),
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub downloaded: u64,
    /// Bytes received per source, indexed by [`SourceId`].
    pub per_source: Vec<u64>,
    /// Bytes per second over the last sampling window.
    pub throughput: f64,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.downloaded as f64 / self.total as f64
    }
}

/// Presentation of aggregated progress. Called only from the aggregator thread.
pub trait ProgressRenderer: Send {
    fn status(&mut self, snapshot: &ProgressSnapshot);
    fn warning(&mut self, message: &str);
    fn finish(&mut self, snapshot: &ProgressSnapshot);
}

impl<R: ProgressRenderer + ?Sized> ProgressRenderer for Box<R> {
    fn status(&mut self, snapshot: &ProgressSnapshot) {
        (**self).status(snapshot)
    }

    fn warning(&mut self, message: &str) {
        (**self).warning(message)
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        (**self).finish(snapshot)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl ProgressRenderer for NullRenderer {
    fn status(&mut self, _snapshot: &ProgressSnapshot) {}
    fn warning(&mut self, _message: &str) {}
    fn finish(&mut self, _snapshot: &ProgressSnapshot) {}
}

/// Sole owner of the download counters. Workers only ever send events.
pub struct ProgressAggregator<R> {
    snapshot: ProgressSnapshot,
    renderer: R,
    sample_interval: Duration,
    last_sample_bytes: u64,
    last_sample_at: Instant,
}

impl<R: ProgressRenderer> ProgressAggregator<R> {
    pub fn new(total: u64, sources: usize, sample_interval: Duration, renderer: R) -> Self {
        Self {
            snapshot: ProgressSnapshot {
                total,
                per_source: vec![0; sources],
                ..ProgressSnapshot::default()
            },
            renderer,
            sample_interval,
            last_sample_bytes: 0,
            last_sample_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Bytes { source, bytes } => {
                self.snapshot.downloaded += bytes;
                if let Some(count) = self.snapshot.per_source.get_mut(source) {
                    *count += bytes;
                }
            }
            ProgressEvent::Warning(message) => {
                if !message.is_empty() {
                    self.renderer.warning(&message);
                }
            }
        }
        self.renderer.status(&self.snapshot);
    }

    pub(crate) fn sample(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_sample_at);
        if elapsed.is_zero() {
            return;
        }
        let delta = self.snapshot.downloaded - self.last_sample_bytes;
        self.snapshot.throughput = delta as f64 / elapsed.as_secs_f64();
        self.last_sample_bytes = self.snapshot.downloaded;
        self.last_sample_at = now;
        self.renderer.status(&self.snapshot);
    }

    /// Consumes events until every sender is gone, then returns the totals.
    pub fn run(mut self, events: Receiver<ProgressEvent>) -> ProgressSnapshot {
        let ticker = tick(self.sample_interval);
        self.last_sample_at = Instant::now();
        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle(event),
                    Err(_) => break,
                },
                recv(ticker) -> at => {
                    if let Ok(at) = at {
                        self.sample(at);
                    }
                }
            }
        }
        debug!(downloaded = self.snapshot.downloaded, "progress stream closed");
        self.renderer.finish(&self.snapshot);
        self.snapshot
    }
}

impl<R: ProgressRenderer + 'static> ProgressAggregator<R> {
    pub fn spawn(self, events: Receiver<ProgressEvent>) -> JoinHandle<ProgressSnapshot> {
        thread::spawn(move || self.run(events))
    }
}
