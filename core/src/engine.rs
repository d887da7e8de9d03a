use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError};
use serde::Serialize;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::checksum::{verify, Verification};
use crate::chunk::{plan_chunks, Chunk};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::merge::{merge_chunks, remove_chunk_files};
use crate::net::{NetClient, ReqwestNetClient};
use crate::progress::{ProgressAggregator, ProgressRenderer, ProgressSnapshot};
use crate::queue::TransferQueue;
use crate::resolver::{resolve_sources, Attributes, RejectedSource};
use crate::worker::{ChunkOutcome, ChunkWorker};

const CANCEL_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub url: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub destination: PathBuf,
    pub size: u64,
    pub chunks: usize,
    pub sources: Vec<SourceReport>,
    pub rejected: Vec<RejectedSource>,
    pub verification: Verification,
    pub elapsed_secs: f64,
}

pub struct DownloadEngine {
    pub config: EngineConfig,
    net: Arc<dyn NetClient>,
    cancel: CancelToken,
}

impl DownloadEngine {
    pub fn new(config: EngineConfig) -> CoreResult<Self> {
        config.validate()?;
        let net = ReqwestNetClient::new(&config)?;
        Ok(Self {
            config,
            net: Arc::new(net),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_net_client(mut self, net: Arc<dyn NetClient>) -> Self {
        self.net = net;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn resolve(&self, urls: &[String]) -> CoreResult<Attributes> {
        resolve_sources(urls, Arc::clone(&self.net), &self.cancel)
    }

    /// Resolves the sources, then downloads, merges and verifies.
    pub fn run<R>(&self, urls: &[String], destination: &Path, renderer: R) -> CoreResult<DownloadReport>
    where
        R: ProgressRenderer + 'static,
    {
        let attributes = self.resolve(urls)?;
        self.download(&attributes, destination, renderer)
    }

    pub fn plan(&self, attributes: &Attributes, destination: &Path) -> CoreResult<Vec<Chunk>> {
        let temp_dir = match &self.config.temp_dir {
            Some(dir) => dir.clone(),
            None => destination
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        plan_chunks(attributes.size, self.config.chunk_size, &temp_dir)
    }

    /// Fetches every chunk, merges into `destination` and checks the result.
    /// Chunk files are removed whatever the outcome.
    pub fn download<R>(
        &self,
        attributes: &Attributes,
        destination: &Path,
        renderer: R,
    ) -> CoreResult<DownloadReport>
    where
        R: ProgressRenderer + 'static,
    {
        if attributes.connections.is_empty() {
            return Err(CoreError::NoSources);
        }
        let started = Instant::now();
        let chunks = self.plan(attributes, destination)?;
        if let Some(dir) = chunks.first().and_then(|chunk| chunk.path.parent()) {
            std::fs::create_dir_all(dir).map_err(|err| CoreError::Io(err.to_string()))?;
        }

        let merged = self
            .fetch(&chunks, attributes, renderer)
            .and_then(|snapshot| merge_chunks(destination, &chunks).map(|_| snapshot));
        remove_chunk_files(&chunks);
        let snapshot = merged?;

        let verification = verify(destination, attributes.checksum.as_deref())?;
        let sources = attributes
            .connections
            .iter()
            .map(|connection| SourceReport {
                url: connection.url.clone(),
                bytes: snapshot
                    .per_source
                    .get(connection.id)
                    .copied()
                    .unwrap_or(0),
            })
            .collect();

        Ok(DownloadReport {
            destination: destination.to_path_buf(),
            size: attributes.size,
            chunks: chunks.len(),
            sources,
            rejected: attributes.rejected.clone(),
            verification,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Runs one worker per connection plus the aggregator until every chunk
    /// has reported completion, then shuts the pool down.
    pub fn fetch<R>(
        &self,
        chunks: &[Chunk],
        attributes: &Attributes,
        renderer: R,
    ) -> CoreResult<ProgressSnapshot>
    where
        R: ProgressRenderer + 'static,
    {
        info!(
            chunks = chunks.len(),
            workers = attributes.connections.len(),
            "starting transfer"
        );
        let (queue, closer) = TransferQueue::new();
        for chunk in chunks {
            queue.push(chunk.clone());
        }

        let (progress_tx, progress_rx) = bounded(0);
        let (outcome_tx, outcome_rx) = unbounded();
        let aggregator = ProgressAggregator::new(
            attributes.size,
            attributes.connections.len(),
            self.config.sample_interval,
            renderer,
        )
        .spawn(progress_rx);

        let workers: Vec<_> = attributes
            .connections
            .iter()
            .map(|connection| {
                let worker = ChunkWorker::new(
                    connection.clone(),
                    queue.clone(),
                    progress_tx.clone(),
                    outcome_tx.clone(),
                    self.cancel.clone(),
                    &self.config,
                );
                thread::spawn(move || worker.run())
            })
            .collect();
        drop(outcome_tx);
        drop(queue);

        let barrier = self.await_completion(chunks.len(), &outcome_rx);

        closer.close();
        for worker in workers {
            if worker.join().is_err() {
                debug!("worker thread panicked");
            }
        }
        drop(progress_tx);
        let snapshot = aggregator.join().unwrap_or_else(|_| {
            debug!("progress thread panicked");
            ProgressSnapshot::default()
        });

        barrier?;
        info!(downloaded = snapshot.downloaded, "transfer complete");
        Ok(snapshot)
    }

    /// Counts completion tokens until there is one per chunk.
    fn await_completion(&self, expected: usize, outcomes: &Receiver<ChunkOutcome>) -> CoreResult<()> {
        let mut completed = 0usize;
        while completed < expected {
            if self.cancel.is_canceled() {
                return Err(CoreError::Canceled);
            }
            match outcomes.recv_timeout(CANCEL_POLL) {
                Ok(ChunkOutcome::Completed(index)) => {
                    completed += 1;
                    debug!(chunk = index, completed, expected, "completion token");
                }
                Ok(ChunkOutcome::Abandoned {
                    index,
                    attempts,
                    error,
                }) => {
                    return Err(CoreError::ChunkAbandoned {
                        index,
                        attempts,
                        reason: error.to_string(),
                    });
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if self.cancel.is_canceled() {
                        return Err(CoreError::Canceled);
                    }
                    return Err(CoreError::Network(format!(
                        "all workers stopped after {} of {} chunks",
                        completed, expected
                    )));
                }
            }
        }
        Ok(())
    }
}
