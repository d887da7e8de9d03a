use std::fs::File;
use std::io::{Read, Write};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::chunk::Chunk;
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::progress::ProgressEvent;
use crate::queue::TransferQueue;
use crate::resolver::Connection;
use crate::retry::Backoff;

const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub enum ChunkOutcome {
    /// The chunk's temp file holds exactly its range.
    Completed(usize),
    /// The attempt ceiling was reached; the chunk was not requeued.
    Abandoned {
        index: usize,
        attempts: u32,
        error: CoreError,
    },
}

/// Pulls chunks off the shared queue and fetches them from one source.
pub struct ChunkWorker {
    connection: Connection,
    queue: TransferQueue,
    progress: Sender<ProgressEvent>,
    outcomes: Sender<ChunkOutcome>,
    cancel: CancelToken,
    backoff: Backoff,
    max_attempts: Option<u32>,
}

impl ChunkWorker {
    pub fn new(
        connection: Connection,
        queue: TransferQueue,
        progress: Sender<ProgressEvent>,
        outcomes: Sender<ChunkOutcome>,
        cancel: CancelToken,
        config: &EngineConfig,
    ) -> Self {
        Self {
            connection,
            queue,
            progress,
            outcomes,
            cancel,
            backoff: Backoff::new(config.backoff_unit, config.backoff_ceiling_units),
            max_attempts: config.max_attempts,
        }
    }

    pub fn run(mut self) {
        let source = self.connection.id;
        while !self.cancel.is_canceled() {
            let Some(mut chunk) = self.queue.pop() else {
                break;
            };

            match self.fetch_chunk(&chunk) {
                Ok(()) => {
                    self.backoff.reset();
                    debug!(source, chunk = chunk.index, "chunk complete");
                    if self.outcomes.send(ChunkOutcome::Completed(chunk.index)).is_err() {
                        break;
                    }
                }
                Err(CoreError::Canceled) => break,
                Err(err) => {
                    chunk.attempts += 1;
                    warn!(
                        source,
                        chunk = chunk.index,
                        attempts = chunk.attempts,
                        local = err.is_local(),
                        error = %err,
                        "chunk attempt failed"
                    );
                    self.emit(ProgressEvent::Warning(format!(
                        "WARNING: chunk {} failed on {}: {}",
                        chunk.index + 1,
                        self.connection.url,
                        err
                    )));

                    if self.max_attempts.is_some_and(|max| chunk.attempts >= max) {
                        let outcome = ChunkOutcome::Abandoned {
                            index: chunk.index,
                            attempts: chunk.attempts,
                            error: err,
                        };
                        if self.outcomes.send(outcome).is_err() {
                            break;
                        }
                    } else {
                        self.queue.push(chunk);
                    }

                    let delay = self.backoff.next_delay();
                    if !self.queue.wait(delay) {
                        break;
                    }
                }
            }
        }
        debug!(source, "worker stopped");
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.progress.send(event);
    }

    fn fetch_chunk(&self, chunk: &Chunk) -> CoreResult<()> {
        let url = &self.connection.url;
        let response = self
            .connection
            .net
            .get_range(url, chunk.start, chunk.end)?;
        if !response.is_success() {
            return Err(CoreError::Network(format!(
                "request for {} failed with code {}",
                url, response.status_code
            )));
        }

        let mut file = File::create(&chunk.path).map_err(|err| {
            CoreError::Io(format!(
                "failed to create file {}: {}",
                chunk.path.display(),
                err
            ))
        })?;

        // One byte past the range is enough to tell a server that ignored it.
        let expected = chunk.size();
        let mut body = response.body.take(expected + 1);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            if self.cancel.is_canceled() {
                return Err(CoreError::Canceled);
            }
            let read = body
                .read(&mut buffer)
                .map_err(|err| CoreError::Network(format!("reading body from {}: {}", url, err)))?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read]).map_err(|err| {
                CoreError::Io(format!(
                    "failed to write to file {}: {}",
                    chunk.path.display(),
                    err
                ))
            })?;
            written += read as u64;
            self.emit(ProgressEvent::Bytes {
                source: self.connection.id,
                bytes: read as u64,
            });
        }

        if written != expected {
            return Err(CoreError::Network(format!(
                "{} sent {} bytes for range {}-{}, expected {}",
                url,
                if written > expected {
                    format!("more than {}", expected)
                } else {
                    written.to_string()
                },
                chunk.start,
                chunk.end,
                expected
            )));
        }
        Ok(())
    }
}
