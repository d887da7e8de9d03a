pub mod cancel;
pub mod checksum;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod merge;
pub mod net;
pub mod progress;
pub mod queue;
pub mod resolver;
pub mod retry;
pub mod worker;

#[cfg(test)]
mod testing;

pub use crate::cancel::CancelToken;
pub use crate::checksum::Verification;
pub use crate::engine::{DownloadEngine, DownloadReport};
pub use crate::error::{CoreError, CoreResult};
pub use crate::progress::{ProgressRenderer, ProgressSnapshot};
pub use crate::resolver::{Attributes, Connection, SourceId};
