use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

pub const PART_SUFFIX: &str = "part";

/// Upper bound on the number of temp files one download may create.
pub const MAX_CHUNKS: u64 = 100_000;

/// A contiguous byte range of the target file, fetched into its own temp file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    /// Inclusive, as in an HTTP `Range` header.
    pub end: u64,
    pub path: PathBuf,
    pub attempts: u32,
}

impl Chunk {
    pub fn new(index: usize, start: u64, end: u64, path: PathBuf) -> Self {
        Self {
            index,
            start,
            end,
            path,
            attempts: 0,
        }
    }

    pub fn size(&self) -> u64 {
        if self.end >= self.start {
            self.end - self.start + 1
        } else {
            0
        }
    }
}

/// Splits `[0, total_bytes)` into `chunk_size` strides; the last one is clamped
/// to `total_bytes - 1`.
pub fn plan_chunks(total_bytes: u64, chunk_size: u64, temp_dir: &Path) -> CoreResult<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(CoreError::InvalidConfig(
            "chunk size must be greater than zero".to_string(),
        ));
    }

    let count = total_bytes.div_ceil(chunk_size);
    if count > MAX_CHUNKS {
        return Err(CoreError::InvalidConfig(format!(
            "chunk size {} splits {} bytes into {} chunks (limit {}); use a larger chunk size",
            chunk_size, total_bytes, count, MAX_CHUNKS
        )));
    }
    let mut chunks = Vec::with_capacity(count as usize);
    for index in 0..count {
        let start = index * chunk_size;
        let end = start.saturating_add(chunk_size - 1).min(total_bytes - 1);
        chunks.push(Chunk::new(index as usize, start, end, temp_path(temp_dir)));
    }

    Ok(chunks)
}

fn temp_path(temp_dir: &Path) -> PathBuf {
    temp_dir.join(format!("{}.{}", Uuid::new_v4(), PART_SUFFIX))
}
