use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::chunk::Chunk;
use crate::error::{CoreError, CoreResult};

/// Concatenates the chunk files into `destination` in planned order.
pub fn merge_chunks(destination: &Path, chunks: &[Chunk]) -> CoreResult<u64> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| CoreError::Io(err.to_string()))?;
        }
    }

    let out_file = File::create(destination).map_err(|err| {
        CoreError::Io(format!(
            "failed to create {}: {}",
            destination.display(),
            err
        ))
    })?;
    let mut out = BufWriter::new(out_file);
    let mut total = 0u64;

    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|chunk| chunk.start);
    for chunk in ordered {
        let mut in_file = File::open(&chunk.path).map_err(|err| {
            CoreError::Io(format!("failed to open {}: {}", chunk.path.display(), err))
        })?;
        total += io::copy(&mut in_file, &mut out).map_err(|err| {
            CoreError::Io(format!(
                "failed to append {}: {}",
                chunk.path.display(),
                err
            ))
        })?;
    }
    out.flush().map_err(|err| CoreError::Io(err.to_string()))?;

    info!(destination = %destination.display(), bytes = total, "merged chunks");
    Ok(total)
}

/// Deletes every chunk file. Missing files are fine; safe to call repeatedly.
pub fn remove_chunk_files(chunks: &[Chunk]) {
    for chunk in chunks {
        match fs::remove_file(&chunk.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => debug!(path = %chunk.path.display(), error = %err, "could not remove chunk file"),
        }
    }
}
