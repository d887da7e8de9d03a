use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use md5::{Digest, Md5};
use serde::Serialize;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verification {
    Verified { checksum: String },
    /// No comparable checksum was advertised by the sources.
    Unverified,
}

pub fn md5_file(path: &Path) -> CoreResult<String> {
    let file = File::open(path)
        .map_err(|err| CoreError::Io(format!("failed to open {}: {}", path.display(), err)))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Md5::new();
    let mut buf = [0u8; 1024 * 64];
    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|err| CoreError::Io(format!("failed to read {}: {}", path.display(), err)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compares the file's MD5 against `expected`, if there is one.
pub fn verify(path: &Path, expected: Option<&str>) -> CoreResult<Verification> {
    let Some(expected) = expected else {
        return Ok(Verification::Unverified);
    };
    let actual = md5_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(Verification::Verified { checksum: actual })
    } else {
        Err(CoreError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
