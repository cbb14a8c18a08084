//! MD5 integrity verification (component C1).

use std::{
    fs::File,
    io::Read,
    path::Path,
};

use md5::{Digest, Md5};

use crate::constants::VERIFY_BUFFER_SIZE;
use crate::error::VerifyError;

/// Streams `path` through MD5 in fixed-size chunks and returns the lowercase
/// hex digest.
pub fn md5_of_file(path: &Path) -> Result<String, VerifyError> {
    let mut file = File::open(path).map_err(|source| VerifyError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Md5::new();
    let mut buf = vec![0u8; VERIFY_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|source| VerifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verifies `path`'s MD5 digest against `expected_hex`, which must already be
/// a 32-character lowercase hex string (callers normalize before calling).
pub fn verify(path: &Path, expected_hex: &str) -> Result<(), VerifyError> {
    if expected_hex.len() != 32 || !expected_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(VerifyError::InvalidHashFormat(expected_hex.to_string()));
    }
    let expected = expected_hex.to_ascii_lowercase();

    let actual = md5_of_file(path)?;
    if actual != expected {
        return Err(VerifyError::Mismatch { expected, actual });
    }
    Ok(())
}
