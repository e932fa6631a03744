//! Input opening with transparent decompression.
//!
//! Compression is detected by file extension (.gz/.gzip → gzip,
//! .zst/.zstd → zstd) and decoded as a stream; nothing is buffered beyond
//! the read buffer.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Read buffer size for every input.
pub const READ_BUFFER_SIZE: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".gz") || path.ends_with(".gzip") {
            Compression::Gzip
        } else if path.ends_with(".zst") || path.ends_with(".zstd") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// Open `path` for reading, or stdin for `None` / `-`.
pub fn open_input(path: Option<&str>) -> Result<Box<dyn BufRead>> {
    let path = match path {
        None | Some("-") => {
            return Ok(Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                io::stdin().lock(),
            )));
        }
        Some(p) => p,
    };
    let file = File::open(Path::new(path)).with_context(|| format!("failed to open file: {path}"))?;
    let reader: Box<dyn Read> = match Compression::from_path(path) {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(file)),
        Compression::Zstd => Box::new(
            zstd::Decoder::new(file)
                .with_context(|| format!("failed to initialize zstd decoder for: {path}"))?,
        ),
    };
    Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, reader)))
}
