//! Bounded tail reader for error logs.
//!
//! Reads backwards from the end of the file in fixed-size chunks until
//! enough line breaks have been seen, so a multi-gigabyte log costs a few
//! reads. The path is only ever opened, never passed to a shell.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const CHUNK_SIZE: u64 = 8 * 1024;

/// Upper bound on bytes read, in case the log has no line breaks.
pub const MAX_TAIL_BYTES: usize = 1024 * 1024;

/// Return the last `n` lines of the file at `path`, oldest first.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path)?;
    let mut pos = file.metadata()?.len();
    let mut buf: Vec<u8> = Vec::new();

    while pos > 0 && buf.len() < MAX_TAIL_BYTES {
        let step = CHUNK_SIZE.min(pos);
        pos -= step;

        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;

        // One more break than needed guarantees the first kept line is whole.
        if buf.iter().filter(|&&b| b == b'\n').count() > n {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    Ok(lines[skip..].iter().map(|line| line.to_string()).collect())
}
