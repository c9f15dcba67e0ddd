//! Completed-transfer counting over the fetcher's log.

use hsperf_common::Result;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Line marker the traffic generator logs for each finished transfer.
pub const TRANSFER_COMPLETE_MARKER: &str = "transfer-complete";

/// Count completion markers in `path`. A log that does not exist yet
/// counts as zero.
pub fn count_completed_transfers(path: &Path) -> Result<u64> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    // Byte lines: a generator log may contain invalid UTF-8.
    while reader.read_until(b'\n', &mut line)? > 0 {
        if contains_marker(&line) {
            count += 1;
        }
        line.clear();
    }
    Ok(count)
}

fn contains_marker(line: &[u8]) -> bool {
    let marker = TRANSFER_COMPLETE_MARKER.as_bytes();
    line.windows(marker.len()).any(|w| w == marker)
}
