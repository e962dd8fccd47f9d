use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::types::{HandlerError, Result};

/// Check `current` against the persisted sequence number and record it
///
/// Returns `true` when the invocation was already processed and must be
/// skipped. The stored value is only ever replaced by a larger one, through a
/// temp file renamed over `path`.
pub fn check_and_save_seq_num(current: u64, path: &Path) -> Result<bool> {
    if let Some(stored) = read_seq_num(path)? {
        if current <= stored {
            info!(seq_no = current, mrseq = stored, "sequence number already processed, skipping");
            return Ok(true);
        }
    }

    save_seq_num(current, path)?;
    info!(seq_no = current, path = %path.display(), "saved sequence number");
    Ok(false)
}

/// Read the persisted sequence number, `None` when nothing was processed yet
pub fn read_seq_num(path: &Path) -> Result<Option<u64>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no sequence number recorded yet");
            return Ok(None);
        }
        Err(source) => {
            return Err(HandlerError::SequenceRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    content
        .trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| HandlerError::SequenceParse {
            path: path.to_path_buf(),
            content: content.trim().to_string(),
        })
}

fn save_seq_num(seq_no: u64, path: &Path) -> Result<()> {
    let persistence = |source: std::io::Error| HandlerError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(persistence)?;
    tmp.write_all(seq_no.to_string().as_bytes()).map_err(persistence)?;
    tmp.as_file().sync_all().map_err(persistence)?;
    tmp.persist(path).map_err(|e| persistence(e.error))?;
    Ok(())
}
