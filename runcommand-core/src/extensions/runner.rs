use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::Command;

use tracing::{info, warn};

use crate::config::{SCRIPT_SHELL, STDERR_FILE_NAME, STDOUT_FILE_NAME};
use crate::types::{ExecutionResult, HandlerError, Result};

/// Run `script` with `/bin/sh` inside `work_dir`, capturing output to `stdout`/`stderr`
///
/// The capture files are created before the child starts, so they exist
/// whatever the outcome. Only a zero exit status counts as success.
pub fn run_script(script: &Path, work_dir: &Path) -> Result<ExecutionResult> {
    let stdout_path = work_dir.join(STDOUT_FILE_NAME);
    let stderr_path = work_dir.join(STDERR_FILE_NAME);
    let stdout_file = File::create(&stdout_path).map_err(|e| HandlerError::filesystem(&stdout_path, e))?;
    let stderr_file = File::create(&stderr_path).map_err(|e| HandlerError::filesystem(&stderr_path, e))?;

    info!(script = %script.display(), work_dir = %work_dir.display(), "executing script");
    let status = Command::new(SCRIPT_SHELL)
        .arg(script)
        .current_dir(work_dir)
        .stdout(stdout_file)
        .stderr(stderr_file)
        .status()
        .map_err(|e| HandlerError::Execution(format!("could not start {SCRIPT_SHELL}: {e}")))?;

    let exit_code = status.code().unwrap_or(-1);
    if !status.success() {
        warn!(exit_code, "script failed");
        return Err(HandlerError::Execution(format!("{status}")));
    }

    info!(exit_code, "script completed");
    Ok(ExecutionResult {
        exit_code,
        stdout_path,
        stderr_path,
    })
}

/// Last `limit` bytes of a capture file, empty when the file is missing
pub fn tail_output(path: &Path, limit: usize) -> String {
    let Ok(mut file) = File::open(path) else {
        return String::new();
    };

    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    let limit = limit as u64;
    let truncated = len > limit;
    if truncated && file.seek(SeekFrom::Start(len - limit)).is_err() {
        return String::new();
    }

    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).is_err() {
        return String::new();
    }

    let text = String::from_utf8_lossy(&buf);
    if truncated {
        format!("(truncated)... {text}")
    } else {
        text.into_owned()
    }
}
