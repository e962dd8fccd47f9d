use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use super::lifecycle::LifecycleOperation;
use super::runner::tail_output;
use crate::config::{HANDLER_NAME, STATUS_MESSAGE_LIMIT, STDERR_FILE_NAME, STDOUT_FILE_NAME};
use crate::types::{HandlerError, InvocationOutcome, Result};
use crate::utils::get_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Error,
}

/// One entry of a `<seq>.status` file
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: f32,
    #[serde(rename = "timestampUTC")]
    pub timestamp_utc: String,
    pub status: HandlerStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerStatus {
    pub name: String,
    pub operation: String,
    pub status: StatusKind,
    pub code: i32,
    pub formatted_message: FormattedMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormattedMessage {
    pub lang: String,
    pub message: String,
}

impl StatusReport {
    pub fn new(op: LifecycleOperation, status: StatusKind, code: i32, message: impl Into<String>) -> Self {
        Self {
            version: 1.0,
            timestamp_utc: get_timestamp(),
            status: HandlerStatus {
                name: HANDLER_NAME.to_string(),
                operation: op.name().to_string(),
                status,
                code,
                formatted_message: FormattedMessage {
                    lang: "en-US".to_string(),
                    message: message.into(),
                },
            },
        }
    }

    /// Build the status for an invocation; `work_dir` supplies captured output when present
    pub fn from_outcome(
        op: LifecycleOperation,
        outcome: &Result<InvocationOutcome>,
        work_dir: Option<&Path>,
    ) -> Self {
        let output = work_dir.map(captured_output).unwrap_or_default();
        match outcome {
            Ok(_) => Self::new(op, StatusKind::Success, 0, format!("{op} succeeded{output}")),
            Err(e) => Self::new(op, StatusKind::Error, 1, format!("{op} failed: {e}{output}")),
        }
    }

    /// Write `<status_dir>/<seq_no>.status`, replacing any previous file atomically
    pub fn write_to(&self, status_dir: &Path, seq_no: u64) -> Result<PathBuf> {
        std::fs::create_dir_all(status_dir).map_err(|e| HandlerError::filesystem(status_dir, e))?;
        let path = status_dir.join(format!("{seq_no}.status"));

        let body = serde_json::to_vec_pretty(&[self])
            .map_err(|e| HandlerError::filesystem(&path, std::io::Error::other(e)))?;
        let mut tmp = NamedTempFile::new_in(status_dir).map_err(|e| HandlerError::filesystem(status_dir, e))?;
        tmp.write_all(&body).map_err(|e| HandlerError::filesystem(&path, e))?;
        tmp.persist(&path).map_err(|e| HandlerError::filesystem(&path, e.error))?;
        Ok(path)
    }
}

fn captured_output(work_dir: &Path) -> String {
    let stdout = tail_output(&work_dir.join(STDOUT_FILE_NAME), STATUS_MESSAGE_LIMIT);
    let stderr = tail_output(&work_dir.join(STDERR_FILE_NAME), STATUS_MESSAGE_LIMIT);
    if stdout.is_empty() && stderr.is_empty() {
        return String::new();
    }
    format!("\n\n[stdout]\n{stdout}\n[stderr]\n{stderr}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn success_status_includes_output() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("stdout"), "hello\n").unwrap();
        std::fs::write(dir.path().join("stderr"), "").unwrap();

        let report = StatusReport::from_outcome(
            LifecycleOperation::Enable,
            &Ok(InvocationOutcome::Completed(None)),
            Some(dir.path()),
        );

        assert_eq!(report.status.status, StatusKind::Success);
        assert_eq!(report.status.code, 0);
        assert!(report.status.formatted_message.message.contains("[stdout]\nhello\n"));
    }

    #[test]
    fn every_successful_outcome_reports_success() {
        let report = StatusReport::from_outcome(
            LifecycleOperation::Enable,
            &Ok(InvocationOutcome::Skipped { seq_no: 4 }),
            None,
        );

        assert_eq!(report.status.status, StatusKind::Success);
        assert_eq!(report.status.formatted_message.message, "enable succeeded");
    }

    #[test]
    fn error_status_carries_error_message() {
        let outcome = Err(HandlerError::Execution("exit status: 127".into()));
        let report = StatusReport::from_outcome(LifecycleOperation::Enable, &outcome, None);

        assert_eq!(report.status.status, StatusKind::Error);
        assert_eq!(report.status.code, 1);
        assert_eq!(
            report.status.formatted_message.message,
            "enable failed: failed to execute command: exit status: 127"
        );
    }

    #[test]
    fn writes_status_file_as_json_array() {
        let dir = tempdir().expect("tempdir");
        let report = StatusReport::new(LifecycleOperation::Disable, StatusKind::Success, 0, "done");

        let path = report.write_to(&dir.path().join("status"), 3).expect("write");
        assert_eq!(path, dir.path().join("status").join("3.status"));

        let parsed: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let entry = &parsed[0];
        assert_eq!(entry["version"], 1.0);
        assert!(entry["timestampUTC"].as_str().unwrap().ends_with('Z'));
        assert_eq!(entry["status"]["operation"], "disable");
        assert_eq!(entry["status"]["status"], "success");
        assert_eq!(entry["status"]["formattedMessage"]["lang"], "en-US");
        assert_eq!(entry["status"]["formattedMessage"]["message"], "done");
    }
}
