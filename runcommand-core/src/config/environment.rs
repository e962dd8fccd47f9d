use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_DATA_ROOT, DOWNLOAD_DIR_NAME, MRSEQ_FILE_NAME};

/// Directories owned by one extension instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerEnvironment {
    pub data_dir: PathBuf,
    pub status_dir: PathBuf,
}

impl HandlerEnvironment {
    pub fn new(data_dir: impl Into<PathBuf>, status_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            status_dir: status_dir.into(),
        }
    }

    /// Default layout for an extension: `<root>/<name>` with statuses in `status/`
    pub fn for_extension(extension_name: &str) -> Self {
        let data_dir = Path::new(DEFAULT_DATA_ROOT).join(extension_name);
        let status_dir = data_dir.join("status");
        Self { data_dir, status_dir }
    }

    pub fn mrseq_path(&self) -> PathBuf {
        self.data_dir.join(MRSEQ_FILE_NAME)
    }

    /// Work directory holding the script and its captured output for one sequence number
    pub fn work_dir(&self, seq_no: u64) -> PathBuf {
        self.data_dir.join(DOWNLOAD_DIR_NAME).join(seq_no.to_string())
    }
}
