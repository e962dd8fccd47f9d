// Run-command handler configuration constants

/// Handler name reported in status artifacts
pub const HANDLER_NAME: &str = "Microsoft.CPlat.Core.RunCommandLinux";

/// Root under which each extension instance keeps its state
pub const DEFAULT_DATA_ROOT: &str = "/var/lib/waagent-rs/run-command";

/// Most recently processed sequence number, one per extension instance
pub const MRSEQ_FILE_NAME: &str = "mrseq";

/// File name used for inline and encoded scripts
pub const SCRIPT_FILE_NAME: &str = "script.sh";

pub const STDOUT_FILE_NAME: &str = "stdout";
pub const STDERR_FILE_NAME: &str = "stderr";

/// Sub-directory of the data dir holding one work dir per sequence number
pub const DOWNLOAD_DIR_NAME: &str = "download";

/// Shell used to run the acquired script
pub const SCRIPT_SHELL: &str = "/bin/sh";

/// Instance metadata endpoint issuing managed identity tokens
pub const IDENTITY_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// API version for the identity endpoint
pub const IDENTITY_API_VERSION: &str = "2018-02-01";

/// Audience requested for blob downloads
pub const STORAGE_RESOURCE: &str = "https://storage.azure.com/";

/// Blob storage requires an explicit version for bearer authentication
pub const STORAGE_API_VERSION: &str = "2018-03-28";

/// Timeout for the identity endpoint request
pub const IDENTITY_TIMEOUT_SECS: u64 = 10;

/// Bytes of stdout/stderr included in a status message
pub const STATUS_MESSAGE_LIMIT: usize = 4096;
