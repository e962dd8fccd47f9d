use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::{Client, Response, StatusCode, Url};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::credentials::{append_sas_token, resolve_strategies, AuthStrategy, ImdsTokenSource, TokenSource};
use super::decoder::decode_script;
use crate::config::{HandlerSettings, ProtectedSettings, ScriptSource, SCRIPT_FILE_NAME, STORAGE_API_VERSION};
use crate::types::{HandlerError, Result};

/// Why a single download attempt did not produce a response body
#[derive(Debug)]
pub enum FetchFailure {
    Status(StatusCode),
    Transport(reqwest::Error),
    Credential(HandlerError),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Credential(e) => write!(f, "{e}"),
        }
    }
}

/// Turns a script source into a file on disk
pub struct ScriptAcquirer<T = ImdsTokenSource> {
    client: Client,
    tokens: T,
}

impl<T: TokenSource> ScriptAcquirer<T> {
    pub fn with_token_source(client: Client, tokens: T) -> Self {
        Self { client, tokens }
    }

    /// Write the configured script under `dest_dir` and return its path
    ///
    /// Nothing is left under the final name unless resolution succeeds.
    pub async fn resolve(&self, settings: &HandlerSettings, dest_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir).map_err(|e| HandlerError::filesystem(dest_dir, e))?;

        match settings.script_source()? {
            ScriptSource::Inline(script) => {
                info!(bytes = script.len(), "using inline script");
                write_atomically(dest_dir, SCRIPT_FILE_NAME, script.as_bytes())
            }
            ScriptSource::Encoded(blob) => {
                let (script, decode_info) = decode_script(&blob)?;
                info!(info = %decode_info, "decoded encoded script");
                write_atomically(dest_dir, SCRIPT_FILE_NAME, script.as_bytes())
            }
            ScriptSource::Remote(uri) => self.download(&uri, &settings.protected, dest_dir).await,
        }
    }

    async fn download(&self, uri: &str, protected: &ProtectedSettings, dest_dir: &Path) -> Result<PathBuf> {
        let file_name = file_name_from_uri(uri)?;
        let display_uri = redact(uri);

        let mut last_failure = None;
        for strategy in resolve_strategies(protected) {
            info!(uri = %display_uri, %strategy, "downloading script");
            match self.fetch(uri, &strategy).await {
                Ok(response) => {
                    let path = save_response(response, &display_uri, dest_dir, &file_name).await?;
                    info!(path = %path.display(), %strategy, "script downloaded");
                    return Ok(path);
                }
                Err(failure) => {
                    warn!(uri = %display_uri, %strategy, error = %failure, "script download attempt failed");
                    last_failure = Some(failure);
                }
            }
        }

        Err(HandlerError::Download {
            uri: display_uri,
            reason: last_failure.map_or_else(|| "no download attempted".to_string(), |f| f.to_string()),
        })
    }

    /// One authenticated GET; succeeds only on a 2xx response
    async fn fetch(&self, uri: &str, strategy: &AuthStrategy) -> std::result::Result<Response, FetchFailure> {
        let request = match strategy {
            AuthStrategy::Anonymous => self.client.get(uri),
            AuthStrategy::SasToken(token) => self.client.get(append_sas_token(uri, token)),
            AuthStrategy::ManagedIdentity(identity) => {
                let token = self
                    .tokens
                    .bearer_token(identity)
                    .await
                    .map_err(FetchFailure::Credential)?;
                self.client
                    .get(uri)
                    .bearer_auth(token)
                    .header("x-ms-version", STORAGE_API_VERSION)
            }
        };

        // reqwest errors carry the full URL, SAS signature included
        let response = request
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.without_url()))?;
        if !response.status().is_success() {
            return Err(FetchFailure::Status(response.status()));
        }
        Ok(response)
    }
}

/// Stream the body into a temp file and rename it once complete
async fn save_response(mut response: Response, uri: &str, dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let dest = dest_dir.join(file_name);
    let mut tmp = NamedTempFile::new_in(dest_dir).map_err(|e| HandlerError::filesystem(dest_dir, e))?;

    while let Some(chunk) = response.chunk().await.map_err(|e| HandlerError::Download {
        uri: uri.to_string(),
        reason: format!("reading response body: {}", e.without_url()),
    })? {
        tmp.write_all(&chunk).map_err(|e| HandlerError::filesystem(&dest, e))?;
    }

    tmp.persist(&dest).map_err(|e| HandlerError::filesystem(&dest, e.error))?;
    Ok(dest)
}

fn write_atomically(dest_dir: &Path, file_name: &str, content: &[u8]) -> Result<PathBuf> {
    let dest = dest_dir.join(file_name);
    let mut tmp = NamedTempFile::new_in(dest_dir).map_err(|e| HandlerError::filesystem(dest_dir, e))?;
    tmp.write_all(content).map_err(|e| HandlerError::filesystem(&dest, e))?;
    tmp.persist(&dest).map_err(|e| HandlerError::filesystem(&dest, e.error))?;
    Ok(dest)
}

/// Last non-empty path segment of the URI, ignoring the query string
fn file_name_from_uri(uri: &str) -> Result<String> {
    let url = Url::parse(uri).map_err(|e| HandlerError::InvalidSettings(format!("invalid scriptUri: {e}")))?;
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .filter(|name| *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| HandlerError::InvalidSettings(format!("scriptUri has no file name: {}", redact(uri))))
}

/// Drop the query string so SAS signatures never reach the logs
fn redact(uri: &str) -> String {
    uri.split('?').next().unwrap_or(uri).to_string()
}
