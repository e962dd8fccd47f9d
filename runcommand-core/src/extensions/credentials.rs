use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::{
    ManagedIdentity, ProtectedSettings, IDENTITY_API_VERSION, IDENTITY_TIMEOUT_SECS,
    STORAGE_RESOURCE,
};
use crate::types::{HandlerError, Result};

/// One way of authenticating a script download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    Anonymous,
    /// Shared access signature appended to the query string
    SasToken(String),
    /// Bearer token issued by the local identity endpoint
    ManagedIdentity(ManagedIdentity),
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::SasToken(_) => f.write_str("sas token"),
            Self::ManagedIdentity(_) => f.write_str("managed identity"),
        }
    }
}

/// Ordered list of strategies to try for a remote script
///
/// A configured SAS token goes first with the managed identity as fallback.
/// Without any credential the request is sent unauthenticated.
pub fn resolve_strategies(protected: &ProtectedSettings) -> Vec<AuthStrategy> {
    let mut strategies = Vec::with_capacity(2);

    if let Some(token) = protected.source_sas_token.as_deref().filter(|t| !t.is_empty()) {
        strategies.push(AuthStrategy::SasToken(token.to_string()));
    }
    if let Some(identity) = &protected.source_managed_identity {
        strategies.push(AuthStrategy::ManagedIdentity(identity.clone()));
    }
    if strategies.is_empty() {
        strategies.push(AuthStrategy::Anonymous);
    }

    strategies
}

/// Append a SAS token to `uri`, keeping any query the URI already carries
pub fn append_sas_token(uri: &str, token: &str) -> String {
    let token = token.trim_start_matches('?');
    if token.is_empty() {
        return uri.to_string();
    }

    let separator = match uri.find('?') {
        Some(pos) if pos + 1 == uri.len() => "",
        Some(_) => "&",
        None => "?",
    };
    format!("{uri}{separator}{token}")
}

/// Source of bearer tokens for a managed identity
pub trait TokenSource {
    fn bearer_token(&self, identity: &ManagedIdentity) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fetches tokens from the instance metadata identity endpoint
#[derive(Debug, Clone)]
pub struct ImdsTokenSource {
    client: Client,
    endpoint: String,
}

impl ImdsTokenSource {
    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn token_error(&self, reason: impl fmt::Display) -> HandlerError {
        HandlerError::Download {
            uri: self.endpoint.clone(),
            reason: format!("managed identity token request failed: {reason}"),
        }
    }
}

impl TokenSource for ImdsTokenSource {
    async fn bearer_token(&self, identity: &ManagedIdentity) -> Result<String> {
        let mut query = vec![("api-version", IDENTITY_API_VERSION), ("resource", STORAGE_RESOURCE)];
        if let Some(client_id) = identity.client_id.as_deref().filter(|id| !id.is_empty()) {
            query.push(("client_id", client_id));
        } else if let Some(object_id) = identity.object_id.as_deref().filter(|id| !id.is_empty()) {
            query.push(("object_id", object_id));
        }

        debug!(endpoint = %self.endpoint, "requesting managed identity token");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .header("Metadata", "true")
            .timeout(Duration::from_secs(IDENTITY_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| self.token_error(e))?;

        if !response.status().is_success() {
            return Err(self.token_error(format!("HTTP {}", response.status())));
        }

        let token: TokenResponse = response.json().await.map_err(|e| self.token_error(e))?;
        Ok(token.access_token)
    }
}
