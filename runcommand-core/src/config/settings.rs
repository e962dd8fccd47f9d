use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::types::{HandlerError, Result};

/// Where the script to run comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(String),
    /// Base64, optionally gzip-compressed before encoding
    Encoded(String),
    Remote(String),
}

/// Handler configuration file written by the guest agent
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandlerConfig {
    #[serde(default)]
    runtime_settings: Vec<RuntimeSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeSettings {
    handler_settings: RawHandlerSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHandlerSettings {
    #[serde(default)]
    public_settings: serde_json::Value,
    #[serde(default)]
    protected_settings: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicSettings {
    #[serde(default)]
    pub source: Option<SourceSettings>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceSettings {
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default, alias = "scriptEncoded")]
    pub encoded_script: Option<String>,
    #[serde(default)]
    pub script_uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedSettings {
    #[serde(default, rename = "sourceSASToken")]
    pub source_sas_token: Option<String>,
    #[serde(default)]
    pub source_managed_identity: Option<ManagedIdentity>,
}

/// Managed identity selector; with neither id set the host's system identity is used
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedIdentity {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
}

/// Settings for one invocation, read-only once parsed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSettings {
    pub public: PublicSettings,
    pub protected: ProtectedSettings,
}

impl HandlerSettings {
    pub fn new(public: PublicSettings, protected: ProtectedSettings) -> Self {
        Self { public, protected }
    }

    /// Settings running an inline script with no credentials
    pub fn inline(script: impl Into<String>) -> Self {
        Self::new(
            PublicSettings {
                source: Some(SourceSettings {
                    script: Some(script.into()),
                    ..SourceSettings::default()
                }),
            },
            ProtectedSettings::default(),
        )
    }

    /// Parse the first `runtimeSettings` entry of a handler configuration file
    pub fn from_config_json(json: &str) -> Result<Self> {
        let config: HandlerConfig = serde_json::from_str(json)
            .map_err(|e| HandlerError::InvalidSettings(format!("malformed configuration: {e}")))?;

        let runtime = config
            .runtime_settings
            .into_iter()
            .next()
            .ok_or_else(|| HandlerError::InvalidSettings("no runtimeSettings entry".into()))?;

        let public = parse_section(runtime.handler_settings.public_settings, "publicSettings")?;
        let protected = parse_section(runtime.handler_settings.protected_settings, "protectedSettings")?;

        Ok(Self { public, protected })
    }

    /// Validate that exactly one script source is configured
    pub fn script_source(&self) -> Result<ScriptSource> {
        let source = self
            .public
            .source
            .as_ref()
            .ok_or_else(|| HandlerError::InvalidSettings("no script source specified".into()))?;

        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        let candidates = [
            non_empty(&source.script).map(ScriptSource::Inline),
            non_empty(&source.encoded_script).map(ScriptSource::Encoded),
            non_empty(&source.script_uri).map(ScriptSource::Remote),
        ];

        let mut configured = candidates.into_iter().flatten();
        match (configured.next(), configured.next()) {
            (Some(source), None) => Ok(source),
            (None, _) => Err(HandlerError::InvalidSettings(
                "one of script, encodedScript or scriptUri must be set".into(),
            )),
            (Some(_), Some(_)) => Err(HandlerError::InvalidSettings(
                "only one of script, encodedScript or scriptUri may be set".into(),
            )),
        }
    }
}

/// Settings sections arrive either as JSON objects or as JSON-encoded strings
fn parse_section<T>(value: serde_json::Value, name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let value = match value {
        serde_json::Value::Null => return Ok(T::default()),
        serde_json::Value::String(s) if s.trim().is_empty() => return Ok(T::default()),
        serde_json::Value::String(s) => serde_json::from_str(&s)
            .map_err(|e| HandlerError::InvalidSettings(format!("{name} is not valid JSON: {e}")))?,
        other => other,
    };

    serde_json::from_value(value)
        .map_err(|e| HandlerError::InvalidSettings(format!("unexpected {name} layout: {e}")))
}
