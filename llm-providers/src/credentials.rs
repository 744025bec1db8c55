//! Provider credential shapes and their validation
//!
//! Raw credentials arrive as an untyped mapping tagged with a provider type.
//! [`ProviderCredentials::validate`] resolves the tag to one of the known
//! shapes and checks the mapping against it without touching the network.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{LlmError, Result};

/// Default Azure OpenAI REST API version
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAi,
    Google,
    Azure,
}

impl ProviderType {
    pub const ALL: [ProviderType; 4] = [Self::Anthropic, Self::OpenAi, Self::Google, Self::Azure];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Azure => "azure",
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
            Self::Azure => "AZURE_OPENAI_API_KEY",
        }
    }

    fn credential_fields(&self) -> &'static [FieldRule] {
        match self {
            Self::Anthropic | Self::OpenAi => API_KEY_WITH_BASE_URL_FIELDS,
            Self::Google => API_KEY_FIELDS,
            Self::Azure => AZURE_FIELDS,
        }
    }
}

const API_KEY_WITH_BASE_URL_FIELDS: &[FieldRule] = &[
    FieldRule::required("api_key"),
    FieldRule::optional_url("base_url"),
    FieldRule::optional_url("http_proxy"),
    FieldRule::optional_url("https_proxy"),
    FieldRule::optional("no_proxy"),
];

const API_KEY_FIELDS: &[FieldRule] = &[
    FieldRule::required("api_key"),
    FieldRule::optional_url("http_proxy"),
    FieldRule::optional_url("https_proxy"),
    FieldRule::optional("no_proxy"),
];

const AZURE_FIELDS: &[FieldRule] = &[
    FieldRule::required("api_key"),
    FieldRule::required_url("endpoint_url"),
    FieldRule::optional("api_version"),
    FieldRule::optional_url("http_proxy"),
    FieldRule::optional_url("https_proxy"),
    FieldRule::optional("no_proxy"),
];

impl FromStr for ProviderType {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "google" => Ok(Self::Google),
            "azure" => Ok(Self::Azure),
            _ => Err(LlmError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound proxy configuration shared by every credential shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    pub fn http_proxy(&self) -> Option<&str> {
        non_blank(&self.http_proxy)
    }

    pub fn https_proxy(&self) -> Option<&str> {
        non_blank(&self.https_proxy)
    }

    pub fn no_proxy(&self) -> Option<&str> {
        non_blank(&self.no_proxy)
    }

    pub fn is_empty(&self) -> bool {
        self.http_proxy().is_none() && self.https_proxy().is_none()
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicCredentials {
    pub api_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(flatten)]
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiCredentials {
    pub api_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(flatten)]
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub api_key: String,

    #[serde(flatten)]
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureCredentials {
    pub api_key: String,

    /// Resource endpoint, e.g. `https://<resource>.openai.azure.com`
    pub endpoint_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(flatten)]
    pub proxy: ProxySettings,
}

impl AzureCredentials {
    pub fn api_version(&self) -> &str {
        non_blank(&self.api_version).unwrap_or(DEFAULT_AZURE_API_VERSION)
    }
}

/// Validated credentials for exactly one provider type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider_type", rename_all = "lowercase")]
pub enum ProviderCredentials {
    Anthropic(AnthropicCredentials),
    OpenAi(OpenAiCredentials),
    Google(GoogleCredentials),
    Azure(AzureCredentials),
}

impl ProviderCredentials {
    /// Resolve `provider_type` and check `raw` against its credential shape.
    ///
    /// Fails with [`LlmError::UnknownProvider`] for an unrecognized tag, and
    /// with [`LlmError::Validation`] naming every missing or ill-typed field
    /// otherwise. Extra keys are ignored.
    pub fn validate(provider_type: &str, raw: &Value) -> Result<Self> {
        let kind: ProviderType = provider_type.parse()?;

        let Value::Object(fields) = raw else {
            return Err(LlmError::Validation {
                provider: kind.to_string(),
                fields: vec!["credentials: expected a mapping".to_string()],
            });
        };

        let problems: Vec<String> = kind
            .credential_fields()
            .iter()
            .filter_map(|rule| rule.check(fields))
            .collect();
        if !problems.is_empty() {
            return Err(LlmError::Validation {
                provider: kind.to_string(),
                fields: problems,
            });
        }

        Ok(match kind {
            ProviderType::Anthropic => Self::Anthropic(deserialize(kind, raw)?),
            ProviderType::OpenAi => Self::OpenAi(deserialize(kind, raw)?),
            ProviderType::Google => Self::Google(deserialize(kind, raw)?),
            ProviderType::Azure => Self::Azure(deserialize(kind, raw)?),
        })
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Anthropic(_) => ProviderType::Anthropic,
            Self::OpenAi(_) => ProviderType::OpenAi,
            Self::Google(_) => ProviderType::Google,
            Self::Azure(_) => ProviderType::Azure,
        }
    }

    pub fn proxy(&self) -> &ProxySettings {
        match self {
            Self::Anthropic(c) => &c.proxy,
            Self::OpenAi(c) => &c.proxy,
            Self::Google(c) => &c.proxy,
            Self::Azure(c) => &c.proxy,
        }
    }
}

fn deserialize<T: DeserializeOwned>(kind: ProviderType, raw: &Value) -> Result<T> {
    T::deserialize(raw).map_err(|e| LlmError::Validation {
        provider: kind.to_string(),
        fields: vec![e.to_string()],
    })
}

/// One field of a credential shape
struct FieldRule {
    name: &'static str,
    required: bool,
    url: bool,
}

impl FieldRule {
    const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            url: false,
        }
    }

    const fn required_url(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            url: true,
        }
    }

    const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            url: false,
        }
    }

    const fn optional_url(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            url: true,
        }
    }

    /// Describe what is wrong with this field, if anything
    fn check(&self, fields: &Map<String, Value>) -> Option<String> {
        let value = match fields.get(self.name) {
            None | Some(Value::Null) if self.required => {
                return Some(format!("{}: missing", self.name));
            }
            None | Some(Value::Null) => return None,
            Some(Value::String(s)) => s.trim(),
            Some(_) => return Some(format!("{}: expected a string", self.name)),
        };

        if value.is_empty() {
            return self
                .required
                .then(|| format!("{}: must not be empty", self.name));
        }

        if self.url {
            match Url::parse(value) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => {
                    return Some(format!(
                        "{}: unsupported URL scheme {}",
                        self.name,
                        url.scheme()
                    ));
                }
                Err(e) => return Some(format!("{}: invalid URL ({})", self.name, e)),
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validation_fields(err: LlmError) -> Vec<String> {
        match err {
            LlmError::Validation { fields, .. } => fields,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_provider_type() {
        assert_eq!("anthropic".parse::<ProviderType>().unwrap(), ProviderType::Anthropic);
        assert_eq!(" OpenAI ".parse::<ProviderType>().unwrap(), ProviderType::OpenAi);
        for kind in ProviderType::ALL {
            assert_eq!(kind.as_str().parse::<ProviderType>().unwrap(), kind);
        }
        assert!(matches!(
            "bow".parse::<ProviderType>(),
            Err(LlmError::UnknownProvider(ref s)) if s == "bow"
        ));
    }

    #[test]
    fn test_every_shape_requires_api_key() {
        for kind in ProviderType::ALL {
            let fields = kind.credential_fields();
            assert_eq!(fields[0].name, "api_key");
            assert!(fields[0].required);

            let required: Vec<&str> = fields
                .iter()
                .filter(|rule| rule.required)
                .map(|rule| rule.name)
                .collect();
            let expected: &[&str] = match kind {
                ProviderType::Azure => &["api_key", "endpoint_url"],
                _ => &["api_key"],
            };
            assert_eq!(required, expected);
        }
        assert!(ProviderType::Google
            .credential_fields()
            .iter()
            .all(|rule| rule.name != "base_url"));
    }

    #[test]
    fn test_unknown_provider_checked_first() {
        // The mapping would be invalid for every shape; the tag still wins.
        let err = ProviderCredentials::validate("unknown", &json!("not a map")).unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider(_)));
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let err = ProviderCredentials::validate("azure", &json!({"api_key": "k"})).unwrap_err();
        assert_eq!(validation_fields(err), vec!["endpoint_url: missing"]);
    }

    #[test]
    fn test_azure_defaults_api_version() {
        let creds = ProviderCredentials::validate(
            "azure",
            &json!({"api_key": "k", "endpoint_url": "https://res.openai.azure.com/"}),
        )
        .unwrap();
        let ProviderCredentials::Azure(azure) = creds else {
            panic!("expected azure credentials");
        };
        assert_eq!(azure.api_version(), DEFAULT_AZURE_API_VERSION);

        let azure = AzureCredentials {
            api_version: Some("2025-01-01-preview".to_string()),
            ..azure
        };
        assert_eq!(azure.api_version(), "2025-01-01-preview");
    }

    #[test]
    fn test_collects_every_problem() {
        let err = ProviderCredentials::validate(
            "openai",
            &json!({"api_key": 42, "base_url": "not a url", "http_proxy": "ftp://proxy:21"}),
        )
        .unwrap_err();
        let fields = validation_fields(err);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], "api_key: expected a string");
        assert!(fields[1].starts_with("base_url: invalid URL"));
        assert_eq!(fields[2], "http_proxy: unsupported URL scheme ftp");
    }

    #[test]
    fn test_blank_required_field() {
        let err = ProviderCredentials::validate("google", &json!({"api_key": "  "})).unwrap_err();
        assert_eq!(validation_fields(err), vec!["api_key: must not be empty"]);
    }

    #[test]
    fn test_non_mapping_rejected() {
        let err = ProviderCredentials::validate("anthropic", &json!(["api_key"])).unwrap_err();
        assert_eq!(validation_fields(err), vec!["credentials: expected a mapping"]);
    }

    #[test]
    fn test_anthropic_with_proxy() {
        let creds = ProviderCredentials::validate(
            "anthropic",
            &json!({
                "api_key": "sk-ant",
                "http_proxy": "http://proxy.local:3128",
                "https_proxy": "",
                "no_proxy": "localhost,127.0.0.1",
                "unrelated": true
            }),
        )
        .unwrap();
        assert_eq!(creds.provider_type(), ProviderType::Anthropic);
        let proxy = creds.proxy();
        assert_eq!(proxy.http_proxy(), Some("http://proxy.local:3128"));
        assert_eq!(proxy.https_proxy(), None);
        assert_eq!(proxy.no_proxy(), Some("localhost,127.0.0.1"));
        assert!(!proxy.is_empty());
    }

    #[test]
    fn test_serializes_with_tag() {
        let creds = ProviderCredentials::validate(
            "google",
            &json!({"api_key": "g-key", "https_proxy": "https://proxy:8443"}),
        )
        .unwrap();
        let value = serde_json::to_value(&creds).unwrap();
        assert_eq!(
            value,
            json!({"provider_type": "google", "api_key": "g-key", "https_proxy": "https://proxy:8443"})
        );
        let back: ProviderCredentials = serde_json::from_value(value).unwrap();
        assert_eq!(back, creds);
    }
}
