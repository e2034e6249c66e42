//! Credential and endpoint resolution for a generation request.
//!
//! Resolution order for the API key:
//! 1. Provider-normalized environment variable (`API_KEY_<PROVIDER_ID>`)
//! 2. Provider-type fallback environment variable(s)
//! 3. Client-provided key

use parley_types::{GenerationRequest, ProviderType};

use crate::error::{LlmError, Result};

/// Result of API key resolution with provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Supplied with the request.
    ClientProvided,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ClientProvided => write!(f, "client-provided"),
        }
    }
}

/// Environment variable derived from a provider id: `my-openai` becomes
/// `API_KEY_MY_OPENAI`.
pub fn normalized_env_var(provider_id: &str) -> String {
    format!("API_KEY_{}", provider_id.to_uppercase().replace('-', "_"))
}

/// Resolve an API key through the full chain, reading variables with `lookup`.
pub fn resolve_api_key_with(
    provider_id: &str,
    provider_type: ProviderType,
    client_key: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<ResolvedSecret> {
    let normalized = normalized_env_var(provider_id);
    let candidates = std::iter::once(normalized.as_str())
        .chain(provider_type.fallback_env_vars().iter().copied());

    for var in candidates {
        if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
            return Some(ResolvedSecret {
                value,
                source: SecretSource::EnvVar(var.to_string()),
            });
        }
    }

    client_key
        .filter(|k| !k.is_empty())
        .map(|k| ResolvedSecret {
            value: k.to_string(),
            source: SecretSource::ClientProvided,
        })
}

/// Resolve an API key from the process environment.
pub fn resolve_api_key(
    provider_id: &str,
    provider_type: ProviderType,
    client_key: Option<&str>,
) -> Option<ResolvedSecret> {
    resolve_api_key_with(provider_id, provider_type, client_key, |var| {
        std::env::var(var).ok()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint
// ─────────────────────────────────────────────────────────────────────────────

/// Base URL and credential for one request.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub api_key: Option<ResolvedSecret>,
}

/// Resolve the endpoint a request will talk to.
///
/// A missing key is a configuration error, except for custom endpoints,
/// which may be anonymous.
pub fn resolve_endpoint_with(
    request: &GenerationRequest,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedEndpoint> {
    let provider_type = request.provider_type;
    let base_url = match (request.base_url.as_deref(), provider_type.default_base_url()) {
        (Some(url), _) => url.to_string(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(LlmError::Config(format!(
                "A base URL is required for {} providers",
                provider_type
            )));
        }
    };

    let api_key = resolve_api_key_with(
        request.provider_key_id(),
        provider_type,
        request.client_api_key.as_deref(),
        lookup,
    );

    match &api_key {
        Some(secret) => {
            tracing::debug!(
                provider = %provider_type,
                source = %secret.source,
                "Resolved API key"
            );
        }
        None if provider_type == ProviderType::Custom => {
            if !is_loopback_url(&base_url) {
                tracing::warn!(
                    provider = %provider_type,
                    base_url = %base_url,
                    "No API key configured for custom endpoint; sending unauthenticated requests"
                );
            }
        }
        None => {
            return Err(LlmError::Config(format!(
                "No API key found for provider '{}'. Set {} or supply a key with the request",
                request.provider_key_id(),
                normalized_env_var(request.provider_key_id())
            )));
        }
    }

    Ok(ResolvedEndpoint { base_url, api_key })
}

/// Whether a URL points at the local machine.
pub fn is_loopback_url(raw: &str) -> bool {
    let Ok(url) = url::Url::parse(raw) else {
        return false;
    };
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_normalized_env_var() {
        assert_eq!(normalized_env_var("my-openai"), "API_KEY_MY_OPENAI");
        assert_eq!(normalized_env_var("gemini"), "API_KEY_GEMINI");
    }

    #[test]
    fn test_resolution_order() {
        let lookup = env(&[
            ("API_KEY_WORK", "normalized"),
            ("OPENAI_API_KEY", "fallback"),
        ]);
        let secret =
            resolve_api_key_with("work", ProviderType::Openai, Some("client"), &lookup).unwrap();
        assert_eq!(secret.value, "normalized");
        assert_eq!(secret.source.to_string(), "env var API_KEY_WORK");

        let secret =
            resolve_api_key_with("home", ProviderType::Openai, Some("client"), &lookup).unwrap();
        assert_eq!(secret.value, "fallback");

        let secret =
            resolve_api_key_with("home", ProviderType::Anthropic, Some("client"), &lookup).unwrap();
        assert_eq!(secret.source, SecretSource::ClientProvided);

        assert!(resolve_api_key_with("home", ProviderType::Anthropic, None, &lookup).is_none());
    }

    #[test]
    fn test_siliconflow_falls_back_to_openai_key() {
        let lookup = env(&[("OPENAI_API_KEY", "sk-openai"), ("API_KEY_SILICONFLOW", "")]);
        let secret = resolve_api_key_with("siliconflow", ProviderType::Siliconflow, None, lookup)
            .unwrap();
        assert_eq!(secret.value, "sk-openai");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let req = GenerationRequest::new(ProviderType::Anthropic, "claude", vec![]);
        let err = resolve_endpoint_with(&req, env(&[])).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("API_KEY_ANTHROPIC"));
    }

    #[test]
    fn test_custom_requires_base_url_but_not_key() {
        let req = GenerationRequest::new(ProviderType::Custom, "llama", vec![]);
        assert!(resolve_endpoint_with(&req, env(&[])).unwrap_err().is_config());

        let req = req.with_base_url("http://127.0.0.1:11434/v1");
        let endpoint = resolve_endpoint_with(&req, env(&[])).unwrap();
        assert!(endpoint.api_key.is_none());
        assert_eq!(endpoint.base_url, "http://127.0.0.1:11434/v1");
    }

    #[test]
    fn test_default_base_url_and_override() {
        let lookup = env(&[("GEMINI_API_KEY", "g")]);
        let req = GenerationRequest::new(ProviderType::Gemini, "gemini-2.0-flash", vec![]);
        let endpoint = resolve_endpoint_with(&req, &lookup).unwrap();
        assert_eq!(
            endpoint.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );

        let req = req.with_base_url("http://proxy.local/v1beta");
        assert_eq!(
            resolve_endpoint_with(&req, &lookup).unwrap().base_url,
            "http://proxy.local/v1beta"
        );
    }

    #[test]
    fn test_is_loopback_url() {
        assert!(is_loopback_url("http://localhost:8080/v1"));
        assert!(is_loopback_url("http://127.0.0.1/v1"));
        assert!(is_loopback_url("http://[::1]:9000"));
        assert!(!is_loopback_url("https://api.example.com"));
        assert!(!is_loopback_url("not a url"));
    }

    #[test]
    fn test_secret_debug_redacts_value() {
        let secret = ResolvedSecret {
            value: "sk-live".to_string(),
            source: SecretSource::ClientProvided,
        };
        assert!(!format!("{:?}", secret).contains("sk-live"));
    }
}
