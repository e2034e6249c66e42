//! Provider selection by lookup.
//!
//! The [`ProviderRegistry`] maps each [`ProviderType`] to a factory that
//! builds an adapter from a resolved [`AdapterConfig`]. Resolution of base
//! URL and credential happens here, once per generation request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parley_types::{GenerationRequest, ProviderType};

use crate::adapter::{AdapterConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, SharedAdapter};
use crate::anthropic::AnthropicAdapter;
use crate::credentials::resolve_endpoint_with;
use crate::error::{LlmError, Result};
use crate::gemini::GeminiAdapter;
use crate::openai::OpenAiAdapter;

/// Builds an adapter from its resolved configuration.
pub type AdapterFactory = Arc<dyn Fn(AdapterConfig) -> Result<SharedAdapter> + Send + Sync>;

/// Reads an environment variable.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Transport settings applied to every adapter the registry builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of adapter factories keyed by provider type.
#[derive(Clone)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderType, AdapterFactory>,
    transport: TransportSettings,
    env: EnvLookup,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.factories.keys().map(|p| p.name()).collect();
        providers.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ProviderRegistry {
    /// An empty registry reading the process environment.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            transport: TransportSettings::default(),
            env: Arc::new(|var: &str| std::env::var(var).ok()),
        }
    }

    /// A registry with the built-in adapters for every provider type.
    pub fn with_defaults() -> Self {
        let openai: AdapterFactory = Arc::new(|config: AdapterConfig| -> Result<SharedAdapter> {
            Ok(Arc::new(OpenAiAdapter::new(config)?))
        });
        let anthropic: AdapterFactory = Arc::new(|config: AdapterConfig| -> Result<SharedAdapter> {
            Ok(Arc::new(AnthropicAdapter::new(config)?))
        });
        let gemini: AdapterFactory = Arc::new(|config: AdapterConfig| -> Result<SharedAdapter> {
            Ok(Arc::new(GeminiAdapter::new(config)?))
        });

        let mut registry = Self::new();
        for provider in ProviderType::ALL {
            if provider.is_openai_compatible() {
                registry.factories.insert(provider, openai.clone());
            }
        }
        registry.factories.insert(ProviderType::Anthropic, anthropic);
        registry.factories.insert(ProviderType::Gemini, gemini);
        registry
    }

    /// Register (or replace) the factory for a provider type.
    pub fn register(&mut self, provider: ProviderType, factory: AdapterFactory) {
        self.factories.insert(provider, factory);
    }

    /// Register a factory, builder style.
    pub fn with_factory(mut self, provider: ProviderType, factory: AdapterFactory) -> Self {
        self.register(provider, factory);
        self
    }

    pub fn with_transport(mut self, transport: TransportSettings) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the environment lookup used for credential resolution.
    pub fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Arc::new(lookup);
        self
    }

    pub fn transport(&self) -> TransportSettings {
        self.transport
    }

    pub fn supports(&self, provider: ProviderType) -> bool {
        self.factories.contains_key(&provider)
    }

    /// Resolve endpoint and credential for a request.
    pub fn adapter_config(&self, request: &GenerationRequest) -> Result<AdapterConfig> {
        let env = self.env.clone();
        let endpoint = resolve_endpoint_with(request, move |var| env(var))?;

        let mut config = AdapterConfig::new(request.provider_type, endpoint.base_url)
            .with_max_retries(self.transport.max_retries)
            .with_retry_backoff(self.transport.retry_backoff)
            .with_name(request.provider_key_id());
        if let Some(timeout) = self.transport.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(secret) = endpoint.api_key {
            config = config.with_api_key(secret.value);
        }
        Ok(config)
    }

    /// Build the adapter serving a request.
    pub fn adapter_for(&self, request: &GenerationRequest) -> Result<SharedAdapter> {
        let factory = self.factories.get(&request.provider_type).ok_or_else(|| {
            LlmError::Config(format!(
                "No adapter registered for provider type '{}'",
                request.provider_type
            ))
        })?;
        let config = self.adapter_config(request)?;

        tracing::debug!(
            provider = %request.provider_type,
            name = %config.name,
            base_url = %config.base_url,
            "Building provider adapter"
        );

        factory(config)
    }
}
