use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use super::{
    AccessToken, AuthError, AzureCliCredential, EnvironmentCredential, IdentityEnv,
    InteractiveBrowserCredential, ManagedIdentityCredential, TokenCredential,
};

/// Tries credentials in order until one produces a token.
///
/// An `Unavailable` error moves on to the next source. Any other error
/// stops the chain: the credential was applicable and failed.
pub struct ChainedCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl ChainedCredential {
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }

    /// Environment secret → managed identity → Azure CLI → browser.
    pub fn default_chain(env: &IdentityEnv, http: Client) -> Self {
        let mut sources: Vec<Arc<dyn TokenCredential>> = vec![
            Arc::new(EnvironmentCredential::from_env(env, http.clone())),
            Arc::new(ManagedIdentityCredential::from_env(env, http.clone())),
            Arc::new(AzureCliCredential::from_env(env)),
        ];
        if !env.exclude_interactive_browser {
            sources.push(Arc::new(InteractiveBrowserCredential::from_env(env, http)));
        }
        Self::new(sources)
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl TokenCredential for ChainedCredential {
    fn name(&self) -> &'static str {
        "DefaultAzureCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let mut history = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    tracing::debug!(credential = source.name(), "credential chain resolved");
                    return Ok(token);
                }
                Err(e) if e.is_unavailable() => {
                    tracing::debug!(credential = source.name(), error = %e, "credential unavailable, trying next");
                    history.push(e.to_string());
                }
                Err(e) => {
                    tracing::warn!(credential = source.name(), error = %e, "credential failed, stopping chain");
                    return Err(e);
                }
            }
        }

        Err(AuthError::ChainExhausted(history))
    }
}
