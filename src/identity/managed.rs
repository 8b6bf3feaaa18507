//! Managed identity: App Service / Functions identity endpoint, or IMDS on
//! VMs and container hosts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::aad;
use super::{scope_to_resource, AccessToken, AuthError, IdentityEnv, TokenCredential};

const NAME: &str = "ManagedIdentityCredential";

// IMDS answers in milliseconds when present; anything slower means absent.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

enum Source {
    AppService { endpoint: String, header: String },
    Imds { host: String },
}

pub struct ManagedIdentityCredential {
    source: Source,
    client_id: Option<String>,
    http: Client,
}

impl ManagedIdentityCredential {
    pub fn from_env(env: &IdentityEnv, http: Client) -> Self {
        let source = match (&env.identity_endpoint, &env.identity_header) {
            (Some(endpoint), Some(header)) => Source::AppService {
                endpoint: endpoint.clone(),
                header: header.clone(),
            },
            _ => Source::Imds {
                host: env.imds_host.clone(),
            },
        };
        Self {
            source,
            client_id: env.client_id.clone(),
            http,
        }
    }

    fn request(&self, resource: &str) -> reqwest::RequestBuilder {
        let req = match &self.source {
            Source::AppService { endpoint, header } => self
                .http
                .get(endpoint)
                .query(&[("api-version", "2019-08-01"), ("resource", resource)])
                .header("X-IDENTITY-HEADER", header),
            Source::Imds { host } => self
                .http
                .get(format!(
                    "{}/metadata/identity/oauth2/token",
                    host.trim_end_matches('/')
                ))
                .query(&[("api-version", "2018-02-01"), ("resource", resource)])
                .header("Metadata", "true"),
        };

        match &self.client_id {
            Some(id) => req.query(&[("client_id", id.as_str())]),
            None => req,
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let resource = scope_to_resource(scope);
        let resp = self
            .request(resource)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable {
                credential: NAME,
                reason: format!("managed identity endpoint unreachable: {}", e),
            })?;

        // IMDS answers 400 when no identity is assigned to the host.
        if matches!(self.source, Source::Imds { .. }) && resp.status() == StatusCode::BAD_REQUEST {
            return Err(AuthError::Unavailable {
                credential: NAME,
                reason: "no managed identity is assigned to this host".to_string(),
            });
        }

        aad::parse_token_response(resp, NAME).await
    }
}
