//! Workload identity federation.
//!
//! The platform (AKS, GitHub Actions, ...) projects a signed token into
//! `AZURE_FEDERATED_TOKEN_FILE`. We hand that token to Entra ID as a client
//! assertion and get back a token for the requested scope.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;

use super::aad::{self, CLIENT_ASSERTION_TYPE};
use super::{AccessToken, AuthError, IdentityEnv, TokenCredential};

const NAME: &str = "WorkloadIdentityCredential";

pub struct WorkloadIdentityCredential {
    tenant_id: String,
    client_id: String,
    token_file: PathBuf,
    authority_host: String,
    http: Client,
}

impl WorkloadIdentityCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<PathBuf>,
        authority_host: impl Into<String>,
        http: Client,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            token_file: token_file.into(),
            authority_host: authority_host.into(),
            http,
        }
    }

    pub fn from_env(env: &IdentityEnv, http: Client) -> Result<Self, AuthError> {
        let missing = |var: &str| AuthError::Config(format!("workload identity requires {}", var));

        let token_file = env
            .federated_token_file
            .clone()
            .ok_or_else(|| missing("AZURE_FEDERATED_TOKEN_FILE"))?;
        let tenant_id = env.tenant_id.clone().ok_or_else(|| missing("AZURE_TENANT_ID"))?;
        let client_id = env.client_id.clone().ok_or_else(|| missing("AZURE_CLIENT_ID"))?;

        Ok(Self::new(
            tenant_id,
            client_id,
            token_file,
            env.authority_host.clone(),
            http,
        ))
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }
}

/// Read the projected token. It is rotated by the platform, so this runs on
/// every request.
pub(crate) async fn read_assertion(path: &Path) -> Result<String, AuthError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AuthError::Unavailable {
            credential: NAME,
            reason: format!("cannot read federated token file {}: {}", path.display(), e),
        })?;

    let assertion = raw.trim().to_string();
    if assertion.is_empty() {
        return Err(AuthError::MalformedToken(format!(
            "federated token file {} is empty",
            path.display()
        )));
    }
    Ok(assertion)
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let assertion = read_assertion(&self.token_file).await?;
        let url = aad::token_endpoint(&self.authority_host, &self.tenant_id);

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_assertion", assertion.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("grant_type", "client_credentials"),
            ("scope", scope),
        ];
        aad::request_token(&self.http, &url, &form, NAME).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::fake_jwt;
    use crate::identity::SQL_SCOPE;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_from_env_requires_tenant_and_client() {
        let env = IdentityEnv {
            federated_token_file: Some("/tmp/token".into()),
            client_id: Some("client".into()),
            ..IdentityEnv::default()
        };
        let err = WorkloadIdentityCredential::from_env(&env, Client::new()).err().unwrap();
        assert!(err.to_string().contains("AZURE_TENANT_ID"));
    }

    #[tokio::test]
    async fn test_exchanges_federated_token() {
        let mock_server = MockServer::start().await;
        let access = fake_jwt(r#"{"aud":"https://database.windows.net/","exp":1700000000}"#);

        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-1"))
            .and(body_string_contains("client_assertion=federated-assertion"))
            .and(body_string_contains("jwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": access,
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let file = token_file("federated-assertion\n");
        let credential = WorkloadIdentityCredential::new(
            "tenant-1",
            "client-1",
            file.path(),
            mock_server.uri(),
            Client::new(),
        );

        let token = credential.get_token(SQL_SCOPE).await.unwrap();
        assert_eq!(token.token, access);
        assert!(token.expires_on.is_some());
    }

    #[tokio::test]
    async fn test_missing_token_file_is_unavailable() {
        let credential = WorkloadIdentityCredential::new(
            "tenant-1",
            "client-1",
            "/nonexistent/azure-identity-token",
            "http://127.0.0.1:9",
            Client::new(),
        );
        let err = credential.get_token(SQL_SCOPE).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_rejected_assertion_surfaces_aad_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "AADSTS70021: No matching federated identity record found",
            })))
            .mount(&mock_server)
            .await;

        let file = token_file("federated-assertion");
        let credential = WorkloadIdentityCredential::new(
            "tenant-1",
            "client-1",
            file.path(),
            mock_server.uri(),
            Client::new(),
        );

        let err = credential.get_token(SQL_SCOPE).await.unwrap_err();
        match err {
            AuthError::Request { credential, reason } => {
                assert_eq!(credential, NAME);
                assert!(reason.contains("invalid_client"));
                assert!(reason.contains("AADSTS70021"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
