use async_trait::async_trait;
use reqwest::Client;

use super::aad;
use super::{AccessToken, AuthError, IdentityEnv, TokenCredential};

const NAME: &str = "EnvironmentCredential";

/// Service principal with a client secret taken from
/// `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`.
pub struct EnvironmentCredential {
    secret: Option<(String, String, String)>,
    authority_host: String,
    http: Client,
}

impl EnvironmentCredential {
    pub fn from_env(env: &IdentityEnv, http: Client) -> Self {
        let secret = match (&env.tenant_id, &env.client_id, &env.client_secret) {
            (Some(tenant), Some(client), Some(secret)) => {
                Some((tenant.clone(), client.clone(), secret.clone()))
            }
            _ => None,
        };
        Self {
            secret,
            authority_host: env.authority_host.clone(),
            http,
        }
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let (tenant_id, client_id, client_secret) =
            self.secret.as_ref().ok_or_else(|| AuthError::Unavailable {
                credential: NAME,
                reason: "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET are not all set"
                    .to_string(),
            })?;

        let url = aad::token_endpoint(&self.authority_host, tenant_id);
        let form = [
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", scope),
        ];
        aad::request_token(&self.http, &url, &form, NAME).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SQL_SCOPE;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_unavailable_without_secret() {
        let env = IdentityEnv {
            tenant_id: Some("tenant".into()),
            client_id: Some("client".into()),
            ..IdentityEnv::default()
        };
        let credential = EnvironmentCredential::from_env(&env, Client::new());
        let err = credential.get_token(SQL_SCOPE).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_client_secret_flow() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("client_secret=s3cret"))
            .and(body_string_contains("scope=https%3A%2F%2Fdatabase.windows.net%2F.default"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "header.payload.sig",
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let env = IdentityEnv {
            tenant_id: Some("tenant".into()),
            client_id: Some("client".into()),
            client_secret: Some("s3cret".into()),
            authority_host: mock_server.uri(),
            ..IdentityEnv::default()
        };
        let credential = EnvironmentCredential::from_env(&env, Client::new());
        let token = credential.get_token(SQL_SCOPE).await.unwrap();
        assert_eq!(token.token, "header.payload.sig");
    }
}
