use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tokio::process::Command;

use super::{scope_to_resource, AccessToken, AuthError, IdentityEnv, TokenCredential};

const NAME: &str = "AzureCliCredential";

/// Developer sign-in through `az account get-access-token`.
pub struct AzureCliCredential {
    program: String,
    tenant_id: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    // Only newer CLI versions emit the epoch form.
    #[serde(default, rename = "expires_on")]
    expires_on: Option<i64>,
}

impl AzureCliCredential {
    pub fn from_env(env: &IdentityEnv) -> Self {
        let program = if cfg!(windows) { "az.cmd" } else { "az" };
        Self::with_program(program, env.tenant_id.clone())
    }

    pub fn with_program(program: impl Into<String>, tenant_id: Option<String>) -> Self {
        Self {
            program: program.into(),
            tenant_id,
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(scope_to_resource(scope))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(tenant) = &self.tenant_id {
            cmd.args(["--tenant", tenant]);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            // Hung CLI counts as missing.
            Err(_) => {
                return Err(AuthError::Unavailable {
                    credential: NAME,
                    reason: format!("az did not answer within {:?}", self.timeout),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::Unavailable {
                    credential: NAME,
                    reason: "Azure CLI not found on PATH".to_string(),
                })
            }
            Ok(Err(e)) => {
                return Err(AuthError::Unavailable {
                    credential: NAME,
                    reason: format!("failed to run az: {}", e),
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.contains("az login") || stderr.contains("az account set") {
                return Err(AuthError::Unavailable {
                    credential: NAME,
                    reason: "not signed in, run `az login`".to_string(),
                });
            }
            return Err(AuthError::Request {
                credential: NAME,
                reason: stderr.to_string(),
            });
        }

        let parsed: CliToken = serde_json::from_slice(&output.stdout).map_err(|e| {
            AuthError::MalformedToken(format!("unexpected az output: {}", e))
        })?;
        let expires_on = parsed.expires_on.and_then(|secs| DateTime::from_timestamp(secs, 0));
        Ok(AccessToken::new(parsed.access_token, expires_on))
    }
}
