//! Produces the `Authorization` header value for the next request against a
//! cluster, refreshing exec-plugin bearer tokens as they approach expiry.
//! Grounded on `original_source/kube/auth.py` and kube-client's
//! `client/auth/mod.rs` exec-credential handling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kubescope_core::{AuthConfig, Context};
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::Mutex;

/// How long before expiry a cached token is treated as already expired, to
/// absorb clock skew between this process and the API server.
const SKEW_MARGIN: Duration = Duration::from_secs(5 * 60);

/// The credential to attach to the next request.
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    Basic { username: String, password: SecretString },
    Bearer(SecretString),
}

impl Auth {
    /// Render as an `Authorization` header value, or `None` if there's
    /// nothing to attach.
    pub fn header_value(&self) -> Option<http::HeaderValue> {
        use secrecy::ExposeSecret;
        match self {
            Auth::None => None,
            Auth::Basic { username, password } => {
                use base64::Engine;
                let raw = format!("{username}:{}", password.expose_secret());
                let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
                http::HeaderValue::from_str(&format!("Basic {encoded}")).ok()
            }
            Auth::Bearer(token) => {
                http::HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())).ok()
            }
        }
    }
}

struct AuthContainer {
    auth: Auth,
    expiry: Option<DateTime<Utc>>,
}

impl AuthContainer {
    fn needs_refresh(&self) -> bool {
        match self.expiry {
            None => false,
            Some(expiry) => Utc::now() + SKEW_MARGIN >= expiry,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthRefreshError {
    #[error("failed to start exec credential helper {command:?}: {source}")]
    Spawn { command: String, source: std::io::Error },
    #[error("exec credential helper exited with status {0}")]
    NonZeroExit(std::process::ExitStatus),
    #[error("failed to parse exec credential helper output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to parse exec credential expiry timestamp {0:?}: {1}")]
    InvalidExpiry(String, chrono::ParseError),
    #[error("exec credential helper produced no status field")]
    MissingStatus,
}

#[derive(Debug, Deserialize)]
struct ExecCredentialDoc {
    status: Option<ExecCredentialStatus>,
}

#[derive(Debug, Deserialize)]
struct ExecCredentialStatus {
    token: Option<String>,
    #[serde(rename = "expirationTimestamp")]
    expiration_timestamp: Option<String>,
}

/// Caches the last-produced [`Auth`] for a context, rebuilding it (possibly
/// by running an exec credential plugin) whenever it's empty or within
/// [`SKEW_MARGIN`] of expiring.
pub struct AuthProvider {
    auth: AuthConfig,
    container: Mutex<Option<AuthContainer>>,
}

impl AuthProvider {
    pub fn new(context: &Context) -> Self {
        Self {
            auth: context.user.auth.clone(),
            container: Mutex::new(None),
        }
    }

    /// The credential to use for the next request. Refreshes first if
    /// needed; a refresh failure is logged and yields [`Auth::None`] so the
    /// cluster loop keeps running — the next call will try again.
    pub async fn get_auth(&self) -> Auth {
        let mut guard = self.container.lock().await;

        let needs_refresh = match guard.as_ref() {
            None => true,
            Some(container) => container.needs_refresh(),
        };

        if needs_refresh {
            *guard = Some(self.build_container().await);
        }

        guard.as_ref().expect("just populated above").auth.clone()
    }

    async fn build_container(&self) -> AuthContainer {
        match &self.auth {
            AuthConfig::None => AuthContainer { auth: Auth::None, expiry: None },
            AuthConfig::Basic { username, password } => AuthContainer {
                auth: Auth::Basic {
                    username: username.clone(),
                    password: password.0.clone(),
                },
                expiry: None,
            },
            AuthConfig::ClientCertificate { .. } => {
                // Client-cert auth is carried entirely in the TLS handshake;
                // no Authorization header is attached.
                AuthContainer { auth: Auth::None, expiry: None }
            }
            AuthConfig::Exec(exec) => match run_exec_plugin(exec).await {
                Ok((token, expiry)) => AuthContainer {
                    auth: Auth::Bearer(token),
                    expiry,
                },
                Err(err) => {
                    tracing::error!(error = %err, "failed to obtain exec credentials");
                    AuthContainer { auth: Auth::None, expiry: None }
                }
            },
        }
    }
}

async fn run_exec_plugin(
    exec: &kubescope_core::ExecConfig,
) -> Result<(SecretString, Option<DateTime<Utc>>), AuthRefreshError> {
    let mut command = tokio::process::Command::new(&exec.command);
    command.args(&exec.args);
    command.envs(&exec.env);
    command.stdin(std::process::Stdio::null());
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());

    let output = command
        .output()
        .await
        .map_err(|source| AuthRefreshError::Spawn { command: exec.command.clone(), source })?;

    if !output.status.success() {
        tracing::error!(
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "exec credential helper failed"
        );
        return Err(AuthRefreshError::NonZeroExit(output.status));
    }

    let doc: ExecCredentialDoc = serde_json::from_slice(&output.stdout)?;
    let status = doc.status.ok_or(AuthRefreshError::MissingStatus)?;
    let token = status.token.unwrap_or_default();
    let expiry = status
        .expiration_timestamp
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| AuthRefreshError::InvalidExpiry(raw, e))
        })
        .transpose()?;

    Ok((SecretString::from(token), expiry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubescope_core::{Cluster, User};

    fn ctx(auth: AuthConfig) -> Context {
        Context::new("test", Cluster::new("test", "https://example.invalid"), User::new("u", auth))
    }

    #[tokio::test]
    async fn no_auth_yields_none() {
        let provider = AuthProvider::new(&ctx(AuthConfig::None));
        assert!(matches!(provider.get_auth().await, Auth::None));
    }

    #[tokio::test]
    async fn basic_auth_is_cached_forever() {
        let auth = AuthConfig::Basic {
            username: "alice".into(),
            password: "hunter2".into(),
        };
        let provider = AuthProvider::new(&ctx(auth));
        let first = provider.get_auth().await;
        let second = provider.get_auth().await;
        assert!(matches!(first, Auth::Basic { .. }));
        assert!(matches!(second, Auth::Basic { .. }));
    }
}
