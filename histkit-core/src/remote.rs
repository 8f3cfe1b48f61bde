//! Remote synchronization: pushing the current branch and mirroring the
//! shared branch from the server.

use std::sync::{Arc, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::engine::{CheckoutOptions, FetchOptions, PushOptions, PushResult};
use crate::error::{HistoryError, Result};
use crate::history::GitHistory;
use crate::transport::{AuthCallback, Headers};

/// In-memory username/password pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// `Basic <base64(username:password)>`
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

impl GitHistory {
    /// Replace the credentials used for remote requests
    pub fn set_remote_credentials(&self, username: impl Into<String>, password: impl Into<String>) {
        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
    }

    /// Callback injecting a Basic `Authorization` header into every request
    pub fn auth_callback(&self) -> AuthCallback {
        let credentials = self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Arc::new(move |url: &str| {
            let mut headers = Headers::new();
            if let Some(c) = &credentials {
                tracing::trace!("Authenticating request to {} as {}", url, c.username);
                headers.insert(
                    "authorization".to_string(),
                    basic_auth_header(&c.username, &c.password),
                );
            }
            headers
        })
    }

    async fn require_remote_url(&self) -> Result<String> {
        self.get_remote_server_url()
            .await?
            .ok_or_else(|| HistoryError::NoRemoteConfigured(self.settings().remote_name.clone()))
    }

    /// Push the current branch to the branch of the same name on the remote
    pub async fn send_to_remote(&self) -> Result<PushResult> {
        let url = self.require_remote_url().await?;
        let ctx = self.context();
        let branch = self
            .engine()
            .current_branch(ctx)
            .await?
            .unwrap_or_else(|| self.working_branch().to_string());

        tracing::debug!("Pushing {} to {}", branch, url);
        let result = self
            .engine()
            .push(
                ctx,
                self.transport.as_ref(),
                PushOptions {
                    url: url.clone(),
                    remote: self.settings().remote_name.clone(),
                    reference: branch.clone(),
                    remote_ref: branch.clone(),
                    force: false,
                    auth: Some(self.auth_callback()),
                },
            )
            .await?;
        tracing::info!("Pushed {} to {} (ok: {})", branch, url, result.ok);
        Ok(result)
    }

    /// Make the shared branch an exact mirror of the remote one.
    ///
    /// Local commits on the shared branch that the remote does not have are
    /// discarded; contributions travel through the working branch and
    /// [`GitHistory::send_to_remote`].
    pub async fn sync_with_remote(&self) -> Result<()> {
        let url = self.require_remote_url().await?;
        let ctx = self.context();
        let remote = self.settings().remote_name.clone();
        let main_branch = self.main_branch().to_string();

        tracing::debug!("Fetching {} from {}", main_branch, url);
        let fetched = self
            .engine()
            .fetch(
                ctx,
                self.transport.as_ref(),
                FetchOptions {
                    url: url.clone(),
                    remote: remote.clone(),
                    reference: main_branch.clone(),
                    single_branch: true,
                    auth: Some(self.auth_callback()),
                },
            )
            .await?;
        tracing::debug!("Received {} object(s)", fetched.objects_received);

        let tracking_ref = format!("refs/remotes/{}/{}", remote, main_branch);
        let head = self
            .engine()
            .log(ctx, &tracking_ref, Some(1))
            .await?
            .into_iter()
            .next()
            .map(|entry| entry.oid)
            .ok_or_else(|| {
                HistoryError::Engine(crate::engine::EngineError::NotFound(tracking_ref.clone()))
            })?;

        self.engine().write_ref(ctx, "HEAD", &head, true).await?;
        self.engine()
            .write_ref(ctx, &format!("refs/heads/{}", main_branch), &head, true)
            .await?;
        self.engine()
            .checkout(
                ctx,
                CheckoutOptions {
                    reference: main_branch.clone(),
                    force: true,
                    track: true,
                    remote: Some(remote),
                },
            )
            .await?;

        tracing::info!("Synchronized {} with {} at {}", main_branch, url, head);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth_header("admin", "admin"), "Basic YWRtaW46YWRtaW4=");
        assert_eq!(
            basic_auth_header("test-bot", "*testbot-tst*"),
            format!("Basic {}", STANDARD.encode("test-bot:*testbot-tst*"))
        );
    }
}
