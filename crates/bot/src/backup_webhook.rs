//! Remote backup over a JSON webhook
//!
//! The webhook keeps one copy of the membership set: `POST` replaces it and
//! `GET` returns it, both as `{"members":[{"userId":..,"expiry":..}]}`.

use std::time::Duration;

use async_trait::async_trait;
use primebot_membership::{BackupPort, BackupSnapshot, MembershipError, MembershipResult};
use reqwest::Client;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

/// Retries after the first attempt
const PUSH_RETRIES: usize = 2;
const RETRY_BASE_MS: u64 = 200;

#[derive(Clone)]
pub struct WebhookBackup {
    http: Client,
    url: Option<String>,
    retry_base_ms: u64,
}

impl WebhookBackup {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: Some(url.into()),
            retry_base_ms: RETRY_BASE_MS,
        }
    }

    /// No webhook configured: pushes are dropped and pulls come back empty
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            url: None,
            retry_base_ms: RETRY_BASE_MS,
        }
    }

    pub fn from_config(http: Client, url: Option<&str>) -> Self {
        match url {
            Some(url) => Self::new(http, url),
            None => {
                tracing::warn!("BACKUP_WEBHOOK_URL not set - remote backup disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    async fn push_once(&self, url: &str, snapshot: &BackupSnapshot) -> MembershipResult<()> {
        let response = self
            .http
            .post(url)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| MembershipError::BackupUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(MembershipError::BackupUnavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            // Not worth retrying; the webhook rejected the payload itself
            return Err(MembershipError::Store(format!("backup rejected push: HTTP {}", status)));
        }
        Ok(())
    }
}

#[async_trait]
impl BackupPort for WebhookBackup {
    async fn push(&self, snapshot: &BackupSnapshot) -> MembershipResult<()> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };

        let strategy = ExponentialBackoff::from_millis(self.retry_base_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(PUSH_RETRIES);

        RetryIf::spawn(
            strategy,
            || self.push_once(url, snapshot),
            |e: &MembershipError| {
                let retry = e.is_transient();
                if retry {
                    tracing::debug!(error = %e, "Backup push failed, retrying");
                }
                retry
            },
        )
        .await
    }

    async fn pull(&self) -> MembershipResult<BackupSnapshot> {
        let Some(url) = self.url.as_deref() else {
            return Ok(BackupSnapshot::default());
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MembershipError::BackupUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| MembershipError::BackupUnavailable(e.to_string()))?;

        let snapshot: BackupSnapshot = response
            .json()
            .await
            .map_err(|e| MembershipError::BackupUnavailable(format!("malformed backup: {}", e)))?;

        tracing::info!(members = snapshot.members.len(), "Backup pulled");
        Ok(snapshot)
    }
}
