//! Discord REST adapter
//!
//! Grants and revokes the Prime role and sends direct messages. Only the
//! handful of REST calls the bot needs; no gateway connection.

use async_trait::async_trait;
use primebot_membership::{MembershipError, MembershipResult, NotificationPort, RolePort};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    api_base: String,
    token: String,
    guild_id: String,
    role_id: String,
}

impl DiscordClient {
    pub fn new(
        http: Client,
        api_base: impl Into<String>,
        token: impl Into<String>,
        guild_id: impl Into<String>,
        role_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            token: token.into(),
            guild_id: guild_id.into(),
            role_id: role_id.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    fn role_path(&self, user_id: &str) -> String {
        format!(
            "guilds/{}/members/{}/roles/{}",
            self.guild_id, user_id, self.role_id
        )
    }

    async fn send_checked(
        &self,
        request: RequestBuilder,
        what: &str,
        user_id: &str,
    ) -> MembershipResult<Response> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(user_id = %user_id, error = %e, "Discord {} request failed", what);
            MembershipError::Delivery(format!("{} for {}: {}", what, user_id, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(user_id = %user_id, status = %status, "Discord {} rejected", what);
            return Err(MembershipError::Delivery(format!(
                "{} for {}: HTTP {}",
                what, user_id, status
            )));
        }

        Ok(response)
    }

    async fn open_dm(&self, user_id: &str) -> MembershipResult<String> {
        let request = self
            .request(Method::POST, "users/@me/channels")
            .json(&json!({ "recipient_id": user_id }));

        let channel: DmChannel = self
            .send_checked(request, "open DM", user_id)
            .await?
            .json()
            .await
            .map_err(|e| MembershipError::Delivery(format!("open DM for {}: {}", user_id, e)))?;

        Ok(channel.id)
    }
}

#[async_trait]
impl RolePort for DiscordClient {
    async fn grant(&self, user_id: &str) -> MembershipResult<()> {
        let request = self.request(Method::PUT, &self.role_path(user_id));
        self.send_checked(request, "grant role", user_id).await?;
        tracing::info!(user_id = %user_id, "Prime role granted");
        Ok(())
    }

    async fn revoke(&self, user_id: &str) -> MembershipResult<()> {
        let request = self.request(Method::DELETE, &self.role_path(user_id));
        self.send_checked(request, "revoke role", user_id).await?;
        tracing::info!(user_id = %user_id, "Prime role revoked");
        Ok(())
    }
}

#[async_trait]
impl NotificationPort for DiscordClient {
    async fn send(&self, user_id: &str, message: &str) -> MembershipResult<()> {
        let channel_id = self.open_dm(user_id).await?;
        let request = self
            .request(Method::POST, &format!("channels/{}/messages", channel_id))
            .json(&json!({ "content": message }));
        self.send_checked(request, "send DM", user_id).await?;
        tracing::debug!(user_id = %user_id, "Direct message sent");
        Ok(())
    }
}
