use async_trait::async_trait;
use crates::domain::value_objects::subscriptions::{
    EntitlementSnapshot, SubscriptionActionRequest, SubscriptionActionResponse,
};
use reqwest::{Client, Response};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitlementApi: Send + Sync {
    async fn fetch_entitlement(&self, email: &str) -> ClientResult<EntitlementSnapshot>;

    async fn request_action(
        &self,
        request: SubscriptionActionRequest,
    ) -> ClientResult<SubscriptionActionResponse>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Talks to the backend's `/api/v1/subscriptions` routes.
#[derive(Debug, Clone)]
pub struct HttpEntitlementApi {
    http: Client,
    base_url: String,
}

impl HttpEntitlementApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/subscriptions{path}", self.base_url)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        warn!(status = status.as_u16(), %message, "entitlement_api: request rejected");

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl EntitlementApi for HttpEntitlementApi {
    async fn fetch_entitlement(&self, email: &str) -> ClientResult<EntitlementSnapshot> {
        debug!("entitlement_api: fetching entitlement");
        let response = self
            .http
            .get(self.url("/entitlement"))
            .query(&[("email", email)])
            .send()
            .await?;

        Self::parse(response).await
    }

    async fn request_action(
        &self,
        request: SubscriptionActionRequest,
    ) -> ClientResult<SubscriptionActionResponse> {
        debug!(action = %request.action, "entitlement_api: requesting subscription action");
        let response = self
            .http
            .post(self.url("/action"))
            .json(&request)
            .send()
            .await?;

        Self::parse(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let api = HttpEntitlementApi::new("http://localhost:8080/");

        assert_eq!(
            api.url("/entitlement"),
            "http://localhost:8080/api/v1/subscriptions/entitlement"
        );
    }
}
