use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EndpointConfig;
use crate::conversation::{iso_timestamp, Message, Role};
use crate::error::SendError;
use crate::preferences::Audience;

/// Reply fields tried in order. Part of the contract with the remote flow.
const REPLY_FIELDS: [&str; 3] = ["response", "message", "content"];
pub const FALLBACK_REPLY: &str = "I received your message but couldn't process it properly.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub message: String,
    pub conversation: Vec<ContextMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<&Message> for ContextMessage {
    fn from(message: &Message) -> Self {
        ContextMessage {
            id: Some(message.id.clone()),
            role: message.role,
            content: message.content.clone(),
            created_at: Some(iso_timestamp(message.created_at)),
        }
    }
}

impl WebhookRequest {
    /// Logged history followed by the pending user message as typed. The history
    /// already holds the escaped copy of that message.
    pub fn new(user_text: &str, history: &[Message], audience: Audience) -> Self {
        let mut conversation: Vec<ContextMessage> = history.iter().map(ContextMessage::from).collect();
        conversation.push(ContextMessage {
            id: None,
            role: Role::User,
            content: user_text.to_string(),
            created_at: None,
        });

        WebhookRequest {
            message: user_text.to_string(),
            conversation,
            user_type: Some(audience.as_str().to_string()),
            timestamp: iso_timestamp(Utc::now()),
        }
    }
}

/// Delivers one user message with its context and yields the reply text.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        user_text: &str,
        history: &[Message],
        audience: Audience,
        cancel: CancellationToken,
    ) -> Result<String, SendError>;
}

pub struct WebhookClient {
    client: reqwest::Client,
    endpoints: EndpointConfig,
}

impl WebhookClient {
    pub fn with_config(endpoints: EndpointConfig, connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Could not build HTTP client, connect timeout not applied: {}", e);
                reqwest::Client::new()
            });

        WebhookClient { client, endpoints }
    }

    pub fn endpoint_for(&self, audience: Audience) -> &str {
        self.endpoints.url_for(audience)
    }

    async fn post(&self, url: &str, request: &WebhookRequest) -> Result<String, SendError> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(SendError::transport)?;

        if !response.status().is_success() {
            return Err(SendError::Status {
                status: response.status().as_u16(),
            });
        }

        let data: Value = response.json().await.map_err(SendError::transport)?;
        Ok(extract_reply(&data))
    }
}

#[async_trait]
impl Transport for WebhookClient {
    async fn send(
        &self,
        user_text: &str,
        history: &[Message],
        audience: Audience,
        cancel: CancellationToken,
    ) -> Result<String, SendError> {
        let url = self.endpoint_for(audience);
        let request = WebhookRequest::new(user_text, history, audience);
        debug!(
            url,
            audience = audience.as_str(),
            context = request.conversation.len(),
            "posting to webhook"
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SendError::Cancelled),
            result = self.post(url, &request) => result,
        };

        if let Err(e) = &result {
            if e.is_transport() {
                warn!("Webhook error: {}", e);
            }
        }
        result
    }
}

/// First non-empty string among the known reply fields, else the fallback phrase.
pub fn extract_reply(data: &Value) -> String {
    REPLY_FIELDS
        .iter()
        .find_map(|field| {
            data.get(*field)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
        })
        .unwrap_or(FALLBACK_REPLY)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use serde_json::json;

    fn client_for(server: &wiremock::MockServer) -> WebhookClient {
        let endpoints = EndpointConfig {
            default: format!("{}/hook", server.uri()),
            buyer: None,
            farmer: Some(format!("{}/farmer", server.uri())),
        };
        WebhookClient::with_config(endpoints, Duration::from_secs(5))
    }

    #[test]
    fn test_extract_reply_priority() {
        assert_eq!(
            extract_reply(&json!({"content": "c", "message": "m", "response": "r"})),
            "r"
        );
        assert_eq!(extract_reply(&json!({"content": "c", "message": "m"})), "m");
        assert_eq!(extract_reply(&json!({"content": "c"})), "c");
        assert_eq!(extract_reply(&json!({"response": "", "content": "c"})), "c");
        assert_eq!(extract_reply(&json!({"other": "x"})), FALLBACK_REPLY);
        assert_eq!(extract_reply(&json!([1, 2])), FALLBACK_REPLY);
    }

    #[test]
    fn test_request_body_shape() {
        let mut conversation = Conversation::new();
        conversation.append(Role::User, "earlier");
        conversation.append(Role::Assistant, "<em>reply</em>");
        conversation.append(Role::User, "a &lt; b");

        let request = WebhookRequest::new("a < b", &conversation.snapshot(), Audience::Farmer);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["message"], "a < b");
        assert_eq!(body["userType"], "farmer");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

        let context = body["conversation"].as_array().unwrap();
        assert_eq!(context.len(), 4);
        assert_eq!(context[0]["role"], "user");
        assert_eq!(context[1]["role"], "assistant");
        assert!(context[1]["createdAt"].is_string());

        assert_eq!(context[2]["role"], "user");
        assert_eq!(context[2]["content"], "a &lt; b");
        assert!(context[2]["id"].is_string());

        assert_eq!(context[3]["role"], "user");
        assert_eq!(context[3]["content"], "a < b");
        assert!(context[3].get("id").is_none());
        assert!(context[3].get("createdAt").is_none());
    }

    #[tokio::test]
    async fn test_send_returns_reply_and_posts_json() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/hook"))
            .and(wiremock::matchers::header("content-type", "application/json"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(json!({"message": "hi there"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reply = client
            .send("hello", &[], Audience::Buyer, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "hi there");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["message"], "hello");
        assert_eq!(body["userType"], "buyer");
        assert_eq!(body["conversation"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audience_routes_to_its_endpoint() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/farmer"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(json!({"response": "farm"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.endpoint_for(Audience::Buyer).ends_with("/hook"));
        let reply = client
            .send("crops?", &[], Audience::Farmer, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "farm");
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .send("hello", &[], Audience::Buyer, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, SendError::Status { status: 503 });
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_transport_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .send("hello", &[], Audience::Buyer, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "too late"}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = client
            .send("hello", &[], Audience::Buyer, token)
            .await
            .unwrap_err();
        assert_eq!(err, SendError::Cancelled);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_transport_error() {
        let endpoints = EndpointConfig {
            default: "http://127.0.0.1:9/hook".to_string(),
            buyer: None,
            farmer: None,
        };
        let client = WebhookClient::with_config(endpoints, Duration::from_secs(1));
        let err = client
            .send("hello", &[], Audience::Buyer, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
