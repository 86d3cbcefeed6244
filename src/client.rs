use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.allscreenshots.com";
const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

/// Authenticated client for the Allscreenshots REST API.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ApiClient {
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nexus-allscreenshots/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_key: credentials.api_key.clone(),
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{endpoint}", self.base_url);
        let mut req = self
            .client
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&text, status.canonical_reason().unwrap_or("error")),
        })
    }

    /// JSON request. An empty response body comes back as `{}`.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        tracing::debug!(%method, endpoint, "allscreenshots request");
        let resp = self.send(self.build(method, endpoint, body, query)).await?;
        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Request whose response is raw image/PDF bytes.
    pub async fn request_binary(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Vec<u8>, ApiError> {
        tracing::debug!(%method, endpoint, "allscreenshots binary request");
        let resp = self.send(self.build(method, endpoint, body, &[])).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Validate the credentials with a lightweight quota lookup.
    pub async fn test_credentials(&self) -> Result<Value, ApiError> {
        self.request(Method::GET, "/v1/usage/quota", None, &[]).await
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(text: &str, fallback: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        for key in ["message", "error"] {
            if let Some(msg) = v.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Webhook subscriptions
// ---------------------------------------------------------------------------

/// Webhook record as returned by the vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteWebhook {
    /// Empty when the vendor leaves it out. Lookups only need `url`.
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Accept the id as a string or a number.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

#[derive(Serialize)]
struct CreateWebhookRequest<'a> {
    url: &'a str,
    events: &'a [String],
}

/// The vendor endpoints the subscription lifecycle depends on.
#[async_trait]
pub trait WebhookApi: Send + Sync {
    async fn create_webhook(&self, url: &str, events: &[String])
        -> Result<RemoteWebhook, ApiError>;
    async fn get_webhook(&self, remote_id: &str) -> Result<RemoteWebhook, ApiError>;
    async fn delete_webhook(&self, remote_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl WebhookApi for ApiClient {
    async fn create_webhook(
        &self,
        url: &str,
        events: &[String],
    ) -> Result<RemoteWebhook, ApiError> {
        let body = serde_json::to_value(CreateWebhookRequest { url, events })
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let resp = self
            .request(Method::POST, "/v1/webhooks", Some(&body), &[])
            .await?;
        serde_json::from_value(resp).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get_webhook(&self, remote_id: &str) -> Result<RemoteWebhook, ApiError> {
        let resp = self
            .request(Method::GET, &format!("/v1/webhooks/{remote_id}"), None, &[])
            .await?;
        serde_json::from_value(resp).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn delete_webhook(&self, remote_id: &str) -> Result<(), ApiError> {
        self.request(Method::DELETE, &format!("/v1/webhooks/{remote_id}"), None, &[])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        let creds = Credentials {
            api_key: "test-key".into(),
            base_url: format!("{}/", server.uri()),
        };
        ApiClient::new(&creds, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_credentials_default_base_url() {
        let creds: Credentials = serde_json::from_value(json!({"api_key": "k"})).unwrap();
        assert_eq!(creds.base_url, DEFAULT_BASE_URL);
    }

    #[tokio::test]
    async fn test_request_sends_api_key_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/screenshots/jobs"))
            .and(header("X-API-Key", "test-key"))
            .and(query_param("status", "COMPLETED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "job_1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server)
            .request(
                Method::GET,
                "/v1/screenshots/jobs",
                None,
                &[("status", "COMPLETED".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(resp, json!([{"id": "job_1"}]));
    }

    #[tokio::test]
    async fn test_empty_body_is_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/schedules/s1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let resp = client(&server)
            .request(Method::DELETE, "/v1/schedules/s1", None, &[])
            .await
            .unwrap();
        assert_eq!(resp, json!({}));
    }

    #[tokio::test]
    async fn test_error_status_extracts_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/usage/quota"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API key"})),
            )
            .mount(&server)
            .await;

        let err = client(&server).test_credentials().await.unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_binary_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/screenshots"))
            .and(body_json(json!({"url": "https://example.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
            .mount(&server)
            .await;

        let bytes = client(&server)
            .request_binary(
                Method::POST,
                "/v1/screenshots",
                Some(&json!({"url": "https://example.com"})),
            )
            .await
            .unwrap();
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_create_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/webhooks"))
            .and(body_json(json!({
                "url": "https://hooks.example.com/hooks/t1",
                "events": ["*"]
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "wh_1", "secret": "s3cr3t"})),
            )
            .mount(&server)
            .await;

        let created = client(&server)
            .create_webhook("https://hooks.example.com/hooks/t1", &["*".to_string()])
            .await
            .unwrap();
        assert_eq!(created.id, "wh_1");
        assert_eq!(created.secret.as_deref(), Some("s3cr3t"));
    }

    #[tokio::test]
    async fn test_delete_webhook_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/webhooks/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = client(&server).delete_webhook("gone").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_get_webhook_tolerates_id_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/webhooks/wh_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": "https://hooks.example.com/hooks/t1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/webhooks/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
            .mount(&server)
            .await;

        let c = client(&server);
        let remote = c.get_webhook("wh_1").await.unwrap();
        assert_eq!(remote.id, "");
        assert_eq!(
            remote.url.as_deref(),
            Some("https://hooks.example.com/hooks/t1")
        );
        assert_eq!(c.get_webhook("42").await.unwrap().id, "42");
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(r#"{"error":"bad"}"#, "x"), "bad");
        assert_eq!(error_message("plain text", "x"), "plain text");
        assert_eq!(error_message("  ", "Bad Request"), "Bad Request");
    }
}
