//! Remote session gateway: the only place that performs network I/O.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    compat,
    error::{Error, Result},
    types::{CreateRequest, CreatedSession, EndRequest, MessageRequest},
};

/// Operations against the backend session proxy.
///
/// Vendor payloads are returned untouched; interpreting them is the job of
/// [`crate::compat`].
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Create a session. `force_reset` asks the proxy to discard any cached chat.
    async fn create(&self, force_reset: bool) -> Result<CreatedSession>;

    /// Post a user utterance and return the raw vendor reply
    async fn send_message(&self, id: &str, text: &str) -> Result<Value>;

    /// Fetch session metadata. A session the proxy no longer knows is reported
    /// as ended rather than as an error.
    async fn get_status(&self, id: &str) -> Result<Value>;

    /// Explicitly terminate a session
    async fn end(&self, id: &str) -> Result<Value>;
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the session proxy (e.g. `http://localhost:3000/api/chat`)
    pub base_url: String,
    /// Optional bearer token sent with every request
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/chat".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`SessionGateway`] over HTTP.
///
/// Holds no per-session state: every request carries the id it acts on.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpGateway {
    /// Create a gateway from configuration
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base URL must be http(s): {:?}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send a request and turn the response into a JSON value.
    ///
    /// Returns the status alongside the body so callers can special-case codes.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<(u16, Value)> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::transport(status.as_u16(), text));
        }

        Ok((status.as_u16(), parse_body(&text)))
    }
}

/// Parse a success body. Acks are not guaranteed to be JSON.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Pull the session id out of a create response.
fn parse_created(body: &Value) -> Result<CreatedSession> {
    let id = match body.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(Error::UnexpectedResponse(format!(
                "create response has no session id: {}",
                body
            )));
        }
    };
    Ok(CreatedSession { id })
}

#[async_trait]
impl SessionGateway for HttpGateway {
    async fn create(&self, force_reset: bool) -> Result<CreatedSession> {
        let url = self.url("session");
        tracing::debug!("Creating session at {} (reset_chat={})", url, force_reset);

        let request = self.client.post(&url).json(&CreateRequest {
            reset_chat: force_reset,
        });
        let (_, body) = self.execute(request).await?;
        let created = parse_created(&body)?;

        tracing::debug!("Session created: {}", created.id);
        Ok(created)
    }

    async fn send_message(&self, id: &str, text: &str) -> Result<Value> {
        let url = self.url("message");
        tracing::debug!("Sending message to session {} ({} chars)", id, text.len());

        let request = self.client.post(&url).json(&MessageRequest { id, message: text });
        let (_, body) = self.execute(request).await?;
        Ok(body)
    }

    async fn get_status(&self, id: &str) -> Result<Value> {
        let url = self.url("status");
        tracing::debug!("Fetching status of session {}", id);

        let request = self.client.get(&url).query(&[("id", id)]);
        match self.execute(request).await {
            Ok((_, body)) => Ok(body),
            Err(Error::Transport { status: 404, .. }) => {
                tracing::debug!("Session {} not found, treating as ended", id);
                Ok(compat::synthesized_ended_status())
            }
            Err(e) => Err(e),
        }
    }

    async fn end(&self, id: &str) -> Result<Value> {
        let url = self.url("end");
        tracing::debug!("Ending session {}", id);

        let request = self.client.post(&url).json(&EndRequest { id });
        let (_, body) = self.execute(request).await?;
        Ok(body)
    }
}
