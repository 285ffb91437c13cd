use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::GatewayConfig;

use super::{interpret_reply, ActionGateway, ActionRequest, GatewayError};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Calls the local AI backend with `GET <endpoint>?action=..&payload=..&userText=..`.
pub struct HttpActionGateway {
    endpoint: String,
    client: Client,
}

impl HttpActionGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build action gateway HTTP client")?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// String payloads travel verbatim; anything else as compact JSON.
fn encode_payload(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ActionGateway for HttpActionGateway {
    async fn send(&self, request: ActionRequest) -> Result<Value, GatewayError> {
        log_debug!("sending action {} to {}", request.action, self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", request.action.as_str()),
                ("payload", encode_payload(&request.payload).as_str()),
                ("userText", request.user_text.as_str()),
            ])
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log_warn!("action {} failed with HTTP {status}", request.action);
            return Err(GatewayError::Transport(format!("HTTP {status}: {body}")));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        interpret_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn payload_encoding() {
        assert_eq!(encode_payload(&json!("es")), "es");
        assert_eq!(encode_payload(&Value::Null), "");
        assert_eq!(encode_payload(&json!({"lang": "fr"})), r#"{"lang":"fr"}"#);
    }

    #[test]
    fn uses_configured_endpoint() {
        let gateway = HttpActionGateway::new(&GatewayConfig::default()).unwrap();
        assert_eq!(gateway.endpoint(), "http://127.0.0.1:8000/ai/");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let config = GatewayConfig {
            // Port 9 (discard) on loopback is closed in test sandboxes.
            endpoint: "http://127.0.0.1:9/ai/".to_string(),
            timeout: Duration::from_secs(2),
        };
        let gateway = HttpActionGateway::new(&config).unwrap();

        let err = gateway
            .send(ActionRequest::new("summarize", Value::Null, "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
