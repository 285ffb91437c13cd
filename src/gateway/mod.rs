//! Boundary to the AI action backend: one request shape, an opaque success
//! payload, and a typed error for everything else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod display;
mod http;

pub use display::display_text;
pub use http::HttpActionGateway;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: String,
    pub payload: Value,
    pub user_text: String,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, payload: Value, user_text: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            payload,
            user_text: user_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Action backend unreachable: {0}")]
    Transport(String),

    /// The backend answered `{error: true, message}`.
    #[error("{0}")]
    Backend(String),

    #[error("Invalid action response: {0}")]
    InvalidResponse(String),
}

/// Sends one action and resolves with the backend's success payload.
/// Failures are never retried here.
#[async_trait]
pub trait ActionGateway: Send + Sync {
    async fn send(&self, request: ActionRequest) -> Result<Value, GatewayError>;
}

/// Splits a decoded reply into the success payload or the backend's own error.
pub fn interpret_reply(reply: Value) -> Result<Value, GatewayError> {
    let is_error = reply
        .get("error")
        .map(display::is_truthy)
        .unwrap_or(false);
    if !is_error {
        return Ok(reply);
    }

    let message = match reply.get("message") {
        Some(Value::String(message)) if !message.is_empty() => message.clone(),
        Some(other) if display::is_truthy(other) => other.to_string(),
        _ => "Unknown error".to_string(),
    };
    Err(GatewayError::Backend(message))
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{collections::VecDeque, sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{ActionGateway, ActionRequest, GatewayError};

    /// Replays queued replies after a fixed latency and records requests.
    #[derive(Default)]
    pub struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<Value, GatewayError>>>,
        requests: Mutex<Vec<ActionRequest>>,
        latency: Duration,
    }

    impl ScriptedGateway {
        pub fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }

        pub fn push_reply(&self, reply: Result<Value, GatewayError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn requests(&self) -> Vec<ActionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionGateway for ScriptedGateway {
        async fn send(&self, request: ActionRequest) -> Result<Value, GatewayError> {
            self.requests.lock().unwrap().push(request);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"text": "ok"})))
        }
    }
}
