//! Model gateway capability.
//!
//! `HttpGateway` speaks the OpenAI-compatible chat-completions protocol
//! (OpenRouter and friends). `ScriptedGateway` replays canned replies.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alchemy_core::FailureKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// One completion request.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub kind: FailureKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16) -> Self {
        Self::new(FailureKind::from_status(status), format!("HTTP {status}"))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for GatewayError {}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Return the model's text reply or a classified failure.
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<String, GatewayError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpGateway {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: &ModelConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            client,
        }
    }
}

fn classify_transport(e: &reqwest::Error) -> FailureKind {
    if e.is_timeout() || e.is_connect() {
        FailureKind::Overloaded
    } else if let Some(status) = e.status() {
        FailureKind::from_status(status.as_u16())
    } else {
        FailureKind::Unknown
    }
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<String, GatewayError> {
        let Some(api_key) = &self.api_key else {
            return Err(GatewayError::new(
                FailureKind::AuthFailed,
                "no model API key configured",
            ));
        };

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::new(classify_transport(&e), e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let mut err = GatewayError::from_status(status.as_u16());
            err.message = format!("HTTP {status}: {}", text.chars().take(200).collect::<String>());
            return Err(err);
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| GatewayError::new(FailureKind::Unknown, format!("bad response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::new(FailureKind::Unknown, "response had no content"))
    }
}

/// Gateway that replays a fixed script, then repeats an optional default.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<String, GatewayError>>>,
    default: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    models: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(script: impl IntoIterator<Item = Result<String, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            default: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            models: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `text` on every call.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new([]).with_default(text)
    }

    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.default = Some(text.into());
        self
    }

    /// Sleep before answering, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Model ids requested, in call order.
    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.model.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(reply) => reply,
            None => self.default.clone().ok_or_else(|| {
                GatewayError::new(FailureKind::Unknown, "scripted gateway exhausted")
            }),
        }
    }
}
