use crate::analysis::endpoint;
use crate::error::OrchestratorError;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

pub const CHAT_ERROR_REPLY: &str = "Error: Could not connect to AI.";
pub const GUIDE_GREETING: &str =
    "Hello! I can guide you through the edits. What would you like to know?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }
}

/// What gets attached to every outgoing message besides the text itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatContext {
    pub analysis_summary: Option<Value>,
    pub selected_app: String,
    pub capture_active: bool,
}

/// `POST /chat` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub analysis_summary: Option<Value>,
    pub selected_app: String,
    pub is_sharing: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, context: ChatContext) -> Self {
        Self {
            message: message.into(),
            analysis_summary: context.analysis_summary,
            selected_app: context.selected_app,
            is_sharing: context.capture_active,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    reply: String,
}

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn reply(&self, request: &ChatRequest) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpChatService {
    client: Client,
    base_url: String,
}

impl HttpChatService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build chat HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn reply(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "chat"))
            .json(request)
            .send()
            .await
            .context("failed to call chat service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("chat service error {status}: {body}");
        }

        let reply: ChatReply = response
            .json()
            .await
            .context("failed to decode chat response JSON")?;
        Ok(reply.reply)
    }
}

/// Session-wide conversation log plus the service that answers it.
///
/// Cloning shares the log, so several sends may be in flight at once; replies
/// land in completion order.
#[derive(Clone)]
pub struct ChatBinder {
    service: Arc<dyn ChatService>,
    log: Arc<Mutex<Vec<ChatMessage>>>,
    request_timeout: Duration,
}

impl ChatBinder {
    pub fn new(service: Arc<dyn ChatService>, request_timeout: Duration) -> Self {
        Self {
            service,
            log: Arc::new(Mutex::new(Vec::new())),
            request_timeout,
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log.lock().expect("chat log mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().expect("chat log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the user entry before the request goes out, then appends the
    /// reply or the fixed error text. Blank input is ignored and returns `None`.
    pub async fn send(&self, text: &str, context: ChatContext) -> Option<ChatMessage> {
        if text.trim().is_empty() {
            return None;
        }

        self.push(ChatMessage::new(Role::User, text));
        let request = ChatRequest::new(text, context);

        let reply = match self.request(&request).await {
            Ok(reply) => ChatMessage::new(Role::Assistant, reply),
            Err(err) => {
                log::warn!("{err}");
                ChatMessage::new(Role::Assistant, CHAT_ERROR_REPLY)
            }
        };
        self.push(reply.clone());
        Some(reply)
    }

    async fn request(&self, request: &ChatRequest) -> Result<String, OrchestratorError> {
        match timeout(self.request_timeout, self.service.reply(request)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(OrchestratorError::ChatRequestFailed {
                message: format!("{err:#}"),
            }),
            Err(_) => Err(OrchestratorError::ChatRequestFailed {
                message: format!(
                    "no response after {}",
                    humantime::format_duration(self.request_timeout)
                ),
            }),
        }
    }

    fn push(&self, message: ChatMessage) {
        self.log
            .lock()
            .expect("chat log mutex poisoned")
            .push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CHAT_ERROR_REPLY, ChatBinder, ChatContext, ChatRequest, ChatService, Role,
    };
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct EchoService {
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatService for EchoService {
        async fn reply(&self, request: &ChatRequest) -> Result<String> {
            self.seen.lock().expect("seen lock").push(request.clone());
            Ok(format!("echo: {}", request.message))
        }
    }

    struct FailingService;

    #[async_trait]
    impl ChatService for FailingService {
        async fn reply(&self, _request: &ChatRequest) -> Result<String> {
            bail!("chat service error 503 Service Unavailable")
        }
    }

    struct GatedService {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ChatService for GatedService {
        async fn reply(&self, _request: &ChatRequest) -> Result<String> {
            self.gate.notified().await;
            Ok("released".to_string())
        }
    }

    #[tokio::test]
    async fn blank_messages_are_ignored() {
        let binder = ChatBinder::new(Arc::new(EchoService::default()), Duration::from_secs(5));
        assert!(binder.send("", ChatContext::default()).await.is_none());
        assert!(binder.send("   ", ChatContext::default()).await.is_none());
        assert!(binder.is_empty());
    }

    #[tokio::test]
    async fn reply_follows_user_entry_and_carries_context() {
        let service = Arc::new(EchoService::default());
        let binder = ChatBinder::new(service.clone(), Duration::from_secs(5));
        let context = ChatContext {
            analysis_summary: Some(json!({"total_suggestions": 4})),
            selected_app: "CapCut".to_string(),
            capture_active: true,
        };

        let reply = binder.send("hello", context).await.expect("reply");
        assert_eq!(reply.text, "echo: hello");

        let messages = binder.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[1].role, Role::Assistant);

        let seen = service.seen.lock().expect("seen");
        let body = serde_json::to_value(&seen[0]).expect("serialize");
        assert_eq!(
            body,
            json!({
                "message": "hello",
                "analysis_summary": {"total_suggestions": 4},
                "selected_app": "CapCut",
                "is_sharing": true
            })
        );
    }

    #[tokio::test]
    async fn failure_becomes_assistant_error_entry() {
        let binder = ChatBinder::new(Arc::new(FailingService), Duration::from_secs(5));
        let reply = binder
            .send("how do I split?", ChatContext::default())
            .await
            .expect("reply");

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text, CHAT_ERROR_REPLY);
        assert_eq!(binder.len(), 2);
    }

    #[tokio::test]
    async fn user_entry_is_visible_before_reply_arrives() {
        let gate = Arc::new(Notify::new());
        let binder = ChatBinder::new(
            Arc::new(GatedService { gate: gate.clone() }),
            Duration::from_secs(5),
        );

        let sender = binder.clone();
        let task = tokio::spawn(async move { sender.send("hello", ChatContext::default()).await });

        while binder.is_empty() {
            tokio::task::yield_now().await;
        }
        let pending = binder.messages();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].role, Role::User);
        assert_eq!(pending[0].text, "hello");

        gate.notify_one();
        task.await.expect("join").expect("reply");

        let messages = binder.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "released");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_chat_request_times_out() {
        let binder = ChatBinder::new(
            Arc::new(GatedService {
                gate: Arc::new(Notify::new()),
            }),
            Duration::from_secs(10),
        );
        let reply = binder
            .send("anyone?", ChatContext::default())
            .await
            .expect("reply");
        assert_eq!(reply.text, CHAT_ERROR_REPLY);
    }

    #[test]
    fn missing_summary_serializes_as_null() {
        let body = serde_json::to_value(ChatRequest::new("hi", ChatContext::default()))
            .expect("serialize");
        assert_eq!(body["analysis_summary"], serde_json::Value::Null);
        assert_eq!(body["selected_app"], "");
        assert_eq!(body["is_sharing"], false);
    }
}
