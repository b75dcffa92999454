use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use concierge_core::domain::slot::normalize_phone;

use super::{ArgKind, ArgSpec, Tool, ToolCall, ToolError, ToolResponse, ToolSpec};

pub const NAME: &str = "send_notification";

/// Delivery channel for follow-up messages (SMS in production).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), ToolError>;
}

/// Records the message in the log instead of delivering it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<(), ToolError> {
        info!(
            event_name = "notify.sms.queued",
            phone = %phone,
            chars = message.len(),
            "sms queued"
        );
        Ok(())
    }
}

pub struct SendNotificationTool {
    notifier: Arc<dyn Notifier>,
}

impl SendNotificationTool {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Tool for SendNotificationTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: NAME,
            description: "Queue a text message to a customer's phone",
            args: vec![
                ArgSpec::required("phone", ArgKind::String),
                ArgSpec::required("message", ArgKind::String),
            ],
            idempotent: false,
            accepts_idempotency_token: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let raw = call.str_arg("phone")?;
        let phone = normalize_phone(raw).ok_or_else(|| ToolError::InvalidArguments {
            tool: call.tool.clone(),
            reason: format!("`phone` is not a phone number: {raw}"),
        })?;
        let message = call.str_arg("message")?;

        self.notifier.send(&phone, message).await?;
        Ok(ToolResponse::Completed {
            data: json!({ "phone": phone, "status": "queued", "simulated": true }),
        })
    }
}
