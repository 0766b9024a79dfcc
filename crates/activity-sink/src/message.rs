//! Wire shapes for sink messages.

use serde::{Deserialize, Serialize};

use huntr_core_types::{BotId, BotStatus};

/// Kind of activity being reported, matching frontend expectations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Action,
    Thinking,
    Result,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Action => "action",
            ActivityKind::Thinking => "thinking",
            ActivityKind::Result => "result",
        }
    }
}

/// One message carried on the sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkMessage {
    Activity {
        message: String,
        activity_kind: ActivityKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        bot_id: Option<BotId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_status: Option<String>,
    },
    StatusUpdate {
        status: BotStatus,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bot_id: Option<BotId>,
    },
}

impl SinkMessage {
    pub fn activity(message: impl Into<String>, kind: ActivityKind) -> Self {
        SinkMessage::Activity {
            message: message.into(),
            activity_kind: kind,
            bot_id: None,
            thread_title: None,
            thread_status: None,
        }
    }

    pub fn status(status: BotStatus, message: impl Into<String>) -> Self {
        SinkMessage::StatusUpdate {
            status,
            message: message.into(),
            bot_id: None,
        }
    }

    pub fn with_bot_id(mut self, id: BotId) -> Self {
        match &mut self {
            SinkMessage::Activity { bot_id, .. } => *bot_id = Some(id),
            SinkMessage::StatusUpdate { bot_id, .. } => *bot_id = Some(id),
        }
        self
    }

    pub fn with_thread(mut self, title: Option<String>, status: Option<String>) -> Self {
        if let SinkMessage::Activity {
            thread_title,
            thread_status,
            ..
        } = &mut self
        {
            *thread_title = title;
            *thread_status = status;
        }
        self
    }

    /// Message body, whichever variant.
    pub fn text(&self) -> &str {
        match self {
            SinkMessage::Activity { message, .. } => message,
            SinkMessage::StatusUpdate { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_serializes_with_type_tag() {
        let msg = SinkMessage::activity("Clicked apply", ActivityKind::Action)
            .with_thread(Some("Acme - Engineer".into()), Some("Started".into()));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "activity");
        assert_eq!(value["activity_kind"], "action");
        assert_eq!(value["thread_title"], "Acme - Engineer");
        assert!(value.get("bot_id").is_none());
    }

    #[test]
    fn status_update_serializes_status_string() {
        let msg = SinkMessage::status(huntr_core_types::BotStatus::Paused, "paused by user");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "status_update");
        assert_eq!(value["status"], "paused");
    }
}
